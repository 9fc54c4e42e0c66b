//! Record types every deployment registers.

mod subscription;
mod user;

pub use subscription::Subscription;
pub use user::{User, PASSWORD_MASK, ROLES};
