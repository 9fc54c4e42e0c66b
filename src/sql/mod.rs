//! SQL rendering: identifiers from record declarations only, every value as a parameter.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
