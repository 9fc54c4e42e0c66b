//! crud-kernel: declaration-driven record engine. Register record types once; list,
//! filter, paginate, create, update and delete any of them through one generic service.

pub mod builtin;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod migration;
pub mod record;
pub mod registry;
pub mod schema;
pub mod service;
pub mod sql;
pub mod store;

pub use config::{DatabaseConfig, EngineConfig};
pub use error::{AppError, ConfigError, ErrorBody, HookError, StoreError};
pub use filter::{FieldFilter, FilterMode, Predicate};
pub use logging::init_tracing;
pub use migration::apply_migrations;
pub use record::{AnyRecord, LifecycleHooks, Record};
pub use registry::TypeRegistry;
pub use schema::{FieldDecl, FieldDescriptor, FieldKind, IdKind, Operation, RecordTypeDescriptor};
pub use service::{ListRequest, Page, RecordService};
pub use store::{ensure_database_exists, MemoryStore, OrderBy, PgStore, PgTxStore, RecordStore};
