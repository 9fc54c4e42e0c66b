//! Record schema: declarations, resolved descriptors, and the extractor between them.

pub mod extract;
pub mod resolved;
pub mod types;

pub use extract::{describe, extract_columns, extract_fields};
pub use resolved::{
    ColumnDef, FieldDescriptor, FieldKind, IdKind, Operation, RecordTypeDescriptor, SqlType, ENUM_SELECTOR,
};
pub use types::{Annotation, FieldDecl, FieldType};
