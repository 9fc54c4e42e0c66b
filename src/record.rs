//! Record types: the declaration contract and the optional lifecycle hooks.

use crate::error::HookError;
use crate::filter::Predicate;
use crate::schema::{FieldDecl, IdKind, Operation};
use crate::store::OrderBy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Optional per-type hooks. Every method defaults to identity / no-op, so a record type
/// overrides only the ones it needs.
pub trait LifecycleHooks {
    /// Normalize a caller-supplied id into primary-key form. `None` keeps the raw id.
    fn clean_id(_raw: &str) -> Option<String> {
        None
    }

    /// Condition AND-ed into every list and get-by-id query.
    fn pre_fetch_conditions() -> Option<Predicate> {
        None
    }

    /// Ordering applied to lists before any request-level sort keys.
    fn pre_fetch_sort() -> Vec<OrderBy> {
        Vec::new()
    }

    /// Validate or normalize before insert/update. An error aborts the write.
    fn pre_update(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Adjust a loaded record before it leaves the engine (e.g. redact secrets).
    fn post_load(&mut self) {}
}

/// A record type the engine can serve. Field declarations replace runtime reflection:
/// `fields()` is read once, at registration.
///
/// Serialized field names must match the declared wire names, which are also the
/// column names.
pub trait Record: LifecycleHooks + Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
    const TABLE_NAME: &'static str;
    const TITLE: &'static str;
    const API_PATH: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    const ID_KIND: IdKind = IdKind::Integer;
    const DISPLAY_COLUMN: &'static str = "name";
    const EXTRA_ACTIONS: &'static [&'static str] = &[];
    const OPERATIONS: &'static [Operation] = Operation::ALL;

    fn fields() -> Vec<FieldDecl>;
}

/// Type-erased blank instance of a registered record type.
pub trait AnyRecord: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn table_name(&self) -> &'static str;
    fn primary_key(&self) -> &'static str;
    fn display_column(&self) -> &'static str;
    /// Run the type's `post_load` over a raw stored row. Rows that do not decode become null.
    fn redact_row(&self, row: Value) -> Value;
}

impl<R: Record> AnyRecord for R {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn table_name(&self) -> &'static str {
        R::TABLE_NAME
    }

    fn primary_key(&self) -> &'static str {
        R::PRIMARY_KEY
    }

    fn display_column(&self) -> &'static str {
        R::DISPLAY_COLUMN
    }

    fn redact_row(&self, row: Value) -> Value {
        match serde_json::from_value::<R>(row) {
            Ok(mut record) => {
                record.post_load();
                serde_json::to_value(&record).unwrap_or(Value::Null)
            }
            Err(e) => {
                tracing::warn!(record_type = R::TYPE_NAME, error = %e, "row does not decode, dropped");
                Value::Null
            }
        }
    }
}

pub(crate) fn blank<R: Record>() -> Box<dyn AnyRecord> {
    Box::new(R::default())
}
