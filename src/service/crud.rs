//! Generic CRUD over any registered record type.
//!
//! Every operation takes the store as a parameter, so callers choose the scope (pool,
//! transaction, in-memory). Flow per call: resolve the descriptor, build the query,
//! run the type's hooks, execute, run the post-load hook.

use crate::config::EngineConfig;
use crate::error::{AppError, StoreError};
use crate::filter::{ColumnRef, Comparator, FilterCompiler, Predicate};
use crate::record::{AnyRecord, Record};
use crate::registry::TypeRegistry;
use crate::schema::{Operation, RecordTypeDescriptor};
use crate::service::request::{parse_sort_entry, ListRequest, Page, Pagination};
use crate::store::{Include, OrderBy, RecordStore, Row, SelectQuery, TableRef};
use serde_json::Value;
use std::sync::Arc;

pub struct RecordService {
    registry: Arc<TypeRegistry>,
    config: EngineConfig,
}

impl RecordService {
    pub fn new(registry: Arc<TypeRegistry>, config: EngineConfig) -> Self {
        RecordService { registry, config }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Presentation schema of a registered type (case-insensitive name).
    pub fn describe(&self, type_name: &str) -> Result<&RecordTypeDescriptor, AppError> {
        self.registry.descriptor(type_name)
    }

    /// Paginated, filtered, sorted list.
    pub async fn list<R, S>(&self, store: &S, request: &ListRequest) -> Result<Page<R>, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.permitted::<R>(Operation::List)?;
        let pagination = Pagination::new(
            request.page,
            request.page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        self.run_list::<R, S>(store, descriptor, request, pagination).await
    }

    /// First `list_all_limit` records, with the type's own conditions and ordering only.
    pub async fn list_all<R, S>(&self, store: &S) -> Result<Vec<R>, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.registry.descriptor(R::TYPE_NAME)?;
        let pagination = Pagination {
            page: 1,
            page_size: self.config.list_all_limit,
        };
        let page = self
            .run_list::<R, S>(store, descriptor, &ListRequest::default(), pagination)
            .await?;
        Ok(page.items)
    }

    pub async fn get<R, S>(&self, store: &S, id: &str) -> Result<R, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.permitted::<R>(Operation::Get)?;
        let (_, mut record) = self.find::<R, S>(store, descriptor, id).await?;
        record.post_load();
        Ok(record)
    }

    /// Bind `payload` onto a blank record, validate, insert.
    pub async fn create<R, S>(&self, store: &S, payload: Value) -> Result<R, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.permitted::<R>(Operation::Create)?;
        let Value::Object(fields) = payload else {
            return Err(AppError::Validation(format!("{} payload must be an object", R::TYPE_NAME)));
        };
        let mut base = to_object(&R::default())?;
        base.extend(fields);
        let mut record: R = bind(base)?;
        record.pre_update()?;

        let mut row = columns_of(descriptor, to_object(&record)?);
        if row.get(&descriptor.primary_key).map_or(false, is_unset_key) {
            row.remove(&descriptor.primary_key);
        }
        row.retain(|name, value| {
            !(value.is_null() && descriptor.column(name).map_or(false, |c| c.default.is_some()))
        });

        let stored = store.insert(&TableRef::of(descriptor), &row).await?;
        let mut record: R = decode(stored)?;
        tracing::info!(record_type = R::TYPE_NAME, "record created");
        record.post_load();
        Ok(record)
    }

    /// Merge `payload` onto the stored record (key changes ignored), validate, persist.
    pub async fn update<R, S>(&self, store: &S, id: &str, payload: Value) -> Result<R, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.permitted::<R>(Operation::Update)?;
        let Value::Object(patch) = payload else {
            return Err(AppError::Validation(format!("{} payload must be an object", R::TYPE_NAME)));
        };
        let (key, existing) = self.find::<R, S>(store, descriptor, id).await?;
        let mut merged = to_object(&existing)?;
        for (field, value) in patch {
            if field != descriptor.primary_key {
                merged.insert(field, value);
            }
        }
        let mut record: R = bind(merged)?;
        record.pre_update()?;

        let mut row = columns_of(descriptor, to_object(&record)?);
        row.remove(&descriptor.primary_key);
        let stored = store
            .update(&TableRef::of(descriptor), &key, &row)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", R::TYPE_NAME, id)))?;
        let mut record: R = decode(stored)?;
        tracing::info!(record_type = R::TYPE_NAME, id, "record updated");
        record.post_load();
        Ok(record)
    }

    pub async fn delete<R, S>(&self, store: &S, id: &str) -> Result<(), AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let descriptor = self.permitted::<R>(Operation::Delete)?;
        let key = resolve_id::<R>(descriptor, id)?;
        let deleted = store.delete(&TableRef::of(descriptor), &key).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("{} {}", R::TYPE_NAME, id)));
        }
        tracing::info!(record_type = R::TYPE_NAME, id, "record deleted");
        Ok(())
    }

    fn permitted<R: Record>(&self, op: Operation) -> Result<&RecordTypeDescriptor, AppError> {
        let descriptor = self.registry.descriptor(R::TYPE_NAME)?;
        if !descriptor.allows(op) {
            return Err(AppError::NotAllowed(format!("{} on {}", op.as_str(), R::TYPE_NAME)));
        }
        Ok(descriptor)
    }

    /// Table query carrying the type's pre-fetch condition.
    fn base_query<R: Record>(descriptor: &RecordTypeDescriptor) -> SelectQuery {
        let mut query = SelectQuery::new(TableRef::of(descriptor));
        if let Some(condition) = R::pre_fetch_conditions() {
            query.filter(condition);
        }
        query
    }

    /// Load by id with `clean_id` and the pre-fetch condition applied; no post-load.
    async fn find<R, S>(&self, store: &S, descriptor: &RecordTypeDescriptor, id: &str) -> Result<(Value, R), AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let key = resolve_id::<R>(descriptor, id)?;
        let mut query = Self::base_query::<R>(descriptor);
        query.filter(Predicate::Compare {
            column: ColumnRef::new(descriptor.primary_key.clone()),
            op: Comparator::Eq,
            value: key.clone(),
            cast: Some(descriptor.id_kind.sql_type()),
        });
        query.limit = Some(1);
        let row = store
            .fetch(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("{} {}", R::TYPE_NAME, id)))?;
        Ok((key, decode(row)?))
    }

    async fn run_list<R, S>(
        &self,
        store: &S,
        descriptor: &RecordTypeDescriptor,
        request: &ListRequest,
        pagination: Pagination,
    ) -> Result<Page<R>, AppError>
    where
        R: Record,
        S: RecordStore + ?Sized,
    {
        let mode = self.config.filter_mode;
        let mut query = Self::base_query::<R>(descriptor);

        if let Some(text) = request.query.as_deref().filter(|q| !q.trim().is_empty()) {
            if descriptor.has_column(&descriptor.display_column) {
                query.filter(Predicate::Contains {
                    column: ColumnRef::new(descriptor.display_column.clone()),
                    needle: text.to_string(),
                });
            } else {
                mode.reject_or_warn(format!("{} has no display column for free-text query", R::TYPE_NAME))?;
            }
        }

        let compiler = FilterCompiler::new(&self.registry, mode);
        for compiled in compiler.compile_all(descriptor, &request.filters)? {
            if let Some(join) = compiled.join {
                query.join(join);
            }
            query.filter(compiled.predicate);
        }

        for order in R::pre_fetch_sort() {
            query.order_by(order);
        }
        for entry in &request.sort {
            match parse_sort_entry(entry).filter(|o| descriptor.has_column(&o.column)) {
                Some(order) => {
                    query.order_by(order);
                }
                None => mode.reject_or_warn(format!("sort '{}' on {}", entry, R::TYPE_NAME))?,
            }
        }
        if !query.is_ordered_by(&descriptor.primary_key) {
            query.order_by(OrderBy::asc(descriptor.primary_key.clone()));
        }

        let preloads = self.preloads(descriptor, &request.preload)?;
        query.includes = preloads.iter().map(|(include, _)| include.clone()).collect();

        let total = store.count(&query).await?;
        query.limit = Some(pagination.page_size);
        query.offset = pagination.offset();
        let rows = store.fetch(&query).await?;

        let mut items = Vec::with_capacity(rows.len());
        for mut row in rows {
            for (include, target) in &preloads {
                if let Some(related) = row.remove(&include.name) {
                    let redacted = if related.is_null() {
                        related
                    } else {
                        target.redact_row(related)
                    };
                    row.insert(include.name.clone(), redacted);
                }
            }
            let mut record: R = decode(row)?;
            record.post_load();
            items.push(record);
        }
        tracing::debug!(
            record_type = R::TYPE_NAME,
            total,
            page = pagination.page,
            returned = items.len(),
            "list"
        );

        Ok(Page {
            total,
            current_page: pagination.page,
            total_pages: pagination.total_pages(total),
            items,
            server_time: chrono::Utc::now(),
        })
    }

    /// Includes for the requested selector targets, each with a blank target for redaction.
    fn preloads(
        &self,
        descriptor: &RecordTypeDescriptor,
        names: &[String],
    ) -> Result<Vec<(Include, Box<dyn AnyRecord>)>, AppError> {
        let mut out = Vec::new();
        for name in names {
            let Some(field) = descriptor.fields.iter().find(|f| f.selector_target() == Some(name.as_str())) else {
                self.config
                    .filter_mode
                    .reject_or_warn(format!("no selector for '{}' on {}", name, descriptor.type_name))?;
                continue;
            };
            let target = self.registry.new_blank_instance(name)?;
            let include = Include {
                name: target.type_name().to_string(),
                table: target.table_name().to_string(),
                their_key: target.primary_key().to_string(),
                our_key: field.name.clone(),
            };
            out.push((include, target));
        }
        Ok(out)
    }
}

/// Empty ids never reach the store; `clean_id` runs before key parsing.
fn resolve_id<R: Record>(descriptor: &RecordTypeDescriptor, raw: &str) -> Result<Value, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::NotFound(format!("{} with empty id", R::TYPE_NAME)));
    }
    let cleaned = R::clean_id(raw).unwrap_or_else(|| raw.to_string());
    descriptor
        .id_kind
        .parse_id(&cleaned)
        .ok_or_else(|| AppError::NotFound(format!("{} {}", R::TYPE_NAME, raw)))
}

/// A zero, empty or null key lets the store generate one.
fn is_unset_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn to_object<R: Record>(record: &R) -> Result<Row, AppError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::Validation(format!("{} does not serialize to an object", R::TYPE_NAME))),
        Err(e) => Err(AppError::Validation(format!("{}: {}", R::TYPE_NAME, e))),
    }
}

fn bind<R: Record>(fields: Row) -> Result<R, AppError> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| AppError::Validation(format!("invalid {} payload: {}", R::TYPE_NAME, e)))
}

fn decode<R: Record>(row: Row) -> Result<R, AppError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| AppError::Store(StoreError::Backend(format!("cannot decode {} row: {}", R::TYPE_NAME, e))))
}

/// Keep only the declared columns.
fn columns_of(descriptor: &RecordTypeDescriptor, mut fields: Row) -> Row {
    descriptor
        .columns
        .iter()
        .filter_map(|c| fields.remove(&c.name).map(|v| (c.name.clone(), v)))
        .collect()
}
