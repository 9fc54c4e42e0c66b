//! DDL for registered record types: one table per type, missing columns added, then foreign keys
//! for relation selectors.

use crate::error::AppError;
use crate::registry::TypeRegistry;
use crate::schema::{ColumnDef, IdKind, RecordTypeDescriptor};
use crate::sql::quoted;
use sqlx::PgPool;

/// SQLSTATE for a constraint that already exists.
const DUPLICATE_OBJECT: &str = "42710";

/// Create every registered table (IF NOT EXISTS), add columns declared since the table
/// was created, then add foreign keys. Existing foreign keys are skipped; any other
/// foreign-key failure is logged and does not stop startup.
pub async fn apply_migrations(pool: &PgPool, registry: &TypeRegistry) -> Result<(), AppError> {
    let mut descriptors: Vec<&RecordTypeDescriptor> = registry.types().collect();
    descriptors.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    for descriptor in &descriptors {
        sqlx::query(&create_table_sql(descriptor)).execute(pool).await?;
        for sql in add_columns_sql(descriptor) {
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    for descriptor in &descriptors {
        for sql in foreign_key_sql(descriptor, registry) {
            match sqlx::query(&sql).execute(pool).await {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(DUPLICATE_OBJECT) => {
                    tracing::debug!(table = %descriptor.table_name, "foreign key already present");
                }
                Err(e) => {
                    tracing::warn!(table = %descriptor.table_name, error = %e, "foreign key not added");
                }
            }
        }
    }
    tracing::info!(tables = descriptors.len(), "migrations applied");
    Ok(())
}

pub fn create_table_sql(descriptor: &RecordTypeDescriptor) -> String {
    let defs: Vec<String> = descriptor
        .columns
        .iter()
        .map(|c| column_sql(c, descriptor.id_kind))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&descriptor.table_name),
        defs.join(",\n  ")
    )
}

/// `ADD COLUMN IF NOT EXISTS` for every non-key column, so tables created before a
/// field was declared catch up.
pub fn add_columns_sql(descriptor: &RecordTypeDescriptor) -> Vec<String> {
    descriptor
        .columns
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| {
            format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                quoted(&descriptor.table_name),
                column_sql(c, descriptor.id_kind)
            )
        })
        .collect()
}

fn column_sql(column: &ColumnDef, id_kind: IdKind) -> String {
    let name = quoted(&column.name);
    if column.primary_key {
        return match id_kind {
            IdKind::Integer => format!("{} BIGSERIAL PRIMARY KEY", name),
            IdKind::Uuid => format!("{} UUID PRIMARY KEY DEFAULT gen_random_uuid()", name),
            IdKind::Text => format!("{} TEXT PRIMARY KEY", name),
        };
    }
    let mut def = format!("{} {}", name, column.sql_type.as_sql().to_uppercase());
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(ref default) = column.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}

/// `ALTER TABLE .. ADD CONSTRAINT` for each relation selector whose target is registered.
pub fn foreign_key_sql(descriptor: &RecordTypeDescriptor, registry: &TypeRegistry) -> Vec<String> {
    descriptor
        .fields
        .iter()
        .filter(|f| descriptor.has_column(&f.name))
        .filter_map(|f| {
            let target = registry.lookup(f.selector_target()?)?;
            Some(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE SET NULL",
                quoted(&descriptor.table_name),
                quoted(&format!("{}_{}_fkey", descriptor.table_name, f.name)),
                quoted(&f.name),
                quoted(&target.table_name),
                quoted(&target.primary_key),
            ))
        })
        .collect()
}
