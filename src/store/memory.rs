//! In-process store. Evaluates the same queries the SQL builder renders, for tests and demos.

use crate::error::StoreError;
use crate::filter::{compare_values, ColumnRef, RowLookup};
use crate::schema::SqlType;
use crate::store::{RecordStore, Row, SelectQuery, SortDirection, TableRef};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    operations: AtomicUsize,
}

/// A main row plus the rows its joins matched, looked up by alias.
struct JoinedRow<'a> {
    main: &'a Row,
    joined: HashMap<&'a str, Option<&'a Row>>,
}

impl RowLookup for JoinedRow<'_> {
    fn lookup(&self, column: &ColumnRef) -> Option<&Value> {
        match column.table.as_deref() {
            None => self.main.get(&column.column),
            Some(alias) => match self.joined.get(alias) {
                Some(joined) => joined.and_then(|r| r.get(&column.column)),
                None => self.main.get(&column.column),
            },
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Insert rows as-is, bypassing defaults and unique checks.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) -> Result<(), StoreError> {
        self.write()?.entry(table.to_string()).or_default().extend(rows);
        Ok(())
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.read()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of store calls served so far.
    pub fn operation_count(&self) -> usize {
        self.operations.load(AtomicOrdering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Row>>>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Row>>>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn tick(&self) {
        self.operations.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Joined rows that satisfy every predicate, in stored order.
    fn matching<'a>(tables: &'a HashMap<String, Vec<Row>>, query: &'a SelectQuery) -> Vec<JoinedRow<'a>> {
        let Some(rows) = tables.get(&query.table.name) else {
            return Vec::new();
        };
        rows.iter()
            .map(|main| {
                let mut row = JoinedRow {
                    main,
                    joined: HashMap::new(),
                };
                for join in &query.joins {
                    let key = row.lookup(&join.right).cloned().unwrap_or(Value::Null);
                    let hit = tables
                        .get(&join.table)
                        .and_then(|target| target.iter().find(|r| same_value(r.get(&join.left.column), &key)));
                    row.joined.insert(join.alias.as_str(), hit);
                }
                row
            })
            .filter(|row| query.predicates.iter().all(|p| p.matches(row)))
            .collect()
    }
}

fn same_value(a: Option<&Value>, b: &Value) -> bool {
    matches!(a.and_then(|a| compare_values(a, b, None)), Some(Ordering::Equal))
}

/// ASC puts nulls last, DESC first.
fn compare_nullable(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b, None).unwrap_or(Ordering::Equal),
    }
}

fn default_value(table: &TableRef, column: &str, expression: &str) -> Value {
    if expression.to_uppercase().contains("NOW()") {
        return Value::String(chrono::Utc::now().to_rfc3339());
    }
    if expression.to_lowercase().contains("gen_random_uuid") {
        return Value::String(uuid::Uuid::new_v4().to_string());
    }
    serde_json::from_str(expression).unwrap_or_else(|_| {
        tracing::debug!(table = %table.name, column, expression, "default kept as text");
        Value::String(expression.trim_matches('\'').to_string())
    })
}

fn unique_violation(table: &TableRef, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Option<StoreError> {
    table
        .columns
        .iter()
        .filter(|c| c.unique || c.primary_key)
        .find_map(|c| {
            let value = candidate.get(&c.name).filter(|v| !v.is_null())?;
            rows.iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, r)| same_value(r.get(&c.name), value))
                .then(|| StoreError::UniqueViolation(format!("{}_{}_key", table.name, c.name)))
        })
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count(&self, query: &SelectQuery) -> Result<u64, StoreError> {
        self.tick();
        let tables = self.read()?;
        Ok(Self::matching(&tables, query).len() as u64)
    }

    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        self.tick();
        let tables = self.read()?;
        let mut rows = Self::matching(&tables, query);
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| {
                    let ord = compare_nullable(a.main.get(&o.column), b.main.get(&o.column));
                    match o.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(limit)
            .map(|row| {
                let mut out = row.main.clone();
                for inc in &query.includes {
                    let key = row.main.get(&inc.our_key).cloned().unwrap_or(Value::Null);
                    let related = tables
                        .get(&inc.table)
                        .and_then(|t| t.iter().find(|r| same_value(r.get(&inc.their_key), &key)))
                        .map(|r| Value::Object(r.clone()))
                        .unwrap_or(Value::Null);
                    out.insert(inc.name.clone(), related);
                }
                out
            })
            .collect())
    }

    async fn insert(&self, table: &TableRef, row: &Row) -> Result<Row, StoreError> {
        self.tick();
        let mut tables = self.write()?;
        let rows = tables.entry(table.name.clone()).or_default();
        let mut stored = Row::new();
        for c in &table.columns {
            let value = match row.get(&c.name).filter(|v| !v.is_null()) {
                Some(v) => v.clone(),
                None if c.primary_key => match c.sql_type {
                    SqlType::BigInt => {
                        let max = rows
                            .iter()
                            .filter_map(|r| r.get(&c.name).and_then(Value::as_i64))
                            .max()
                            .unwrap_or(0);
                        Value::from(max + 1)
                    }
                    SqlType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                    _ => {
                        return Err(StoreError::Backend(format!(
                            "{}.{} has no value and no generator",
                            table.name, c.name
                        )))
                    }
                },
                None => c
                    .default
                    .as_deref()
                    .map(|d| default_value(table, &c.name, d))
                    .unwrap_or(Value::Null),
            };
            stored.insert(c.name.clone(), value);
        }
        if let Some(err) = unique_violation(table, rows, &stored, None) {
            return Err(err);
        }
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: &TableRef, id: &Value, row: &Row) -> Result<Option<Row>, StoreError> {
        self.tick();
        let mut tables = self.write()?;
        let rows = tables.entry(table.name.clone()).or_default();
        let Some(index) = rows.iter().position(|r| same_value(r.get(&table.primary_key), id)) else {
            return Ok(None);
        };
        let mut updated = rows[index].clone();
        for c in &table.columns {
            if c.name == table.primary_key {
                continue;
            }
            if let Some(v) = row.get(&c.name) {
                updated.insert(c.name.clone(), v.clone());
            }
        }
        if let Some(err) = unique_violation(table, rows, &updated, Some(index)) {
            return Err(err);
        }
        rows[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete(&self, table: &TableRef, id: &Value) -> Result<u64, StoreError> {
        self.tick();
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&table.name) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !same_value(r.get(&table.primary_key), id));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Predicate;
    use crate::schema::ColumnDef;
    use crate::store::{Include, Join, OrderBy};
    use serde_json::json;

    fn col(name: &str, sql_type: SqlType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            sql_type,
            primary_key: name == "id",
            unique: name == "name",
            default: (name == "created_at").then(|| "NOW()".to_string()),
        }
    }

    fn sites() -> TableRef {
        TableRef {
            name: "sites".into(),
            primary_key: "id".into(),
            columns: vec![col("id", SqlType::BigInt), col("name", SqlType::Text)],
        }
    }

    fn devices() -> TableRef {
        TableRef {
            name: "devices".into(),
            primary_key: "id".into(),
            columns: vec![
                col("id", SqlType::BigInt),
                col("name", SqlType::Text),
                col("site_id", SqlType::BigInt),
                col("created_at", SqlType::TimestampTz),
            ],
        }
    }

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_keys_and_defaults() {
        let store = MemoryStore::new();
        let a = store.insert(&devices(), &row(json!({ "name": "a" }))).await.unwrap();
        let b = store.insert(&devices(), &row(json!({ "name": "b", "id": null }))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a["created_at"].is_string());
        assert_eq!(a["site_id"], Value::Null);
    }

    #[tokio::test]
    async fn unique_columns_reject_duplicates() {
        let store = MemoryStore::new();
        store.insert(&devices(), &row(json!({ "name": "a" }))).await.unwrap();
        let err = store.insert(&devices(), &row(json!({ "name": "a" }))).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.rows("devices").len(), 1);
    }

    #[tokio::test]
    async fn joins_filters_order_and_includes() {
        let store = MemoryStore::new();
        store
            .seed("sites", vec![row(json!({ "id": 1, "name": "North" })), row(json!({ "id": 2, "name": "South" }))])
            .unwrap();
        store
            .seed(
                "devices",
                vec![
                    row(json!({ "id": 1, "name": "a", "site_id": 2 })),
                    row(json!({ "id": 2, "name": "b", "site_id": 1 })),
                    row(json!({ "id": 3, "name": "c", "site_id": null })),
                    row(json!({ "id": 4, "name": "d", "site_id": 2 })),
                ],
            )
            .unwrap();

        let mut query = SelectQuery::new(devices());
        query
            .join(Join {
                table: "sites".into(),
                alias: "sel_site_id".into(),
                left: ColumnRef::qualified("sel_site_id", "id"),
                right: ColumnRef::new("site_id"),
            })
            .filter(Predicate::Contains {
                column: ColumnRef::qualified("sel_site_id", "name"),
                needle: "south".into(),
            })
            .order_by(OrderBy::desc("id"));
        query.includes.push(Include {
            name: "Site".into(),
            table: "sites".into(),
            their_key: "id".into(),
            our_key: "site_id".into(),
        });

        assert_eq!(store.count(&query).await.unwrap(), 2);
        let rows = store.fetch(&query).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(1)]);
        assert_eq!(rows[0]["Site"]["name"], json!("South"));

        query.predicates.clear();
        query.order = vec![OrderBy::asc("site_id")];
        let rows = store.fetch(&query).await.unwrap();
        assert_eq!(rows.last().unwrap()["id"], json!(3));
        assert_eq!(rows.last().unwrap()["Site"], Value::Null);
    }

    #[tokio::test]
    async fn update_and_delete_by_key() {
        let store = MemoryStore::new();
        store.insert(&sites(), &row(json!({ "name": "North" }))).await.unwrap();
        let updated = store
            .update(&sites(), &json!(1), &row(json!({ "id": 7, "name": "Nord" })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated, row(json!({ "id": 1, "name": "Nord" })));
        assert!(store.update(&sites(), &json!(9), &Row::new()).await.unwrap().is_none());
        assert_eq!(store.delete(&sites(), &json!(1)).await.unwrap(), 1);
        assert_eq!(store.delete(&sites(), &json!(1)).await.unwrap(), 0);
        assert_eq!(store.operation_count(), 5);
    }
}
