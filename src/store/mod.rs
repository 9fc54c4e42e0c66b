//! Record stores: the query shape the engine emits and the backends that execute it.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore, PgTxStore};

use crate::error::StoreError;
use crate::filter::{ColumnRef, Predicate};
use crate::schema::{ColumnDef, RecordTypeDescriptor};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One stored row, keyed by column name.
pub type Row = Map<String, Value>;

/// Physical table of a record type.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
}

impl TableRef {
    pub fn of(descriptor: &RecordTypeDescriptor) -> Self {
        TableRef {
            name: descriptor.table_name.clone(),
            primary_key: descriptor.primary_key.clone(),
            columns: descriptor.columns.clone(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Ordering on a column of the queried table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// `LEFT JOIN table AS alias ON left = right`.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    /// Column of the joined table (qualified by `alias`).
    pub left: ColumnRef,
    /// Column of the queried table.
    pub right: ColumnRef,
}

/// Related row embedded in each result under `name` (null when absent).
#[derive(Clone, Debug, PartialEq)]
pub struct Include {
    pub name: String,
    pub table: String,
    pub their_key: String,
    pub our_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub table: TableRef,
    pub joins: Vec<Join>,
    /// AND-ed together.
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub includes: Vec<Include>,
}

impl SelectQuery {
    pub fn new(table: TableRef) -> Self {
        SelectQuery {
            table,
            joins: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            includes: Vec::new(),
        }
    }

    /// Add a join unless one with the same alias is already present.
    pub fn join(&mut self, join: Join) -> &mut Self {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
        self
    }

    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order.push(order);
        self
    }

    pub fn is_ordered_by(&self, column: &str) -> bool {
        self.order.iter().any(|o| o.column == column)
    }
}

/// Backend executing engine queries. Rows go in and out as JSON maps keyed by column.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows matching the joins and predicates; order, paging and includes are ignored.
    async fn count(&self, query: &SelectQuery) -> Result<u64, StoreError>;

    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Row>, StoreError>;

    /// Insert the given columns; absent ones take their defaults. Returns the stored row.
    async fn insert(&self, table: &TableRef, row: &Row) -> Result<Row, StoreError>;

    /// Set the given columns on the row with primary key `id`. `None` when no row matched.
    async fn update(&self, table: &TableRef, id: &Value, row: &Row) -> Result<Option<Row>, StoreError>;

    /// Number of rows deleted.
    async fn delete(&self, table: &TableRef, id: &Value) -> Result<u64, StoreError>;
}
