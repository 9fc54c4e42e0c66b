//! PostgreSQL store over a pool or an explicit transaction.

use crate::config::DatabaseConfig;
use crate::error::{AppError, ConfigError, StoreError};
use crate::sql::{self, QueryBuf};
use crate::store::{RecordStore, Row, SelectQuery, TableRef};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Executor, PgPool, Postgres, Transaction};
use std::str::FromStr;
use tokio::sync::Mutex;

/// Pool-backed store. Each call runs on its own connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Create the database if needed, then open a pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        ensure_database_exists(&config.url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        tracing::info!(max_connections = config.max_connections, "database pool ready");
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start a transaction. The returned store must be committed explicitly; dropping it rolls back.
    pub async fn begin(&self) -> Result<PgTxStore, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgTxStore { tx: Mutex::new(tx) })
    }
}

/// Store scoped to one transaction, for multi-step flows that must not interleave.
pub struct PgTxStore {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PgTxStore {
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn count(&self, query: &SelectQuery) -> Result<u64, StoreError> {
        count_rows(&self.pool, &sql::count(query)).await
    }

    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        fetch_rows(&self.pool, &sql::select(query)).await
    }

    async fn insert(&self, table: &TableRef, row: &Row) -> Result<Row, StoreError> {
        fetch_one(&self.pool, &sql::insert(table, row))
            .await?
            .ok_or_else(|| StoreError::Backend(format!("insert into {} returned no row", table.name)))
    }

    async fn update(&self, table: &TableRef, id: &Value, row: &Row) -> Result<Option<Row>, StoreError> {
        fetch_one(&self.pool, &sql::update(table, id, row)).await
    }

    async fn delete(&self, table: &TableRef, id: &Value) -> Result<u64, StoreError> {
        execute(&self.pool, &sql::delete(table, id)).await
    }
}

#[async_trait]
impl RecordStore for PgTxStore {
    async fn count(&self, query: &SelectQuery) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        count_rows(&mut **tx, &sql::count(query)).await
    }

    async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        let mut tx = self.tx.lock().await;
        fetch_rows(&mut **tx, &sql::select(query)).await
    }

    async fn insert(&self, table: &TableRef, row: &Row) -> Result<Row, StoreError> {
        let mut tx = self.tx.lock().await;
        fetch_one(&mut **tx, &sql::insert(table, row))
            .await?
            .ok_or_else(|| StoreError::Backend(format!("insert into {} returned no row", table.name)))
    }

    async fn update(&self, table: &TableRef, id: &Value, row: &Row) -> Result<Option<Row>, StoreError> {
        let mut tx = self.tx.lock().await;
        fetch_one(&mut **tx, &sql::update(table, id, row)).await
    }

    async fn delete(&self, table: &TableRef, id: &Value) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        execute(&mut **tx, &sql::delete(table, id)).await
    }
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

async fn count_rows<'c, E>(executor: E, q: &QueryBuf) -> Result<u64, StoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    use sqlx::Row as _;
    let row = bind_all(q).fetch_one(executor).await?;
    let n: i64 = row.try_get("count")?;
    Ok(n.max(0) as u64)
}

async fn fetch_rows<'c, E>(executor: E, q: &QueryBuf) -> Result<Vec<Row>, StoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = bind_all(q).fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_one<'c, E>(executor: E, q: &QueryBuf) -> Result<Option<Row>, StoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = bind_all(q).fetch_optional(executor).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

async fn execute<'c, E>(executor: E, q: &QueryBuf) -> Result<u64, StoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    Ok(bind_all(q).execute(executor).await?.rows_affected())
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

/// Decode one cell by trying the column types the declarations can produce.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url).map_err(|e| {
        AppError::Config(ConfigError::InvalidValue {
            key: "DATABASE_URL".into(),
            value: e.to_string(),
        })
    })?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| {
        AppError::Config(ConfigError::InvalidValue {
            key: "DATABASE_URL".into(),
            value: "no database path".into(),
        })
    })? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}
