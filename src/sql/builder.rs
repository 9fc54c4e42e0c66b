//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from store queries.

use crate::filter::{ColumnRef, Predicate};
use crate::schema::SqlType;
use crate::sql::params::PgBindValue;
use crate::store::{Row, SelectQuery, TableRef};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from declarations).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Bind `v` and return its placeholder, cast to `sql_type` (text when unset).
    fn placeholder(&mut self, v: &Value, sql_type: Option<SqlType>) -> String {
        let n = self.push_param(PgBindValue::for_type(v, sql_type));
        match sql_type {
            Some(t) => format!("${}::{}", n, t.as_sql()),
            None => format!("${}", n),
        }
    }
}

fn column_expr(c: &ColumnRef) -> String {
    format!("{}.{}", quoted(c.table.as_deref().unwrap_or(MAIN_ALIAS)), quoted(&c.column))
}

/// Escape LIKE wildcards so the needle matches literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Render a predicate, binding every value.
pub fn render_predicate(q: &mut QueryBuf, p: &Predicate) -> String {
    match p {
        Predicate::Compare { column, op, value, cast } => {
            let lhs = cast_column(column, *cast);
            let rhs = q.placeholder(value, Some(cast.unwrap_or(SqlType::Text)));
            format!("{} {} {}", lhs, op.as_sql(), rhs)
        }
        Predicate::Between { column, low, high, cast } => {
            let lhs = cast_column(column, *cast);
            let low = q.placeholder(low, Some(cast.unwrap_or(SqlType::Text)));
            let high = q.placeholder(high, Some(cast.unwrap_or(SqlType::Text)));
            format!("{} BETWEEN {} AND {}", lhs, low, high)
        }
        Predicate::Contains { column, needle } => {
            let n = q.push_param(PgBindValue::Text(like_pattern(needle)));
            format!("{}::text ILIKE ${}", column_expr(column), n)
        }
        Predicate::ContainsAny { column, needles } => {
            if needles.is_empty() {
                return "FALSE".into();
            }
            let col = column_expr(column);
            let parts: Vec<String> = needles
                .iter()
                .map(|needle| {
                    let n = q.push_param(PgBindValue::Text(like_pattern(needle)));
                    format!("{}::text ILIKE ${}", col, n)
                })
                .collect();
            format!("({})", parts.join(" OR "))
        }
        Predicate::Blank(column) => {
            let col = column_expr(column);
            format!("({} IS NULL OR {}::text = '')", col, col)
        }
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(q, inner)),
        Predicate::And(items) => join_predicates(q, items, " AND ", "TRUE"),
        Predicate::Or(items) => join_predicates(q, items, " OR ", "FALSE"),
    }
}

fn join_predicates(q: &mut QueryBuf, items: &[Predicate], sep: &str, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = items.iter().map(|p| render_predicate(q, p)).collect();
    format!("({})", parts.join(sep))
}

/// Dates compare at UTC day granularity, untyped comparisons as text.
fn cast_column(column: &ColumnRef, cast: Option<SqlType>) -> String {
    match cast {
        Some(SqlType::Date) => format!("({} AT TIME ZONE 'UTC')::date", column_expr(column)),
        None | Some(SqlType::Text) => format!("{}::text", column_expr(column)),
        Some(_) => column_expr(column),
    }
}

fn from_clause(q: &mut QueryBuf, query: &SelectQuery) -> String {
    let mut sql = format!(" FROM {} {}", quoted(&query.table.name), MAIN_ALIAS);
    for join in &query.joins {
        sql.push_str(&format!(
            " LEFT JOIN {} {} ON {} = {}",
            quoted(&join.table),
            quoted(&join.alias),
            column_expr(&join.left),
            column_expr(&join.right)
        ));
    }
    if !query.predicates.is_empty() {
        let parts: Vec<String> = query.predicates.iter().map(|p| render_predicate(q, p)).collect();
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }
    sql
}

fn column_list(table: &TableRef) -> String {
    table
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT with joins, predicates, order and paging. Each include is a `row_to_json` scalar subquery.
pub fn select(query: &SelectQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut select_parts: Vec<String> = query
        .table
        .columns
        .iter()
        .map(|c| format!("{}.{}", MAIN_ALIAS, quoted(&c.name)))
        .collect();
    for inc in &query.includes {
        select_parts.push(format!(
            "(SELECT row_to_json(inc) FROM {} inc WHERE inc.{} = {}.{} LIMIT 1) AS {}",
            quoted(&inc.table),
            quoted(&inc.their_key),
            MAIN_ALIAS,
            quoted(&inc.our_key),
            quoted(&inc.name)
        ));
    }
    let from = from_clause(&mut q, query);
    let order_clause = if query.order.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{} {}", MAIN_ALIAS, quoted(&o.column), o.direction.as_sql()))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };
    let limit_clause = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = if query.offset > 0 {
        format!(" OFFSET {}", query.offset.min(i64::MAX as u64))
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {}{}{}{}{}",
        select_parts.join(", "),
        from,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// COUNT(*) over the same joins and predicates.
pub fn count(query: &SelectQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let from = from_clause(&mut q, query);
    q.sql = format!("SELECT COUNT(*) AS count{}", from);
    q
}

/// INSERT the columns present in `row`; `DEFAULT VALUES` when none are.
pub fn insert(table: &TableRef, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let Some(v) = row.get(&c.name) else { continue };
        placeholders.push(q.placeholder(v, Some(c.sql_type)));
        cols.push(quoted(&c.name));
    }
    let values = if cols.is_empty() {
        "DEFAULT VALUES".to_string()
    } else {
        format!("({}) VALUES ({})", cols.join(", "), placeholders.join(", "))
    };
    q.sql = format!(
        "INSERT INTO {} {} RETURNING {}",
        quoted(&table.name),
        values,
        column_list(table)
    );
    q
}

fn pk_type(table: &TableRef) -> SqlType {
    table
        .column(&table.primary_key)
        .map(|c| c.sql_type)
        .unwrap_or(SqlType::Text)
}

/// UPDATE by id: SET the non-key columns present in `row`. Plain SELECT by id when there are none.
pub fn update(table: &TableRef, id: &Value, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &table.columns {
        if c.name == table.primary_key {
            continue;
        }
        let Some(v) = row.get(&c.name) else { continue };
        let rhs = q.placeholder(v, Some(c.sql_type));
        sets.push(format!("{} = {}", quoted(&c.name), rhs));
    }
    let table_name = quoted(&table.name);
    let columns = column_list(table);
    if sets.is_empty() {
        let id_ph = q.placeholder(id, Some(pk_type(table)));
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            columns,
            table_name,
            quoted(&table.primary_key),
            id_ph
        );
        return q;
    }
    let id_ph = q.placeholder(id, Some(pk_type(table)));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        table_name,
        sets.join(", "),
        quoted(&table.primary_key),
        id_ph,
        columns
    );
    q
}

/// DELETE by id.
pub fn delete(table: &TableRef, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = q.placeholder(id, Some(pk_type(table)));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(&table.name),
        quoted(&table.primary_key),
        id_ph
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Comparator;
    use crate::schema::ColumnDef;
    use crate::store::{Include, Join, OrderBy};
    use serde_json::json;

    fn col(name: &str, sql_type: SqlType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            sql_type,
            primary_key: name == "id",
            unique: false,
            default: None,
        }
    }

    fn devices() -> TableRef {
        TableRef {
            name: "devices".into(),
            primary_key: "id".into(),
            columns: vec![
                col("id", SqlType::BigInt),
                col("name", SqlType::Text),
                col("port", SqlType::BigInt),
                col("meta", SqlType::Jsonb),
            ],
        }
    }

    #[test]
    fn select_binds_every_filter_value() {
        let mut query = SelectQuery::new(devices());
        query
            .join(Join {
                table: "sites".into(),
                alias: "sel_site_id".into(),
                left: ColumnRef::qualified("sel_site_id", "id"),
                right: ColumnRef::new("site_id"),
            })
            .filter(Predicate::ContainsAny {
                column: ColumnRef::new("name"),
                needles: vec!["a'b".into(), "50%".into()],
            })
            .filter(Predicate::Compare {
                column: ColumnRef::new("port"),
                op: Comparator::Ge,
                value: json!(80),
                cast: Some(SqlType::Numeric),
            })
            .filter(Predicate::Contains {
                column: ColumnRef::qualified("sel_site_id", "name"),
                needle: "north".into(),
            }.negate())
            .order_by(OrderBy::desc("port"));
        query.limit = Some(20);
        query.offset = 40;

        let q = select(&query);
        assert_eq!(
            q.sql,
            "SELECT main.\"id\", main.\"name\", main.\"port\", main.\"meta\" FROM \"devices\" main \
             LEFT JOIN \"sites\" \"sel_site_id\" ON \"sel_site_id\".\"id\" = \"main\".\"site_id\" \
             WHERE (\"main\".\"name\"::text ILIKE $1 OR \"main\".\"name\"::text ILIKE $2) \
             AND \"main\".\"port\" >= $3::numeric \
             AND NOT (\"sel_site_id\".\"name\"::text ILIKE $4) \
             ORDER BY main.\"port\" DESC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            q.params,
            vec![
                PgBindValue::Text("%a'b%".into()),
                PgBindValue::Text("%50\\%%".into()),
                PgBindValue::Text("80".into()),
                PgBindValue::Text("%north%".into()),
            ]
        );
    }

    #[test]
    fn offset_stays_in_bigint_range() {
        let mut query = SelectQuery::new(devices());
        query.limit = Some(20);
        query.offset = u64::MAX;
        let q = select(&query);
        assert!(q.sql.ends_with(" LIMIT 20 OFFSET 9223372036854775807"), "{}", q.sql);
    }

    #[test]
    fn dates_cast_the_column() {
        let mut q = QueryBuf::new();
        let sql = render_predicate(
            &mut q,
            &Predicate::Between {
                column: ColumnRef::new("seen"),
                low: json!("2024-01-01"),
                high: json!("2024-01-31"),
                cast: Some(SqlType::Date),
            },
        );
        assert_eq!(
            sql,
            "(\"main\".\"seen\" AT TIME ZONE 'UTC')::date BETWEEN $1::date AND $2::date"
        );
    }

    #[test]
    fn includes_render_as_scalar_subqueries() {
        let mut query = SelectQuery::new(devices());
        query.includes.push(Include {
            name: "Site".into(),
            table: "sites".into(),
            their_key: "id".into(),
            our_key: "site_id".into(),
        });
        let q = select(&query);
        assert!(q.sql.contains(
            "(SELECT row_to_json(inc) FROM \"sites\" inc WHERE inc.\"id\" = main.\"site_id\" LIMIT 1) AS \"Site\""
        ));
        let c = count(&query);
        assert_eq!(c.sql, "SELECT COUNT(*) AS count FROM \"devices\" main");
    }

    #[test]
    fn insert_casts_to_column_types() {
        let row = json!({ "name": "edge", "meta": "x" }).as_object().cloned().unwrap();
        let q = insert(&devices(), &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"devices\" (\"name\", \"meta\") VALUES ($1::text, $2::jsonb) RETURNING \"id\", \"name\", \"port\", \"meta\""
        );
        assert_eq!(q.params[1], PgBindValue::Text("\"x\"".into()));

        let empty = insert(&devices(), &Row::new());
        assert!(empty.sql.starts_with("INSERT INTO \"devices\" DEFAULT VALUES RETURNING"));
    }

    #[test]
    fn update_never_sets_the_key() {
        let row = json!({ "id": 9, "port": 22 }).as_object().cloned().unwrap();
        let q = update(&devices(), &json!(3), &row);
        assert_eq!(
            q.sql,
            "UPDATE \"devices\" SET \"port\" = $1::bigint WHERE \"id\" = $2::bigint RETURNING \"id\", \"name\", \"port\", \"meta\""
        );
        let d = delete(&devices(), &json!(3));
        assert_eq!(d.sql, "DELETE FROM \"devices\" WHERE \"id\" = $1::bigint");
    }
}
