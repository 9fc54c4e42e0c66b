//! Resolved record schema: declarations flattened for runtime use and presentation.

use serde::Serialize;
use serde_json::Value;

/// `selectorOf` value for fields whose options come from an enum annotation.
pub const ENUM_SELECTOR: &str = "enum";

/// Presentation kind of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Password,
    Number,
    Bool,
    Date,
    Select,
}

/// One entry of a record type's presentation/query schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub block: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub chart_data: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub tags: bool,
    #[serde(rename = "short-span", skip_serializing_if = "is_false")]
    pub short_span: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDescriptor {
    pub fn is_enum_selector(&self) -> bool {
        self.selector_of.as_deref() == Some(ENUM_SELECTOR)
    }

    /// Referenced record type name for relation selectors (not enum selectors).
    pub fn selector_target(&self) -> Option<&str> {
        match (self.kind, self.selector_of.as_deref()) {
            (Some(FieldKind::Select), Some(target)) if target != ENUM_SELECTOR => Some(target),
            _ => None,
        }
    }
}

/// PostgreSQL type used for columns and parameter casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    BigInt,
    Double,
    Numeric,
    Boolean,
    TimestampTz,
    Date,
    Uuid,
    Jsonb,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "text",
            SqlType::BigInt => "bigint",
            SqlType::Double => "double precision",
            SqlType::Numeric => "numeric",
            SqlType::Boolean => "boolean",
            SqlType::TimestampTz => "timestamptz",
            SqlType::Date => "date",
            SqlType::Uuid => "uuid",
            SqlType::Jsonb => "jsonb",
        }
    }
}

/// Primary key type for parsing caller-supplied ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Integer,
    Uuid,
    Text,
}

impl IdKind {
    /// Parse a raw id. Returns None when the id cannot belong to this key type.
    pub fn parse_id(&self, raw: &str) -> Option<Value> {
        match self {
            IdKind::Integer => raw.trim().parse::<i64>().ok().map(|n| Value::Number(n.into())),
            IdKind::Uuid => uuid::Uuid::parse_str(raw.trim()).ok().map(|u| Value::String(u.to_string())),
            IdKind::Text => Some(Value::String(raw.to_string())),
        }
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            IdKind::Integer => SqlType::BigInt,
            IdKind::Uuid => SqlType::Uuid,
            IdKind::Text => SqlType::Text,
        }
    }
}

/// Storage column derived from a declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub unique: bool,
    /// Whether the column has a DB default (e.g. NOW()).
    pub default: Option<String>,
}

/// Operations a record type exposes through the generic service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: &'static [Operation] = &[
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Full schema of one registered record type. Serializes to the presentation schema.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordTypeDescriptor {
    #[serde(skip)]
    pub type_name: String,
    #[serde(skip)]
    pub table_name: String,
    #[serde(skip)]
    pub primary_key: String,
    #[serde(skip)]
    pub id_kind: IdKind,
    /// Column matched by free-text queries and by selector filters pointing at this type.
    #[serde(skip)]
    pub display_column: String,
    pub title: String,
    #[serde(rename = "apiUrl")]
    pub api_path: String,
    pub fields: Vec<FieldDescriptor>,
    pub actions: Vec<String>,
    #[serde(skip)]
    pub columns: Vec<ColumnDef>,
    #[serde(skip)]
    pub operations: Vec<Operation>,
}

impl RecordTypeDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serializes_only_set_flags() {
        let field = FieldDescriptor {
            name: "role".into(),
            label: "Role".into(),
            kind: Some(FieldKind::Select),
            short_span: true,
            selector_of: Some(ENUM_SELECTOR.into()),
            allowed_values: Some(vec!["Admin".into()]),
            ..Default::default()
        };
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "role",
                "label": "Role",
                "type": "select",
                "short-span": true,
                "selectorOf": "enum",
                "allowedValues": ["Admin"]
            })
        );
        assert!(field.is_enum_selector());
        assert_eq!(field.selector_target(), None);
    }

    #[test]
    fn id_kinds_parse_or_reject() {
        assert_eq!(IdKind::Integer.parse_id("42"), Some(serde_json::json!(42)));
        assert_eq!(IdKind::Integer.parse_id("abc"), None);
        assert_eq!(IdKind::Uuid.parse_id("not-a-uuid"), None);
        assert_eq!(IdKind::Text.parse_id("K-1"), Some(serde_json::json!("K-1")));
    }
}
