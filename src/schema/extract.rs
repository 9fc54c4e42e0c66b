//! Build descriptors and columns from a record type's field declarations.

use crate::record::Record;
use crate::schema::resolved::{
    ColumnDef, FieldDescriptor, FieldKind, IdKind, RecordTypeDescriptor, SqlType, ENUM_SELECTOR,
};
use crate::schema::types::{Annotation, FieldDecl, FieldType};

/// Build the full descriptor of `R` (call at registration).
pub fn describe<R: Record>() -> RecordTypeDescriptor {
    let decls = R::fields();
    RecordTypeDescriptor {
        type_name: R::TYPE_NAME.to_string(),
        table_name: R::TABLE_NAME.to_string(),
        primary_key: R::PRIMARY_KEY.to_string(),
        id_kind: R::ID_KIND,
        display_column: R::DISPLAY_COLUMN.to_string(),
        title: R::TITLE.to_string(),
        api_path: R::API_PATH.to_string(),
        fields: extract_fields(R::TYPE_NAME, &decls),
        actions: R::EXTRA_ACTIONS.iter().map(|a| a.to_string()).collect(),
        columns: extract_columns(&decls, R::PRIMARY_KEY, R::ID_KIND),
        operations: R::OPERATIONS.to_vec(),
    }
}

/// Ordered field descriptors: embedded fields flattened in place, hidden fields skipped.
pub fn extract_fields(type_name: &str, decls: &[FieldDecl]) -> Vec<FieldDescriptor> {
    let mut fields = Vec::new();
    for decl in decls {
        if let FieldType::Embedded(inner) = &decl.ty {
            tracing::debug!(record_type = type_name, field = %decl.name, "flattening embedded field");
            fields.extend(extract_fields(type_name, inner));
            continue;
        }
        if decl.is_hidden() {
            continue;
        }
        let field = describe_field(decl);
        tracing::debug!(
            record_type = type_name,
            field = %decl.name,
            kind = ?field.kind,
            selector_of = ?field.selector_of,
            "field descriptor"
        );
        fields.push(field);
    }
    fields
}

fn describe_field(decl: &FieldDecl) -> FieldDescriptor {
    let mut field = FieldDescriptor {
        name: decl.wire_name(),
        label: decl.name.clone(),
        optional: decl.has(&Annotation::Optional),
        block: decl.has(&Annotation::Block),
        chart_data: decl.has(&Annotation::ChartData),
        tags: decl.has(&Annotation::Tags),
        short_span: decl.has(&Annotation::ShortSpan),
        sensitive: decl.has(&Annotation::Sensitive),
        master_selector: decl.master_selector().map(str::to_string),
        href: decl.href().map(str::to_string),
        ..Default::default()
    };

    let enum_values = decl.enum_values();
    let relation_target = match (&decl.ty, &decl.foreign_key) {
        (FieldType::Record(target), Some(_)) if !target.is_empty() => Some(target.as_str()),
        _ => None,
    };

    if enum_values.is_some() || relation_target.is_some() {
        if let Some(fk) = decl.foreign_key.as_deref().filter(|fk| !fk.is_empty()) {
            field.name = fk.to_string();
        }
        field.kind = Some(FieldKind::Select);
        field.selector_of = match (enum_values, relation_target) {
            (Some(_), _) => Some(ENUM_SELECTOR.to_string()),
            (None, target) => target.map(str::to_string),
        };
        field.allowed_values = enum_values.map(<[String]>::to_vec);
        return field;
    }

    field.kind = match decl.ty {
        FieldType::Text if field.sensitive => Some(FieldKind::Password),
        FieldType::Text => Some(FieldKind::Text),
        FieldType::Integer => Some(FieldKind::Number),
        FieldType::Bool => Some(FieldKind::Bool),
        FieldType::DateTime => Some(FieldKind::Date),
        _ => None,
    };
    field
}

/// Storage columns in declaration order. Relation fields are not columns; hidden ones are.
pub fn extract_columns(decls: &[FieldDecl], primary_key: &str, id_kind: IdKind) -> Vec<ColumnDef> {
    let mut columns = Vec::new();
    collect_columns(decls, primary_key, id_kind, &mut columns);
    columns
}

fn collect_columns(decls: &[FieldDecl], primary_key: &str, id_kind: IdKind, out: &mut Vec<ColumnDef>) {
    for decl in decls {
        let sql_type = match &decl.ty {
            FieldType::Embedded(inner) => {
                collect_columns(inner, primary_key, id_kind, out);
                continue;
            }
            FieldType::Record(_) => continue,
            FieldType::Text => SqlType::Text,
            FieldType::Integer => SqlType::BigInt,
            FieldType::Bool => SqlType::Boolean,
            FieldType::DateTime => SqlType::TimestampTz,
            FieldType::Float => SqlType::Double,
            FieldType::Other => SqlType::Jsonb,
        };
        let name = decl.wire_name();
        let is_pk = name == primary_key;
        out.push(ColumnDef {
            sql_type: if is_pk { id_kind.sql_type() } else { sql_type },
            primary_key: is_pk,
            unique: decl.has(&Annotation::Unique),
            default: decl.db_default.clone(),
            name,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> FieldDecl {
        FieldDecl::embedded(
            "Audit",
            vec![
                FieldDecl::datetime("CreatedAt").json("created_at"),
                FieldDecl::embedded("Owner", vec![FieldDecl::text("OwnerName").json("owner_name").optional()]),
            ],
        )
    }

    fn decls() -> Vec<FieldDecl> {
        vec![
            FieldDecl::integer("ID").json("id").hidden(),
            FieldDecl::text("Name").json("username").extras("short-span,unique"),
            FieldDecl::text("Password").json("password").sensitive(),
            FieldDecl::text("Role").json("role").extras("enum:Admin|Scraper"),
            FieldDecl::integer("Port").extras("optional,block,chartData,tags,whatever"),
            FieldDecl::bool("Active").json("-"),
            FieldDecl::float("Ratio").json("ratio"),
            FieldDecl::other("Meta").json("meta"),
            FieldDecl::integer("DeviceId").json("device_id").hidden(),
            FieldDecl::relation("Device", "Device", "device_id").extras("masterSelector:site_id,href:device_url"),
            audit(),
        ]
    }

    #[test]
    fn hidden_fields_never_appear() {
        let fields = extract_fields("Sample", &decls());
        assert!(fields.iter().all(|f| f.name != "id"));
        assert_eq!(fields.iter().filter(|f| f.name == "device_id").count(), 1);
    }

    #[test]
    fn fields_keep_declaration_order_with_embedded_flattened() {
        let names: Vec<_> = extract_fields("Sample", &decls()).into_iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "username", "password", "role", "port", "active", "ratio", "meta", "device_id", "created_at",
                "owner_name"
            ]
        );
    }

    #[test]
    fn kinds_follow_precedence() {
        let fields = extract_fields("Sample", &decls());
        let kind = |name: &str| fields.iter().find(|f| f.name == name).unwrap().kind;
        assert_eq!(kind("username"), Some(FieldKind::Text));
        assert_eq!(kind("password"), Some(FieldKind::Password));
        assert_eq!(kind("role"), Some(FieldKind::Select));
        assert_eq!(kind("port"), Some(FieldKind::Number));
        assert_eq!(kind("active"), Some(FieldKind::Bool));
        assert_eq!(kind("created_at"), Some(FieldKind::Date));
        assert_eq!(kind("ratio"), None);
        assert_eq!(kind("meta"), None);
        assert_eq!(kind("device_id"), Some(FieldKind::Select));
    }

    #[test]
    fn selectors_carry_targets_and_metadata() {
        let fields = extract_fields("Sample", &decls());
        let role = fields.iter().find(|f| f.name == "role").unwrap();
        assert_eq!(role.selector_of.as_deref(), Some("enum"));
        assert_eq!(role.allowed_values, Some(vec!["Admin".to_string(), "Scraper".to_string()]));

        let device = fields.iter().find(|f| f.name == "device_id").unwrap();
        assert_eq!(device.label, "Device");
        assert_eq!(device.selector_of.as_deref(), Some("Device"));
        assert_eq!(device.master_selector.as_deref(), Some("site_id"));
        assert_eq!(device.href.as_deref(), Some("device_url"));

        for f in fields.iter().filter(|f| f.kind == Some(FieldKind::Select)) {
            assert!(!f.selector_of.as_deref().unwrap_or("").is_empty());
        }
    }

    #[test]
    fn relation_without_target_is_not_a_selector() {
        let fields = extract_fields("Sample", &[FieldDecl::relation("Ghost", "", "ghost_id")]);
        assert_eq!(fields[0].kind, None);
        assert_eq!(fields[0].selector_of, None);
    }

    #[test]
    fn flags_are_additive() {
        let fields = extract_fields("Sample", &decls());
        let port = fields.iter().find(|f| f.name == "port").unwrap();
        assert!(port.optional && port.block && port.chart_data && port.tags);
        assert!(!port.short_span && !port.sensitive);
        let owner = fields.iter().find(|f| f.name == "owner_name").unwrap();
        assert!(owner.optional);
    }

    #[test]
    fn columns_skip_relations_and_type_the_primary_key() {
        let columns = extract_columns(&decls(), "id", IdKind::Uuid);
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id", "username", "password", "role", "port", "active", "ratio", "meta", "device_id", "created_at",
                "owner_name"
            ]
        );
        assert!(columns[0].primary_key);
        assert_eq!(columns[0].sql_type, SqlType::Uuid);
        assert!(columns[1].unique);
        assert_eq!(columns[7].sql_type, SqlType::Jsonb);
    }
}
