//! Compile `(operator, value, value2)` filter triples into predicates, per field kind.

use crate::error::AppError;
use crate::filter::operator::{Comparator, FilterOperator};
use crate::filter::predicate::{parse_bool, parse_day, ColumnRef, Predicate};
use crate::filter::{FieldFilter, FilterMode};
use crate::registry::TypeRegistry;
use crate::schema::{FieldDescriptor, FieldKind, RecordTypeDescriptor, SqlType};
use crate::store::Join;
use serde_json::{Number, Value};
use std::collections::HashMap;

/// A compiled filter: a predicate, plus the join it needs for selector fields.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledFilter {
    pub join: Option<Join>,
    pub predicate: Predicate,
}

/// Compile one filter against `column`.
///
/// `Ok(None)` means the operator is unknown or does not apply to `kind`; callers decide
/// whether that is ignored or rejected. Malformed values are always a validation error.
pub fn compile_predicate(
    kind: Option<FieldKind>,
    operator: &str,
    value: &str,
    value2: Option<&str>,
    column: ColumnRef,
) -> Result<Option<Predicate>, AppError> {
    let Some(op) = FilterOperator::parse(operator) else {
        return Ok(None);
    };
    match kind {
        Some(FieldKind::Number) => ordered(op, value, value2, column, SqlType::Numeric, parse_number),
        Some(FieldKind::Bool) => ordered(op, value, value2, column, SqlType::Boolean, parse_boolean),
        Some(FieldKind::Date) => ordered(op, value, value2, column, SqlType::Date, parse_date),
        _ => textual(op, value, column),
    }
}

fn ordered(
    op: FilterOperator,
    value: &str,
    value2: Option<&str>,
    column: ColumnRef,
    cast: SqlType,
    parse: fn(&str) -> Result<Value, AppError>,
) -> Result<Option<Predicate>, AppError> {
    let compare = |op: Comparator, column: ColumnRef| -> Result<Predicate, AppError> {
        Ok(Predicate::Compare {
            column,
            op,
            value: parse(value)?,
            cast: Some(cast),
        })
    };
    let predicate = match op {
        FilterOperator::Equals => compare(Comparator::Eq, column)?,
        FilterOperator::NotEquals => compare(Comparator::Ne, column)?,
        FilterOperator::Compare(c) => compare(c, column)?,
        FilterOperator::Between => {
            let high = value2
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Validation("between needs a second value".into()))?;
            Predicate::Between {
                column,
                low: parse(value)?,
                high: parse(high)?,
                cast: Some(cast),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

fn textual(op: FilterOperator, value: &str, column: ColumnRef) -> Result<Option<Predicate>, AppError> {
    let equals = |column: ColumnRef| Predicate::Compare {
        column,
        op: Comparator::Eq,
        value: Value::String(value.to_string()),
        cast: None,
    };
    let predicate = match op {
        FilterOperator::Contains => Predicate::Contains {
            column,
            needle: value.to_string(),
        },
        FilterOperator::NotContains => Predicate::Contains {
            column,
            needle: value.to_string(),
        }
        .negate(),
        FilterOperator::Equals => equals(column),
        FilterOperator::NotEquals => equals(column).negate(),
        FilterOperator::In => {
            // an empty item matches every non-null value
            let needles = value.split(',').map(|s| s.trim().to_string()).collect();
            Predicate::ContainsAny { column, needles }
        }
        FilterOperator::Blank => Predicate::Blank(column),
        FilterOperator::NotBlank => Predicate::Blank(column).negate(),
        FilterOperator::Between | FilterOperator::Compare(_) => return Ok(None),
    };
    Ok(Some(predicate))
}

fn parse_number(raw: &str) -> Result<Value, AppError> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Ok(Value::from(n));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| AppError::Validation(format!("'{}' is not a number", raw)))
}

fn parse_boolean(raw: &str) -> Result<Value, AppError> {
    parse_bool(raw)
        .map(Value::Bool)
        .ok_or_else(|| AppError::Validation(format!("'{}' is not a boolean", raw)))
}

fn parse_date(raw: &str) -> Result<Value, AppError> {
    parse_day(raw)
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| AppError::Validation(format!("'{}' is not a date", raw)))
}

/// Compiles request filters for one record type, resolving selector targets through the registry.
pub struct FilterCompiler<'a> {
    registry: &'a TypeRegistry,
    mode: FilterMode,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a TypeRegistry, mode: FilterMode) -> Self {
        FilterCompiler { registry, mode }
    }

    /// Compile every active filter of `descriptor`, in field order.
    pub fn compile_all(
        &self,
        descriptor: &RecordTypeDescriptor,
        filters: &HashMap<String, FieldFilter>,
    ) -> Result<Vec<CompiledFilter>, AppError> {
        for name in filters.keys() {
            if descriptor.field(name).is_none() {
                self.mode.reject_or_warn(format!("no filterable field '{}' on {}", name, descriptor.type_name))?;
            }
        }
        let mut compiled = Vec::new();
        for field in &descriptor.fields {
            if let Some(filter) = filters.get(&field.name) {
                compiled.extend(self.compile(field, filter)?);
            }
        }
        Ok(compiled)
    }

    /// Compile one field's filter. Inactive (empty operator) filters yield `None`.
    pub fn compile(&self, field: &FieldDescriptor, filter: &FieldFilter) -> Result<Option<CompiledFilter>, AppError> {
        if filter.operator.trim().is_empty() {
            return Ok(None);
        }
        let (join, column) = match field.selector_target() {
            Some(target) => {
                let target = self.registry.new_blank_instance(target)?;
                let alias = format!("sel_{}", field.name);
                let join = Join {
                    table: target.table_name().to_string(),
                    alias: alias.clone(),
                    left: ColumnRef::qualified(alias.clone(), target.primary_key()),
                    right: ColumnRef::new(field.name.clone()),
                };
                (Some(join), ColumnRef::qualified(alias, target.display_column()))
            }
            None => (None, ColumnRef::new(field.name.clone())),
        };

        let predicate = compile_predicate(
            field.kind,
            &filter.operator,
            &filter.value,
            filter.value2.as_deref(),
            column,
        )?;
        match predicate {
            Some(predicate) => {
                tracing::debug!(field = %field.name, operator = %filter.operator, "filter compiled");
                Ok(Some(CompiledFilter { join, predicate }))
            }
            None => {
                self.mode.reject_or_warn(format!(
                    "operator '{}' is not supported for field '{}'",
                    filter.operator, field.name
                ))?;
                Ok(None)
            }
        }
    }
}
