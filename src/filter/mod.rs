//! Filter compilation: request filter triples to store predicates.

pub mod compiler;
pub mod operator;
pub mod predicate;

pub use compiler::{compile_predicate, CompiledFilter, FilterCompiler};
pub use operator::{Comparator, FilterOperator};
pub use predicate::{compare_values, ColumnRef, Predicate, RowLookup};

use crate::error::{AppError, ConfigError};
use std::str::FromStr;

/// One per-field filter from a list request (`<field>-operator`, `-value`, `-value2`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldFilter {
    pub operator: String,
    pub value: String,
    pub value2: Option<String>,
}

impl FieldFilter {
    pub fn new(operator: impl Into<String>, value: impl Into<String>) -> Self {
        FieldFilter {
            operator: operator.into(),
            value: value.into(),
            value2: None,
        }
    }

    pub fn between(low: impl Into<String>, high: impl Into<String>) -> Self {
        FieldFilter {
            operator: "between".into(),
            value: low.into(),
            value2: Some(high.into()),
        }
    }
}

/// How unknown or inapplicable operators and sort keys are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Ignore them (logged at warn).
    #[default]
    Lenient,
    /// Reject them with a validation error.
    Strict,
}

impl FilterMode {
    /// Reject `message` in strict mode; log and carry on otherwise.
    pub fn reject_or_warn(&self, message: String) -> Result<(), AppError> {
        match self {
            FilterMode::Strict => Err(AppError::Validation(message)),
            FilterMode::Lenient => {
                tracing::warn!("{}, ignored", message);
                Ok(())
            }
        }
    }
}

impl FromStr for FilterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(FilterMode::Lenient),
            "strict" => Ok(FilterMode::Strict),
            _ => Err(ConfigError::InvalidValue {
                key: "filter mode".into(),
                value: s.to_string(),
            }),
        }
    }
}
