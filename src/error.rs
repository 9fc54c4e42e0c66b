//! Typed errors and their stable codes.

use serde::Serialize;
use thiserror::Error;

/// Prefix that marks a hook failure as a conflict rather than a validation failure.
pub const CONFLICT_PREFIX: &str = "conflict:";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("missing setting: {0}")]
    Missing(String),
}

/// Failures raised by a [`crate::store::RecordStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("database: {0}")]
    Db(sqlx::Error),
    #[error("store: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::UniqueViolation(db.message().to_string());
            }
        }
        StoreError::Db(e)
    }
}

/// Failure reported by a record's `pre_update` hook.
///
/// A message starting with [`CONFLICT_PREFIX`] is surfaced as [`AppError::Conflict`],
/// anything else as [`AppError::Validation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn invalid(message: impl Into<String>) -> Self {
        HookError(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        HookError(format!("{} {}", CONFLICT_PREFIX, message.into()))
    }

    pub fn is_conflict(&self) -> bool {
        self.0.starts_with(CONFLICT_PREFIX)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unknown record type: {0}")]
    UnknownType(String),
    #[error("operation not allowed: {0}")]
    NotAllowed(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(msg) => AppError::Conflict(msg),
            other => AppError::Store(other),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::from(StoreError::from(e))
    }
}

impl From<HookError> for AppError {
    fn from(e: HookError) -> Self {
        match e.0.strip_prefix(CONFLICT_PREFIX) {
            Some(rest) => AppError::Conflict(rest.trim().to_string()),
            None => AppError::Validation(e.0),
        }
    }
}

impl AppError {
    /// Stable machine-readable code, for whatever transport maps these errors.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::UnknownType(_) => "unknown_type",
            AppError::NotAllowed(_) => "not_allowed",
            AppError::Store(_) => "store_failure",
            AppError::Config(_) => "config_error",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details: None,
            },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Debug)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
