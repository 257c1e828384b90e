//! Error taxonomy of the data layer and translation of engine-native errors.
//!
//! Nothing engine-specific crosses the adapter boundary: sqlx and `SeaORM`
//! failures are mapped here into [`DataError`].

use std::borrow::Cow;
use std::fmt;

use sea_orm::sqlx;
use sea_orm::{ConnAcquireErr, DbErr, RuntimeErr};

use crate::metadata::EntityDescriptor;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DataError>;

/// Which kind of integrity rule was broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        })
    }
}

/// Malformed input that never reaches the database.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Query(#[from] tenancy_query::Error),

    #[error("invalid value for '{field}': {message}")]
    Field { field: String, message: String },

    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Errors surfaced by repositories and CRUD services.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The row is absent or outside the caller's scope; the two are never
    /// distinguished.
    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("{kind} constraint '{constraint}' violated")]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint: String,
    },

    #[error("no tenant in request context")]
    MissingTenantContext,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Engine failure with no dedicated category.
    #[error("database error: {0}")]
    Database(String),
}

impl From<tenancy_query::Error> for DataError {
    fn from(e: tenancy_query::Error) -> Self {
        DataError::Validation(ValidationError::Query(e))
    }
}

impl From<tenancy_security::ContextError> for DataError {
    fn from(_: tenancy_security::ContextError) -> Self {
        DataError::MissingTenantContext
    }
}

impl DataError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        DataError::NotFound {
            entity: entity.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DataError::Configuration(msg.into())
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Validation(ValidationError::Field {
            field: field.into(),
            message: message.into(),
        })
    }

    pub fn payload(message: impl Into<String>) -> Self {
        DataError::Validation(ValidationError::Payload(message.into()))
    }

    /// HTTP-equivalent status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            DataError::Validation(_) => 400,
            DataError::NotFound { .. } => 404,
            DataError::ConstraintViolation { .. } => 409,
            DataError::ResourceExhausted(_) => 503,
            DataError::MissingTenantContext
            | DataError::Configuration(_)
            | DataError::Database(_) => 500,
        }
    }

    /// Only pool exhaustion and engine timeouts are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::ResourceExhausted(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound { .. })
    }
}

// SQLite primary result codes (low byte of extended codes).
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Translate a sqlx error raised while working on `entity`.
pub(crate) fn from_sqlx(err: sqlx::Error, entity: Option<&EntityDescriptor>) -> DataError {
    match err {
        sqlx::Error::PoolTimedOut => {
            DataError::ResourceExhausted("timed out acquiring a pooled connection".to_owned())
        }
        sqlx::Error::PoolClosed => DataError::ResourceExhausted("connection pool closed".to_owned()),
        sqlx::Error::Database(db) => {
            let kind = match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                sqlx::error::ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                _ => None,
            };
            if let Some(kind) = kind {
                let constraint = db.constraint().map_or_else(
                    || constraint_from_message(kind, db.message(), entity),
                    ToOwned::to_owned,
                );
                return DataError::ConstraintViolation { kind, constraint };
            }
            if is_busy(db.code()) {
                return DataError::ResourceExhausted(db.message().to_owned());
            }
            DataError::Database(db.message().to_owned())
        }
        other => DataError::Database(other.to_string()),
    }
}

/// Translate a `SeaORM` error raised while working on `entity`.
pub(crate) fn from_sea(err: DbErr, entity: Option<&EntityDescriptor>) -> DataError {
    match err {
        DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) => {
            DataError::ResourceExhausted("timed out acquiring a pooled connection".to_owned())
        }
        DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed) => {
            DataError::ResourceExhausted("connection pool closed".to_owned())
        }
        DbErr::Conn(RuntimeErr::SqlxError(e))
        | DbErr::Exec(RuntimeErr::SqlxError(e))
        | DbErr::Query(RuntimeErr::SqlxError(e)) => from_sqlx(e, entity),
        other => DataError::Database(other.to_string()),
    }
}

fn is_busy(code: Option<Cow<'_, str>>) -> bool {
    code.and_then(|c| c.parse::<i64>().ok())
        .is_some_and(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// SQLite reports `UNIQUE constraint failed: employee.email, employee.tenant_id`
/// without an index name; map the column list back to a declared index when one
/// matches.
fn constraint_from_message(
    kind: ConstraintKind,
    message: &str,
    entity: Option<&EntityDescriptor>,
) -> String {
    let detail = message
        .split_once("failed:")
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty());

    match (kind, detail, entity) {
        (ConstraintKind::Unique | ConstraintKind::NotNull, Some(detail), Some(desc)) => {
            let columns: Vec<&str> = detail
                .split(',')
                .map(|part| part.trim().rsplit('.').next().unwrap_or(part).trim())
                .collect();
            if kind == ConstraintKind::Unique {
                if columns == [desc.primary_key()] {
                    return format!("pk_{}", desc.table());
                }
                if let Some(index) = desc
                    .indexes()
                    .iter()
                    .find(|ix| ix.unique && ix.columns.iter().map(String::as_str).eq(columns.iter().copied()))
                {
                    return index.name.clone();
                }
            }
            detail.to_owned()
        }
        (ConstraintKind::ForeignKey, _, Some(desc)) => {
            let mut fks = desc.foreign_keys();
            match (fks.next(), fks.next()) {
                (Some(only), None) => only.name,
                _ => format!("{}_foreign_key", desc.table()),
            }
        }
        (_, Some(detail), None) => detail.to_owned(),
        _ => kind.to_string(),
    }
}
