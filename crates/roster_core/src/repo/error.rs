//! Repository error taxonomy.
//!
//! # Invariants
//! - SQLite failures are classified once, in `From<rusqlite::Error>`; call
//!   sites only use `?`.
//! - Nothing here retries; every error reaches the caller unchanged.

use crate::db::DbError;
use crate::model::member::{DetachedAccess, MemberId, MemberKey};
use crate::model::team::TeamKey;
use crate::model::validation::ValidationError;
use crate::query::QueryCompositionError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by repository, session, and paging operations.
#[derive(Debug)]
pub enum RepoError {
    /// A lookup that requires exactly one row found none.
    NotFound { entity: &'static str, key: String },
    /// A single-row lookup matched more than one row.
    NonUniqueResult {
        entity: &'static str,
        key: String,
        count: usize,
    },
    /// The query spec has an unsupported shape.
    QueryComposition(QueryCompositionError),
    /// A lazy association was read outside its originating session.
    DetachedAccess(DetachedAccess),
    /// The store did not grant a lock within the busy timeout.
    LockTimeout(rusqlite::Error),
    /// The store rejected a write (foreign key, check, unique).
    ConstraintViolation(rusqlite::Error),
    /// Save attempted on an instance loaded as a read-only snapshot.
    ReadOnlySnapshot(MemberKey),
    /// Save attempted on an instance loaded before a bulk update in the
    /// same session; refresh it first.
    StaleEntity(MemberKey),
    /// The stored version moved since the instance was read.
    OptimisticLockConflict { id: MemberId, expected_version: i64 },
    /// The member points at a team that was never saved.
    TransientReference { team: TeamKey },
    Validation(ValidationError),
    /// Connection schema lacks a table the repository needs.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted into the model.
    InvalidData(String),
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::NonUniqueResult { entity, key, count } => write!(
                f,
                "expected one {entity} for {key}, found {count}"
            ),
            Self::QueryComposition(err) => write!(f, "{err}"),
            Self::DetachedAccess(err) => write!(f, "{err}"),
            Self::LockTimeout(err) => write!(f, "lock not granted before timeout: {err}"),
            Self::ConstraintViolation(err) => write!(f, "constraint violation: {err}"),
            Self::ReadOnlySnapshot(key) => {
                write!(f, "member {key} was loaded read-only and cannot be saved")
            }
            Self::StaleEntity(key) => write!(
                f,
                "member {key} was loaded before a bulk update; refresh it before saving"
            ),
            Self::OptimisticLockConflict {
                id,
                expected_version,
            } => write!(
                f,
                "member {id} changed since version {expected_version} was read"
            ),
            Self::TransientReference { team } => {
                write!(f, "member references unsaved team {team}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::QueryComposition(err) => Some(err),
            Self::DetachedAccess(err) => Some(err),
            Self::LockTimeout(err) => Some(err),
            Self::ConstraintViolation(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. }
            | Self::NonUniqueResult { .. }
            | Self::ReadOnlySnapshot(_)
            | Self::StaleEntity(_)
            | Self::OptimisticLockConflict { .. }
            | Self::TransientReference { .. }
            | Self::MissingRequiredTable(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::LockTimeout(value)
            }
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value),
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<QueryCompositionError> for RepoError {
    fn from(value: QueryCompositionError) -> Self {
        Self::QueryComposition(value)
    }
}

impl From<DetachedAccess> for RepoError {
    fn from(value: DetachedAccess) -> Self {
        Self::DetachedAccess(value)
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
