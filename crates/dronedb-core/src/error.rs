//! Error taxonomy for DroneDB.
//!
//! One variant per exception class in the original `exceptions.h` hierarchy
//! (`AppException` -> `DBException` -> `SQLException`, etc.). The C++ side
//! modeled these as a class hierarchy caught by base-class reference; here
//! each becomes a flat enum variant, matched explicitly where the orchestrator
//! needs to distinguish `BuildDepMissing` from everything else.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DdbError {
    /// Umbrella variant for messages that don't fit a more specific case.
    #[error("{0}")]
    App(String),

    #[error("database error: {0}")]
    Db(String),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite_error::SqlError),

    #[error("filesystem error at {path}: {reason}")]
    Fs { path: PathBuf, reason: String },

    #[error("zip error: {0}")]
    Zip(String),

    #[error("timezone error: {0}")]
    Timezone(String),

    #[error("index invariant violated: {0}")]
    Index(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("GDAL error: {0}")]
    Gdal(String),

    #[error("PDAL error: {0}")]
    Pdal(String),

    #[error("Untwine error: {0}")]
    Untwine(String),

    #[error("network error: {0}")]
    Net(String),

    #[error("URL error: {0}")]
    Url(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("registry not found: {0}")]
    RegistryNotFound(String),

    #[error("no sync stamp recorded for this index")]
    NoStamp,

    #[error("a pull is required before this operation can proceed")]
    PullRequired,

    /// Raised applying a delta's removes: the local file was modified since
    /// the last sync stamp, so deleting it would lose local work.
    #[error("local copy of {0} was modified since the last sync and the remote wants it deleted")]
    RemoteDeleteLocalModified(String),

    /// Raised applying a delta's adds: a local file exists at the target
    /// path but its hash doesn't match the expected pre-state.
    #[error("both the local and remote copies of {0} were modified")]
    BothModified(String),

    /// Carries the list of missing dependency paths so the build
    /// orchestrator can persist them into a `.pending` file verbatim.
    #[error("build dependency missing: {deps:?}")]
    BuildDepMissing { deps: Vec<String> },

    #[error("build already in progress at {0}")]
    BuildInProgress(PathBuf),

    #[error("insufficient permissions to acquire lock at {0}")]
    LockPermission(PathBuf),

    #[error("disk full while acquiring lock at {0}")]
    LockDiskFull(PathBuf),

    #[error("lock directory missing: {0}")]
    LockDirectoryMissing(PathBuf),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DdbError {
    pub fn app(msg: impl Into<String>) -> Self {
        DdbError::App(msg.into())
    }

    pub fn fs(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DdbError::Fs { path: path.into(), reason: reason.into() }
    }

    pub fn invalid_args(msg: impl Into<String>) -> Self {
        DdbError::InvalidArgs(msg.into())
    }

    /// True for the one error kind the build orchestrator treats specially.
    pub fn missing_deps(&self) -> Option<&[String]> {
        match self {
            DdbError::BuildDepMissing { deps } => Some(deps),
            _ => None,
        }
    }
}

/// A tiny local module so `DdbError::Sql` can wrap an opaque driver error
/// without this crate depending on `rusqlite` directly (that dependency
/// lives in `dronedb-store`, which is the only crate that should know the
/// driver is SQLite).
pub mod rusqlite_error {
    use std::fmt;

    #[derive(Debug)]
    pub struct SqlError(pub String);

    impl fmt::Display for SqlError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for SqlError {}

    impl From<String> for SqlError {
        fn from(s: String) -> Self {
            SqlError(s)
        }
    }
}

pub type Result<T> = std::result::Result<T, DdbError>;
