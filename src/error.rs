//! Error types for the schema registry

use std::fmt;

use thiserror::Error;

use crate::compatibility::CompatibilityReport;
use crate::contract::ContractTestResults;
use crate::version::{ChangeType, VersionStatus};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Result type for persistence adapter calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Malformed SDL or query text, with the position of the offending token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Schema registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Parse error at {0}")]
    Parse(#[from] ParseError),

    #[error("Schema validation failed: {0}")]
    Validation(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cannot {operation} version {version} while it is {status}")]
    State {
        version: String,
        status: VersionStatus,
        operation: &'static str,
    },

    #[error("Version {version} rejected: inferred {} change exceeds declared {declared} change", report.inferred_change_type)]
    Compatibility {
        version: String,
        declared: ChangeType,
        report: Box<CompatibilityReport>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Contract tests failed for {version}: {} of {} failed", results.failed, results.total)]
    ContractTests {
        version: String,
        results: Box<ContractTestResults>,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(&'static str),

    #[error("Store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Coarse error classification for transport-level status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Validation,
    Conflict,
    State,
    Compatibility,
    NotFound,
    ContractTests,
    Cancelled,
    Store,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Parse(_) => ErrorKind::Parse,
            RegistryError::Validation(_) | RegistryError::InvalidVersion(_) => ErrorKind::Validation,
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::State { .. } => ErrorKind::State,
            RegistryError::Compatibility { .. } => ErrorKind::Compatibility,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::ContractTests { .. } => ErrorKind::ContractTests,
            RegistryError::Cancelled(_) => ErrorKind::Cancelled,
            RegistryError::Store { .. } => ErrorKind::Store,
        }
    }

    /// The compatibility report attached to a rejection, if any
    pub fn report(&self) -> Option<&CompatibilityReport> {
        match self {
            RegistryError::Compatibility { report, .. } => Some(&**report),
            _ => None,
        }
    }

    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| RegistryError::Store { operation, source }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::State => "state",
            ErrorKind::Compatibility => "compatibility",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ContractTests => "contract_tests",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Store => "store",
        };
        f.write_str(name)
    }
}

/// Persistence adapter errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version {0} already stored")]
    DuplicateVersion(String),

    #[error("Checksum {0} already stored")]
    DuplicateChecksum(String),

    #[error("No stored row for version {0}")]
    MissingRow(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RegistryError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(RegistryError::InvalidVersion("x".into()).kind(), ErrorKind::Validation);
        let err = RegistryError::store("insert")(StoreError::MissingRow("1.0.0".into()));
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(err.to_string().contains("insert"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = RegistryError::from(ParseError::new(3, 7, "expected ':'"));
        assert_eq!(err.to_string(), "Parse error at 3:7: expected ':'");
    }
}
