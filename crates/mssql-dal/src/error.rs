//! Error types for the data-access engine.

use thiserror::Error;

/// Exit code for configuration errors (bad YAML, missing fields).
pub const EXIT_CONFIG_ERROR: u8 = 1;

/// Exit code for faults raised by the backing store.
pub const EXIT_DATABASE_ERROR: u8 = 2;

/// Exit code for every other fault.
pub const EXIT_OTHER_ERROR: u8 = 3;

/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for data-access operations.
#[derive(Error, Debug)]
pub enum DalError {
    /// Configuration error (invalid YAML, missing fields, bad connection string)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backing-store execution fault reported by the TDS client
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection could not be opened, with context about where
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Fault raised by a non-TDS backend implementation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid operation on an in-memory table snapshot
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Table has no primary key (required to update or delete snapshot rows)
    #[error("Table {0} has no primary key - updating or deleting rows requires key columns")]
    NoPrimaryKey(String),

    /// Table does not exist in the catalog
    #[error("Table {0} was not found in the database catalog")]
    TableNotFound(String),

    /// A generated UPDATE or DELETE matched no row
    #[error("Concurrency violation on {table}: the {command} affected {affected} of the expected 1 records")]
    Concurrency {
        table: String,
        command: &'static str,
        affected: u64,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DalError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        DalError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Snapshot error
    pub fn snapshot(message: impl Into<String>) -> Self {
        DalError::Snapshot(message.into())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            DalError::Config(_) | DalError::Yaml(_) => EXIT_CONFIG_ERROR,
            DalError::Io(_) => EXIT_IO_ERROR,
            DalError::Database(_)
            | DalError::Connection { .. }
            | DalError::Backend(_)
            | DalError::TableNotFound(_)
            | DalError::Concurrency { .. } => EXIT_DATABASE_ERROR,
            _ => EXIT_OTHER_ERROR,
        }
    }
}

/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, DalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        let err = DalError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: config.yaml"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DalError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            DalError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")).exit_code(),
            EXIT_IO_ERROR
        );
        assert_eq!(DalError::TableNotFound("t".into()).exit_code(), EXIT_DATABASE_ERROR);
        assert_eq!(DalError::snapshot("bad").exit_code(), EXIT_OTHER_ERROR);
    }

    #[test]
    fn test_concurrency_message() {
        let err = DalError::Concurrency {
            table: "Orders".into(),
            command: "UpdateCommand",
            affected: 0,
        };
        assert_eq!(
            err.to_string(),
            "Concurrency violation on Orders: the UpdateCommand affected 0 of the expected 1 records"
        );
    }
}
