//! Backing-store seam.
//!
//! The engine talks to the relational store only through [`Connector`] and
//! [`Session`]. The TDS implementation lives in [`crate::mssql`]; tests plug in
//! scripted implementations.
//!
//! # Design Pattern
//!
//! Strategy: the engine holds an `Arc<dyn Connector>` without knowing the
//! concrete store, and each operation works against one short-lived session.

use async_trait::async_trait;

use crate::error::Result;
use crate::value::{SqlType, SqlValue};

/// Which catalog a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScope {
    /// The configured database.
    Database,
    /// The same server with no database selected (used to create it).
    Server,
}

/// Opens sessions against one server/database pair.
///
/// Implementations must be `Send + Sync` so an engine can be shared across
/// async tasks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session.
    async fn connect(&self, scope: ConnectScope) -> Result<Box<dyn Session>>;

    /// Server address, as shown in logs.
    fn server(&self) -> &str;

    /// Database name used for [`ConnectScope::Database`].
    fn database(&self) -> &str;
}

/// An open connection.
#[async_trait]
pub trait Session: Send {
    /// Run a batch and return the total number of rows affected.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a batch and return its first result set.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: SqlType,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, data_type: SqlType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A materialized result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    /// Columns in select-list order.
    pub columns: Vec<ResultColumn>,

    /// Rows, each with one value per column.
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// First column of the first row; `None` when there is no row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let empty = ResultSet::default();
        assert!(empty.scalar().is_none());

        let rs = ResultSet {
            columns: vec![ResultColumn::new("", SqlType::Decimal)],
            rows: vec![vec![SqlValue::Null]],
        };
        assert_eq!(rs.scalar(), Some(&SqlValue::Null));
    }
}
