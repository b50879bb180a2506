//! Capability contracts implemented by [`crate::SqlEngine`].
//!
//! Every string argument except the snapshot is caller-trusted T-SQL text and
//! is spliced into the statement as written.

use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Schema creation and row writes.
#[async_trait]
pub trait AlterDatabase: Send + Sync {
    /// Create the configured database unless the server already has it.
    async fn create_database(&self) -> Result<()>;

    /// Create `table_name` with `table_structure` as its column definitions,
    /// unless a user table of that name exists.
    async fn create_database_table(&self, table_name: &str, table_structure: &str) -> Result<()>;

    /// Run `ALTER TABLE table_name table_structure` without an existence check.
    async fn alter_database_table(&self, table_name: &str, table_structure: &str) -> Result<()>;

    /// Write the pending row changes of `snapshot` to its backing table and
    /// commit them in memory.
    async fn save_database_table(&self, snapshot: &mut Snapshot) -> Result<()>;

    /// Insert a row unless its key (the first name/value pair) already exists.
    ///
    /// Returns the generated identity, or 0 when nothing was inserted or the
    /// identity is NULL.
    async fn insert_record(&self, table_name: &str, column_names: &str, column_values: &str) -> Result<i64>;

    /// Insert a row unconditionally and return its generated identity (0 when NULL).
    async fn insert_parent_record(
        &self,
        table_name: &str,
        column_names: &str,
        column_values: &str,
    ) -> Result<i64>;

    /// `UPDATE table_name SET assignments WHERE criteria`.
    ///
    /// `true` means the statement ran without fault, whatever it matched.
    async fn update_record(&self, table_name: &str, assignments: &str, criteria: &str) -> Result<bool>;

    /// Delete the rows whose `pk_name` equals `pk_id`.
    async fn delete_record(&self, table_name: &str, pk_name: &str, pk_id: &str) -> Result<()>;
}

/// Table retrieval.
#[async_trait]
pub trait QueryDatabase: Send + Sync {
    /// Mutable snapshot of the whole table.
    async fn get_data_table(&self, table_name: &str) -> Result<Snapshot>;

    /// Whole table, read-only or mutable.
    async fn get_data_table_as(&self, table_name: &str, read_only: bool) -> Result<Snapshot>;

    /// Mutable snapshot of a caller query.
    async fn get_data_table_by_query(&self, query: &str, table_name: &str) -> Result<Snapshot>;

    /// Caller query, read-only or mutable. With `read_only == false` the query
    /// is ignored and the whole table is selected, unless the engine is
    /// configured to honor it.
    async fn get_data_table_by_query_as(
        &self,
        query: &str,
        table_name: &str,
        read_only: bool,
    ) -> Result<Snapshot>;
}
