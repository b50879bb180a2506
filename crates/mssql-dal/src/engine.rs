//! The data-access engine.
//!
//! [`SqlEngine`] turns capability calls into T-SQL batches. Each operation
//! takes the engine's connection lock, opens the connection, runs its
//! statement, and closes the connection again whether or not the statement
//! succeeded. Faults are reported to stderr and to `tracing`, then handled
//! according to the configured [`ErrorPolicy`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::backend::{ConnectScope, Connector, ResultSet};
use crate::capability::{AlterDatabase, QueryDatabase};
use crate::config::{Config, EngineConfig, ErrorPolicy};
use crate::connection::ConnectionHandle;
use crate::error::{DalError, Result};
use crate::identifier::Fragment;
use crate::mssql::MssqlConnector;
use crate::snapshot::Snapshot;
use crate::statement;
use crate::sync;
use crate::value::SqlValue;

/// Data-access engine over one server/database pair.
pub struct SqlEngine {
    connector: Arc<dyn Connector>,
    handle: Mutex<ConnectionHandle>,
    settings: EngineConfig,
}

impl SqlEngine {
    /// Create an engine over any backend.
    pub fn new(connector: Arc<dyn Connector>, settings: EngineConfig) -> Self {
        let handle = ConnectionHandle::new(connector.server(), connector.database());
        Self {
            connector,
            handle: Mutex::new(handle),
            settings,
        }
    }

    /// Create an engine for the SQL Server described by `config`.
    pub fn connect(config: &Config) -> Self {
        let connector = MssqlConnector::new(config.connection.clone());
        info!(
            "Using SQL Server {}/{} (error policy: {:?})",
            connector.server(),
            connector.database(),
            config.engine.error_policy
        );
        Self::new(Arc::new(connector), config.engine.clone())
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn server(&self) -> &str {
        self.connector.server()
    }

    pub fn database(&self) -> &str {
        self.connector.database()
    }

    /// Open a connection, run `SELECT 1` and close it.
    ///
    /// Always returns the fault, whatever the error policy.
    pub async fn health_check(&self) -> Result<()> {
        let result = self.query("HealthCheck", "SELECT 1").await?;
        match result.scalar().and_then(SqlValue::as_i64) {
            Some(1) => Ok(()),
            other => Err(DalError::Backend(format!(
                "Health check returned {:?} instead of 1",
                other
            ))),
        }
    }

    /// Run a batch for its row count.
    async fn execute(&self, operation: &'static str, scope: ConnectScope, sql: &str) -> Result<u64> {
        let mut handle = self.handle.lock().await;
        debug!(operation, "{}", sql);

        let result = match handle.open(self.connector.as_ref(), scope).await {
            Ok(session) => session.execute(sql, &[]).await,
            Err(e) => Err(e),
        };
        handle.close().await;
        result
    }

    /// Run a batch for its first result set.
    async fn query(&self, operation: &'static str, sql: &str) -> Result<ResultSet> {
        let mut handle = self.handle.lock().await;
        debug!(operation, "{}", sql);

        let result = match handle.open(self.connector.as_ref(), ConnectScope::Database).await {
            Ok(session) => session.query(sql, &[]).await,
            Err(e) => Err(e),
        };
        handle.close().await;
        result
    }

    /// Shared tail of every operation: report a fault, then swallow or return it.
    fn settle<T>(&self, operation: &'static str, result: Result<T>, fallback: impl FnOnce() -> T) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.report(operation, &e);
                match self.settings.error_policy {
                    ErrorPolicy::Swallow => Ok(fallback()),
                    ErrorPolicy::Propagate => Err(e),
                }
            }
        }
    }

    fn report(&self, operation: &'static str, err: &DalError) {
        if self.settings.echo_faults_to_console {
            eprintln!("{}", err.format_detailed());
        }
        error!(
            operation,
            server = self.server(),
            database = self.database(),
            "{}",
            err
        );
    }

    async fn insert(&self, operation: &'static str, sql: Result<String>) -> Result<i64> {
        let result = match sql {
            Ok(sql) => self.query(operation, &sql).await,
            Err(e) => Err(e),
        };
        // NULL or missing identity means nothing was inserted
        let result = result.map(|rs| rs.scalar().and_then(SqlValue::as_i64).unwrap_or(0));
        self.settle(operation, result, || 0)
    }

    async fn retrieve(&self, query: Option<&str>, table_name: &str, read_only: bool) -> Result<Snapshot> {
        let operation = if read_only {
            "GetDataTable(read-only)"
        } else {
            "GetDataTable"
        };

        let result = async {
            let sql = match query {
                Some(query) => Fragment::trusted(query)?.to_string(),
                None => statement::select_all(Fragment::trusted(table_name)?),
            };
            let rows = self.query(operation, &sql).await?;

            let mut snapshot = Snapshot::from_result_set(table_name, rows);
            if read_only {
                snapshot.mark_read_only();
            } else {
                snapshot.prepare_for_update()?;
            }
            debug!("Loaded {} rows into {}", snapshot.len(), table_name);
            Ok::<_, DalError>(snapshot)
        }
        .await;

        self.settle(operation, result, || Snapshot::new(table_name))
    }
}

impl std::fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEngine")
            .field("server", &self.server())
            .field("database", &self.database())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl AlterDatabase for SqlEngine {
    async fn create_database(&self) -> Result<()> {
        const OP: &str = "CreateDatabase";
        let result = match statement::create_database(self.database()) {
            Ok(sql) => self.execute(OP, ConnectScope::Server, &sql).await,
            Err(e) => Err(e),
        };
        self.settle(OP, result.map(drop), || ())
    }

    async fn create_database_table(&self, table_name: &str, table_structure: &str) -> Result<()> {
        const OP: &str = "CreateDatabaseTable";
        let result = async {
            let sql = statement::create_table(
                Fragment::trusted(table_name)?,
                Fragment::trusted(table_structure)?,
            );
            self.execute(OP, ConnectScope::Database, &sql).await
        }
        .await;
        self.settle(OP, result.map(drop), || ())
    }

    async fn alter_database_table(&self, table_name: &str, table_structure: &str) -> Result<()> {
        const OP: &str = "AlterDatabaseTable";
        let result = async {
            let sql = statement::alter_table(
                Fragment::trusted(table_name)?,
                Fragment::trusted(table_structure)?,
            );
            self.execute(OP, ConnectScope::Database, &sql).await
        }
        .await;
        self.settle(OP, result.map(drop), || ())
    }

    async fn save_database_table(&self, snapshot: &mut Snapshot) -> Result<()> {
        const OP: &str = "SaveDatabaseTable";
        let mut handle = self.handle.lock().await;

        let result = match handle.open(self.connector.as_ref(), ConnectScope::Database).await {
            Ok(session) => sync::apply(session, snapshot).await,
            Err(e) => Err(e),
        };
        handle.close().await;
        drop(handle);

        self.settle(OP, result.map(drop), || ())
    }

    async fn insert_record(&self, table_name: &str, column_names: &str, column_values: &str) -> Result<i64> {
        let sql = Fragment::trusted(table_name).and_then(|table| {
            statement::insert_guarded(
                table,
                Fragment::trusted(column_names)?,
                Fragment::trusted(column_values)?,
            )
        });
        self.insert("InsertRecord", sql).await
    }

    async fn insert_parent_record(
        &self,
        table_name: &str,
        column_names: &str,
        column_values: &str,
    ) -> Result<i64> {
        let sql = Fragment::trusted(table_name).and_then(|table| {
            Ok(statement::insert_parent(
                table,
                Fragment::trusted(column_names)?,
                Fragment::trusted(column_values)?,
            ))
        });
        self.insert("InsertParentRecord", sql).await
    }

    async fn update_record(&self, table_name: &str, assignments: &str, criteria: &str) -> Result<bool> {
        const OP: &str = "UpdateRecord";
        let result = async {
            let sql = statement::update(
                Fragment::trusted(table_name)?,
                Fragment::trusted(assignments)?,
                Fragment::trusted(criteria)?,
            );
            self.execute(OP, ConnectScope::Database, &sql).await
        }
        .await;
        // Success means the statement ran, not that it matched a row
        self.settle(OP, result.map(|_| true), || false)
    }

    async fn delete_record(&self, table_name: &str, pk_name: &str, pk_id: &str) -> Result<()> {
        const OP: &str = "DeleteRecord";
        let result = async {
            let sql = statement::delete(
                Fragment::trusted(table_name)?,
                Fragment::trusted(pk_name)?,
                Fragment::trusted(pk_id)?,
            );
            self.execute(OP, ConnectScope::Database, &sql).await
        }
        .await;
        self.settle(OP, result.map(drop), || ())
    }
}

#[async_trait]
impl QueryDatabase for SqlEngine {
    async fn get_data_table(&self, table_name: &str) -> Result<Snapshot> {
        self.retrieve(None, table_name, false).await
    }

    async fn get_data_table_as(&self, table_name: &str, read_only: bool) -> Result<Snapshot> {
        self.retrieve(None, table_name, read_only).await
    }

    async fn get_data_table_by_query(&self, query: &str, table_name: &str) -> Result<Snapshot> {
        self.retrieve(Some(query), table_name, false).await
    }

    async fn get_data_table_by_query_as(
        &self,
        query: &str,
        table_name: &str,
        read_only: bool,
    ) -> Result<Snapshot> {
        if read_only || self.settings.honor_query_when_mutable {
            return self.retrieve(Some(query), table_name, read_only).await;
        }
        debug!("Ignoring caller query for mutable retrieval of {}", table_name);
        self.retrieve(None, table_name, false).await
    }
}
