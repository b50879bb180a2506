//! # mssql-dal
//!
//! Generic data-access layer for Microsoft SQL Server.
//!
//! The engine is driven by caller-supplied table names, column lists and
//! value strings instead of typed models:
//!
//! - **Schema creation**: conditional database and table creates, raw alters
//! - **Row writes**: key-guarded inserts returning identities, raw updates and deletes
//! - **Retrieval**: mutable snapshots with key metadata, or read-only snapshots
//! - **Write-back**: pending snapshot changes reconciled into the backing table
//!
//! Caller text is spliced into statements verbatim (see [`identifier`]).
//! Faults are logged and, by default, swallowed into each operation's
//! fallback value; [`ErrorPolicy::Propagate`] returns them instead.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_dal::{AlterDatabase, Config, QueryDatabase, SqlEngine, SqlValue};
//!
//! #[tokio::main]
//! async fn main() -> mssql_dal::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = SqlEngine::connect(&config);
//!
//!     engine
//!         .create_database_table("Customers", "Id INT IDENTITY(1,1) PRIMARY KEY, Name NVARCHAR(50)")
//!         .await?;
//!
//!     let mut customers = engine.get_data_table("Customers").await?;
//!     customers.add_row(vec![SqlValue::Null, "Ann".into()])?;
//!     engine.save_database_table(&mut customers).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod capability;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod identifier;
pub mod mssql;
pub mod snapshot;
pub mod statement;
pub mod sync;
pub mod value;

// Re-exports for convenient access
pub use backend::{ConnectScope, Connector, ResultColumn, ResultSet, Session};
pub use capability::{AlterDatabase, QueryDatabase};
pub use config::{AuthMethod, Config, ConnectionConfig, EngineConfig, ErrorPolicy};
pub use connection::{ConnectionHandle, ConnectionState};
pub use engine::SqlEngine;
pub use error::{DalError, Result};
pub use identifier::Fragment;
pub use mssql::MssqlConnector;
pub use snapshot::{DataColumn, DataRow, RowState, Snapshot};
pub use value::{SqlType, SqlValue};
