//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backing store connection.
    pub connection: ConnectionConfig,

    /// Engine behavior.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host.
    pub host: String,

    /// Server port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username (SQL Server authentication).
    #[serde(default)]
    pub user: String,

    /// Password (SQL Server authentication).
    #[serde(default)]
    pub password: String,

    /// Authentication method (default: sql_server).
    #[serde(default)]
    pub auth: AuthMethod,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("auth", &self.auth)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// SQL Server login with user and password.
    #[default]
    SqlServer,

    /// Integrated (Windows / Kerberos) authentication.
    Integrated,
}

/// What happens to a backing-store fault once it has been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the fault and return the operation's fallback value.
    #[default]
    Swallow,

    /// Log the fault and return it to the caller.
    Propagate,
}

/// Engine behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fault handling (default: swallow).
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Use the caller's query when a query retrieval asks for a mutable
    /// snapshot. When false the query is ignored and the whole table is
    /// selected (default: false).
    #[serde(default)]
    pub honor_query_when_mutable: bool,

    /// Write faults to stderr in addition to the tracing log (default: true).
    #[serde(default = "default_true")]
    pub echo_faults_to_console: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            honor_query_when_mutable: false,
            echo_faults_to_console: true,
        }
    }
}

impl EngineConfig {
    /// Same settings with a different error policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}
