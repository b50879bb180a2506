//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{DalError, Result};
use std::path::Path;

/// Environment variable holding an ADO.NET style connection string.
pub const CONNECTION_STRING_ENV: &str = "ConnectionString";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a connection string with default engine settings.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let config = Config {
            connection: ConnectionConfig::from_ado_string(connection_string)?,
            engine: EngineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from the `ConnectionString` environment variable.
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(CONNECTION_STRING_ENV).map_err(|_| {
            DalError::Config(format!("{} environment variable is not set", CONNECTION_STRING_ENV))
        })?;
        Self::from_connection_string(&value)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionConfig {
    /// Parse an ADO.NET connection string.
    ///
    /// Recognized keys (case-insensitive): `Server`/`Data Source`/`Address`
    /// (optional `tcp:` prefix and `,port` suffix), `Database`/`Initial Catalog`,
    /// `User Id`/`UID`/`User`, `Password`/`PWD`, `Integrated Security`/
    /// `Trusted_Connection`, `Encrypt`, `TrustServerCertificate`. Unknown keys
    /// are ignored.
    pub fn from_ado_string(connection_string: &str) -> Result<Self> {
        let mut config = ConnectionConfig {
            host: String::new(),
            port: 1433,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            auth: AuthMethod::SqlServer,
            encrypt: true,
            trust_server_cert: false,
        };

        for pair in connection_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DalError::Config(format!("Malformed connection string entry: {:?}", pair))
            })?;
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "server" | "data source" | "address" | "addr" => {
                    let server = value.strip_prefix("tcp:").unwrap_or(value);
                    match server.split_once(',') {
                        Some((host, port)) => {
                            config.host = host.trim().to_string();
                            config.port = port.trim().parse().map_err(|_| {
                                DalError::Config(format!("Invalid port in connection string: {:?}", port))
                            })?;
                        }
                        None => config.host = server.to_string(),
                    }
                }
                "database" | "initial catalog" => config.database = value.to_string(),
                "user id" | "uid" | "user" => config.user = value.to_string(),
                "password" | "pwd" => config.password = value.to_string(),
                "integrated security" | "trusted_connection" => {
                    if parse_flag(value)? {
                        config.auth = AuthMethod::Integrated;
                    }
                }
                "encrypt" => config.encrypt = parse_flag(value)?,
                "trustservercertificate" | "trust server certificate" => {
                    config.trust_server_cert = parse_flag(value)?
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// `host,port` as shown in logs.
    pub fn server_address(&self) -> String {
        format!("{},{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "sspi" | "mandatory" | "strict" => Ok(true),
        "false" | "no" | "0" | "optional" => Ok(false),
        other => Err(DalError::Config(format!(
            "Invalid boolean in connection string: {:?}",
            other
        ))),
    }
}
