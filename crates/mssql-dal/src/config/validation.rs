//! Configuration validation.

use super::{AuthMethod, Config};
use crate::error::{DalError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;

    if conn.host.is_empty() {
        return Err(DalError::Config("connection.host is required".into()));
    }
    if conn.database.is_empty() {
        return Err(DalError::Config("connection.database is required".into()));
    }
    if conn.port == 0 {
        return Err(DalError::Config("connection.port must be non-zero".into()));
    }
    if conn.auth == AuthMethod::SqlServer && conn.user.is_empty() {
        return Err(DalError::Config(
            "connection.user is required for sql_server authentication".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, EngineConfig};

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "Shop".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                auth: AuthMethod::SqlServer,
                encrypt: false,
                trust_server_cert: true,
            },
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_database() {
        let mut config = valid_config();
        config.connection.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_port() {
        let mut config = valid_config();
        config.connection.port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_integrated_auth_needs_no_user() {
        let mut config = valid_config();
        config.connection.user = "".to_string();
        assert!(validate(&config).is_err());

        config.connection.auth = AuthMethod::Integrated;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let mut config = valid_config();
        config.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.connection);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
