//! SQL Server backend over TDS (tiberius).
//!
//! Every [`MssqlConnector::connect`] call opens a fresh TCP connection; the
//! engine closes it again at the end of each operation, so nothing is pooled.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{
    AuthMethod as TiberiusAuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel,
    FromSql, QueryItem, ToSql,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::backend::{ConnectScope, Connector, ResultColumn, ResultSet, Session};
use crate::config::{AuthMethod, ConnectionConfig};
use crate::error::{DalError, Result};
use crate::value::{SqlType, SqlValue};

/// Opens TDS connections to one SQL Server database.
#[derive(Clone)]
pub struct MssqlConnector {
    config: ConnectionConfig,
    server: String,
}

impl MssqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        let server = config.server_address();
        Self { config, server }
    }

    fn build_config(&self, scope: ConnectScope) -> Result<Config> {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        if scope == ConnectScope::Database {
            config.database(&self.config.database);
        }

        match self.config.auth {
            AuthMethod::SqlServer => {
                config.authentication(TiberiusAuthMethod::sql_server(
                    &self.config.user,
                    &self.config.password,
                ));
            }
            #[cfg(any(windows, feature = "kerberos"))]
            AuthMethod::Integrated => {
                config.authentication(TiberiusAuthMethod::Integrated);
            }
            #[cfg(not(any(windows, feature = "kerberos")))]
            AuthMethod::Integrated => {
                return Err(DalError::Config(
                    "integrated authentication requires the `kerberos` feature on this platform"
                        .into(),
                ));
            }
        }

        // Encryption settings
        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        Ok(config)
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self, scope: ConnectScope) -> Result<Box<dyn Session>> {
        let config = self.build_config(scope)?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DalError::connection(e, format!("connecting to {}", self.server)))?;

        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        debug!(server = %self.server, ?scope, "opened connection");
        Ok(Box::new(MssqlSession { client }))
    }

    fn server(&self) -> &str {
        &self.server
    }

    fn database(&self) -> &str {
        &self.config.database
    }
}

struct MssqlSession {
    client: Client<Compat<TcpStream>>,
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let params: Vec<Box<dyn ToSql>> = params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let result = self.client.execute(sql, &param_refs).await?;
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let params: Vec<Box<dyn ToSql>> = params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stream = self.client.query(sql, &param_refs).await?;
        let mut result = ResultSet::default();

        // Only the first result set is materialized; later ones are drained.
        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                    result.columns = meta
                        .columns()
                        .iter()
                        .map(|c| ResultColumn::new(c.name(), column_type_to_sql_type(c.column_type())))
                        .collect();
                }
                QueryItem::Row(row) if row.result_index() == 0 => {
                    let values = row
                        .into_iter()
                        .map(column_data_to_sql_value)
                        .collect::<Result<Vec<_>>>()?;
                    result.rows.push(values);
                }
                _ => {}
            }
        }

        Ok(result)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Map TDS column metadata to a snapshot column type.
fn column_type_to_sql_type(ty: ColumnType) -> SqlType {
    match ty {
        ColumnType::Bit | ColumnType::Bitn => SqlType::Bool,
        ColumnType::Int1 | ColumnType::Int2 => SqlType::I16,
        ColumnType::Int4 => SqlType::I32,
        ColumnType::Int8 | ColumnType::Intn => SqlType::I64,
        ColumnType::Float4 => SqlType::F32,
        ColumnType::Float8 | ColumnType::Floatn => SqlType::F64,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln | ColumnType::Numericn => {
            SqlType::Decimal
        }
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => SqlType::DateTime,
        ColumnType::Daten => SqlType::Date,
        ColumnType::Timen => SqlType::Time,
        ColumnType::DatetimeOffsetn => SqlType::DateTimeOffset,
        ColumnType::Guid => SqlType::Uuid,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => SqlType::Bytes,
        _ => SqlType::String,
    }
}

/// Convert a TDS cell into an owned value.
fn column_data_to_sql_value(data: ColumnData<'static>) -> Result<SqlValue> {
    if let Some(value) = temporal_or_numeric(&data)? {
        return Ok(value);
    }

    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::I16(i16::from(v))),
        ColumnData::I16(v) => v.map(SqlValue::I16),
        ColumnData::I32(v) => v.map(SqlValue::I32),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(SqlValue::F32),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.map(|s| SqlValue::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.map(|b| SqlValue::Bytes(b.into_owned())),
        ColumnData::Xml(v) => v.map(|x| SqlValue::String(x.into_owned().into_string())),
        _ => None,
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

// Types decoded through tiberius' chrono / rust_decimal conversions.
fn temporal_or_numeric(data: &ColumnData<'static>) -> Result<Option<SqlValue>> {
    let value = match data {
        ColumnData::Numeric(_) => Decimal::from_sql(data)?.map_or(SqlValue::Null, SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map_or(SqlValue::Null, SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map_or(SqlValue::Null, SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map_or(SqlValue::Null, SqlValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
            .map_or(SqlValue::Null, SqlValue::DateTimeOffset),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Convert SqlValue to a boxed ToSql trait object for parameterized queries.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        // Dates bind as midnight datetimes
        SqlValue::Date(d) => Box::new(d.and_time(NaiveTime::MIN)),
        SqlValue::Time(t) => Box::new(*t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn config() -> ConnectionConfig {
        ConnectionConfig::from_ado_string("Server=localhost,1433;Database=Shop;User Id=sa;Password=x")
            .unwrap()
    }

    #[test]
    fn test_connector_identity() {
        let connector = MssqlConnector::new(config());
        assert_eq!(connector.server(), "localhost,1433");
        assert_eq!(connector.database(), "Shop");
    }

    #[test]
    fn test_build_config_address() {
        let connector = MssqlConnector::new(config());
        let cfg = connector.build_config(ConnectScope::Server).unwrap();
        assert_eq!(cfg.get_addr(), "localhost:1433");
    }

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(column_type_to_sql_type(ColumnType::Int4), SqlType::I32);
        assert_eq!(column_type_to_sql_type(ColumnType::Intn), SqlType::I64);
        assert_eq!(column_type_to_sql_type(ColumnType::Numericn), SqlType::Decimal);
        assert_eq!(column_type_to_sql_type(ColumnType::NVarchar), SqlType::String);
        assert_eq!(column_type_to_sql_type(ColumnType::Daten), SqlType::Date);
    }

    #[test]
    fn test_column_data_conversion() {
        assert_eq!(
            column_data_to_sql_value(ColumnData::I32(Some(5))).unwrap(),
            SqlValue::I32(5)
        );
        assert_eq!(
            column_data_to_sql_value(ColumnData::U8(Some(7))).unwrap(),
            SqlValue::I16(7)
        );
        assert_eq!(
            column_data_to_sql_value(ColumnData::String(Some(Cow::Borrowed("Ann")))).unwrap(),
            SqlValue::from("Ann")
        );
        assert_eq!(
            column_data_to_sql_value(ColumnData::I64(None)).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            column_data_to_sql_value(ColumnData::Numeric(None)).unwrap(),
            SqlValue::Null
        );
    }
}
