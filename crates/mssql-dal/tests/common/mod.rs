//! Scripted in-memory backend for engine tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mssql_dal::{
    ConnectScope, Connector, DalError, EngineConfig, ErrorPolicy, ResultColumn, ResultSet,
    Result, Session, SqlEngine, SqlType, SqlValue,
};
use rust_decimal::Decimal;

/// Scripted answer to the next statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(ResultSet),
    Affected(u64),
    Fail(&'static str),
}

/// A statement as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub scope: ConnectScope,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    statements: Vec<Recorded>,
    opened: usize,
    closed: usize,
    refuse_connections: bool,
}

/// Connector whose sessions answer from a shared script.
///
/// Unscripted statements succeed: `execute` reports one affected row and
/// `query` returns an empty result set.
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.script.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn refuse_connections(&self) {
        self.script.lock().unwrap().refuse_connections = true;
    }

    pub fn statements(&self) -> Vec<Recorded> {
        self.script.lock().unwrap().statements.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|r| r.sql).collect()
    }

    pub fn opened(&self) -> usize {
        self.script.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.script.lock().unwrap().closed
    }

    pub fn engine(&self, policy: ErrorPolicy) -> SqlEngine {
        let settings = EngineConfig {
            echo_faults_to_console: false,
            ..EngineConfig::default()
        }
        .with_error_policy(policy);
        SqlEngine::new(Arc::new(self.clone()), settings)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, scope: ConnectScope) -> Result<Box<dyn Session>> {
        let mut script = self.script.lock().unwrap();
        if script.refuse_connections {
            return Err(DalError::connection("connection refused", "connecting to fake,1433"));
        }
        script.opened += 1;
        Ok(Box::new(FakeSession {
            scope,
            script: Arc::clone(&self.script),
        }))
    }

    fn server(&self) -> &str {
        "fake,1433"
    }

    fn database(&self) -> &str {
        "Shop"
    }
}

struct FakeSession {
    scope: ConnectScope,
    script: Arc<Mutex<Script>>,
}

impl FakeSession {
    fn next(&self, sql: &str, params: &[SqlValue]) -> Option<Reply> {
        let mut script = self.script.lock().unwrap();
        script.statements.push(Recorded {
            scope: self.scope,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        script.replies.pop_front()
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match self.next(sql, params) {
            None => Ok(1),
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Rows(rows)) => Ok(rows.rows.len() as u64),
            Some(Reply::Fail(message)) => Err(DalError::Backend(message.to_string())),
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        match self.next(sql, params) {
            None => Ok(ResultSet::default()),
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Affected(_)) => Ok(ResultSet::default()),
            Some(Reply::Fail(message)) => Err(DalError::Backend(message.to_string())),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.script.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ============================================================================
// Result set builders
// ============================================================================

pub fn rows(columns: &[(&str, SqlType)], rows: Vec<Vec<SqlValue>>) -> Reply {
    Reply::Rows(ResultSet {
        columns: columns
            .iter()
            .map(|(name, ty)| ResultColumn::new(*name, *ty))
            .collect(),
        rows,
    })
}

/// `SELECT SCOPE_IDENTITY()` answer; SQL Server returns it as NUMERIC(38,0).
pub fn identity(value: Option<i64>) -> Reply {
    let cell = value.map_or(SqlValue::Null, |v| SqlValue::Decimal(Decimal::from(v)));
    rows(&[("", SqlType::Decimal)], vec![vec![cell]])
}

/// Catalog answer for `Customers(Id INT IDENTITY PRIMARY KEY, Name NVARCHAR)`.
pub fn customers_catalog() -> Reply {
    rows(
        &[("name", SqlType::String), ("", SqlType::I32), ("", SqlType::I32)],
        vec![
            vec!["Id".into(), SqlValue::I32(1), SqlValue::I32(1)],
            vec!["Name".into(), SqlValue::I32(0), SqlValue::I32(0)],
        ],
    )
}

/// Catalog answer for `Customers(Id INT PRIMARY KEY, Name NVARCHAR)`: a key
/// the caller assigns.
pub fn customers_catalog_natural_key() -> Reply {
    rows(
        &[("name", SqlType::String), ("", SqlType::I32), ("", SqlType::I32)],
        vec![
            vec!["Id".into(), SqlValue::I32(0), SqlValue::I32(1)],
            vec!["Name".into(), SqlValue::I32(0), SqlValue::I32(0)],
        ],
    )
}

/// `SELECT * FROM Customers` answer for the given keys.
pub fn customers(keys: &[i32]) -> Reply {
    rows(
        &[("Id", SqlType::I32), ("Name", SqlType::String)],
        keys.iter()
            .map(|k| vec![SqlValue::I32(*k), SqlValue::from(format!("c{}", k))])
            .collect(),
    )
}
