//! The engine's single connection handle.

use tracing::{debug, warn};

use crate::backend::{ConnectScope, Connector, Session};
use crate::error::Result;

/// Whether the handle currently holds a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// A link to one database on one server, opened and closed around every
/// engine operation.
pub struct ConnectionHandle {
    server: String,
    database: String,
    session: Option<Box<dyn Session>>,
}

impl ConnectionHandle {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            session: None,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> ConnectionState {
        if self.session.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Open the link unless it is already open, and return the session.
    pub async fn open(&mut self, connector: &dyn Connector, scope: ConnectScope) -> Result<&mut dyn Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let session = connector.connect(scope).await?;
                debug!("Opened connection to {}/{}", self.server, self.database);
                session
            }
        };
        Ok(&mut **self.session.insert(session))
    }

    /// Close the link. A failure to close is logged, never returned: the
    /// handle is Closed afterwards either way.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            match session.close().await {
                Ok(()) => debug!("Closed connection to {}/{}", self.server, self.database),
                Err(e) => warn!(
                    "Failed to close connection to {}/{}: {}",
                    self.server, self.database, e
                ),
            }
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("state", &self.state())
            .finish()
    }
}
