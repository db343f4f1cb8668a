//! Per-table session registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::session::TableSession;
use crate::source::RowSource;
use crate::source::TableId;

/// Keeps at most one open [`TableSession`] per table.
///
/// Sessions for different tables are fully independent. Opening a table
/// that already has a session returns the existing one.
pub struct SessionRegistry {
    source: Arc<dyn RowSource>,
    config: SessionConfig,
    sessions: DashMap<TableId, TableSession>,
}

impl SessionRegistry {
    /// Creates a registry opening sessions against `source` with `config`.
    pub fn new(source: Arc<dyn RowSource>, config: SessionConfig) -> Self {
        Self {
            source,
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the session for `table`, opening it if needed.
    ///
    /// Two concurrent opens of the same unopened table may both bootstrap;
    /// the first to finish is kept and the other is closed.
    pub async fn open(&self, table: impl Into<TableId>) -> Result<TableSession, Error> {
        let table = table.into();
        if let Some(session) = self.get(&table) {
            return Ok(session);
        }

        let session =
            TableSession::open(table.clone(), Arc::clone(&self.source), self.config.clone()).await?;

        let kept = match self.sessions.entry(table) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                entry.insert(session.clone());
                session.clone()
            }
            Entry::Vacant(entry) => entry.insert(session.clone()).clone(),
        };
        if !kept.same_session(&session) {
            session.close();
        }
        Ok(kept)
    }

    /// Registers an already open session, replacing and closing any
    /// previous session of the same table.
    pub fn insert(&self, session: TableSession) {
        if let Some(previous) = self.sessions.insert(session.table().clone(), session) {
            log::debug!("Replacing session of table {}", previous.table());
            previous.close();
        }
    }

    /// Returns the open session of `table`.
    ///
    /// A session closed through its own handle is forgotten here.
    pub fn get(&self, table: &TableId) -> Option<TableSession> {
        self.prune(table);
        self.sessions.get(table).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.prune(table);
        self.sessions.contains_key(table)
    }

    fn prune(&self, table: &TableId) {
        if self.sessions.remove_if(table, |_, session| session.is_closed()).is_some() {
            log::debug!("Dropping closed session of table {}", table);
        }
    }

    fn prune_all(&self) {
        self.sessions.retain(|_, session| !session.is_closed());
    }

    /// Closes and forgets the session of `table`. Returns `false` if there
    /// was none.
    pub fn close(&self, table: &TableId) -> bool {
        match self.sessions.remove(table) {
            Some((_, session)) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Closes the session of `table` and opens a fresh one.
    pub async fn replace(&self, table: impl Into<TableId>) -> Result<TableSession, Error> {
        let table = table.into();
        self.close(&table);
        self.open(table).await
    }

    /// Closes every session.
    pub fn close_all(&self) {
        let tables: Vec<TableId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for table in tables {
            self.close(&table);
        }
    }

    /// Tables with an open session.
    pub fn tables(&self) -> Vec<TableId> {
        self.prune_all();
        let mut tables: Vec<TableId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        tables.sort();
        tables
    }

    pub fn len(&self) -> usize {
        self.prune_all();
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prune_all();
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("tables", &self.tables())
            .field("config", &self.config)
            .finish()
    }
}
