//! Several open cards at once
//!
//! Sessions share no state; each is handed out behind its own mutex so
//! calls into one session never interleave.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::card::{CardKind, CardSnapshot, SnapshotStore};
use crate::config::SimulatorConfig;
use crate::error::SessionError;
use super::card_session::CardSession;
use super::state::AppState;

/// A session shared with the caller
pub type SharedSession = Arc<Mutex<CardSession>>;

/// Open card sessions, in creation order
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<Uuid, SharedSession>,
    names: HashMap<String, Uuid>,
    order: Vec<Uuid>,
    active: Option<Uuid>,
    user_info: String,
    store: Option<SnapshotStore>,
}

impl SessionManager {
    /// Manager without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager using the user info and storage directory of `config`
    pub fn with_config(config: &SimulatorConfig) -> Self {
        Self {
            user_info: config.user_info.clone(),
            store: config
                .storage_dir
                .as_ref()
                .map(|dir| SnapshotStore::new(Some(dir.clone()))),
            ..Self::default()
        }
    }

    /// Snapshot store backing the sessions, if any
    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    fn ensure_unique(&self, name: &str) -> Result<(), SessionError> {
        if self.names.contains_key(name) {
            return Err(SessionError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Register a session once its snapshot is stored
    fn insert(&mut self, session: CardSession) -> Result<SharedSession, SessionError> {
        if let Some(store) = &self.store {
            store.save(&session.snapshot())?;
        }
        let id = session.id();
        self.names.insert(session.name().to_string(), id);
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&shared));
        self.order.push(id);
        self.active = Some(id);
        Ok(shared)
    }

    /// Create a factory-fresh card and make it active
    pub fn create_session(&mut self, name: &str, kind: CardKind) -> Result<SharedSession, SessionError> {
        self.ensure_unique(name)?;
        let mut session = CardSession::new(name, kind);
        if !self.user_info.is_empty() {
            session.set_user_info(self.user_info.clone());
        }
        info!("Opened card '{}' ({})", name, kind);
        self.insert(session)
    }

    /// Create a card from a memory dump
    ///
    /// Without an explicit kind the family is chosen from the dump size.
    /// `internal_psc` overrides the PSC register of a 256-byte card.
    pub fn open_from_dump(
        &mut self,
        name: &str,
        kind: Option<CardKind>,
        dump: &[u8],
        internal_psc: Option<&[u8]>,
    ) -> Result<SharedSession, SessionError> {
        self.ensure_unique(name)?;
        let kind = match kind.or_else(|| CardKind::for_dump_len(dump.len())) {
            Some(kind) => kind,
            None => {
                return Err(SessionError::InvalidDump(format!(
                    "{} bytes is larger than any card",
                    dump.len()
                )))
            }
        };

        let mut session = CardSession::new(name, kind);
        if !self.user_info.is_empty() {
            session.set_user_info(self.user_info.clone());
        }
        if !session.load_memory_dump_with_psc(dump, internal_psc) {
            warn!("Failed to load dump into '{}'", name);
            return Err(SessionError::InvalidDump(format!(
                "{} bytes (PSC override: {}) does not fit {}",
                dump.len(),
                internal_psc.is_some(),
                kind
            )));
        }
        info!("Opened card '{}' ({}) from dump", name, kind);
        self.insert(session)
    }

    /// Re-open a session from a snapshot
    pub fn open_snapshot(&mut self, snapshot: CardSnapshot) -> Result<SharedSession, SessionError> {
        self.ensure_unique(&snapshot.card_name)?;
        if self.sessions.contains_key(&snapshot.session_id) {
            return Err(SessionError::DuplicateName(snapshot.card_name));
        }
        let session = CardSession::from_snapshot(snapshot)?;
        self.insert(session)
    }

    /// Write a session's snapshot to the store; None without a store
    pub fn persist(&self, id: Uuid) -> Result<Option<PathBuf>, SessionError> {
        let session = self.get(id).ok_or(SessionError::UnknownSession(id))?;
        match &self.store {
            Some(store) => {
                let snapshot = session.lock().snapshot();
                Ok(Some(store.save(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<SharedSession> {
        self.names.get(name).and_then(|id| self.get(*id))
    }

    /// All sessions in creation order
    pub fn sessions(&self) -> Vec<SharedSession> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active(&self) -> Option<SharedSession> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    /// Make a session active; false for unknown ids
    pub fn set_active(&mut self, id: Uuid) -> bool {
        if self.sessions.contains_key(&id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// State of the active session, `Initial` when none is active
    pub fn app_state(&self) -> AppState {
        match self.active() {
            Some(session) => session.lock().current_app_state(),
            None => AppState::Initial,
        }
    }

    /// Close a session and remove its snapshot
    ///
    /// Closing the active session leaves no session active.
    pub fn close(&mut self, id: Uuid) -> Result<bool, SessionError> {
        if self.sessions.remove(&id).is_none() {
            return Ok(false);
        }
        self.names.retain(|_, other| *other != id);
        self.order.retain(|other| *other != id);
        if self.active == Some(id) {
            self.active = None;
        }
        if let Some(store) = &self.store {
            store.remove(id)?;
        }
        info!("Closed card {}", id);
        Ok(true)
    }

    /// Close every session
    pub fn close_all(&mut self) -> Result<(), SessionError> {
        for id in self.order.clone() {
            self.close(id)?;
        }
        Ok(())
    }
}
