//! Session registry: the single source of truth for who is online and what
//! they publish.
//!
//! All operations take the one registry lock, and every helper that feeds a
//! fan-out computes its whole result under a single lock acquisition so the
//! caller always works from a consistent point-in-time view.

use std::collections::HashMap;

use shoal_protocol::{Catalogs, Message};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("username {0:?} is already connected")]
    DuplicateUsername(String),
}

/// A catalog mutation requested by the owning peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOp {
    Add,
    Delete,
}

/// Clonable, non-blocking handle onto one session's outbound queue.
///
/// A per-connection writer task drains the queue into the socket, so
/// queueing never blocks a fan-out on a slow peer. A failed send means the
/// connection is already gone; callers treat that like an absent peer.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub fn send(&self, message: Message) -> Result<(), SendError<Message>> {
        self.tx.send(message)
    }
}

/// One connected peer. Owned exclusively by the registry; the session task
/// removes its own entry on disconnect.
#[derive(Debug)]
struct Session {
    catalog: Vec<String>,
    handle: PeerHandle,
}

/// Map from username to live session.
///
/// Invariants: a username maps to at most one live session, and no view
/// handed out for peer P ever contains P's own entry.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session and return the snapshot of everyone else's catalogs
    /// for the joiner's initial `files_update`. Duplicate usernames are
    /// rejected without touching any state.
    pub async fn register(
        &self,
        username: &str,
        catalog: Vec<String>,
        handle: PeerHandle,
    ) -> Result<Catalogs, RegisterError> {
        if username.is_empty() {
            return Err(RegisterError::EmptyUsername);
        }
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(username) {
            return Err(RegisterError::DuplicateUsername(username.to_string()));
        }
        let others = snapshot_excluding(&sessions, username);
        sessions.insert(username.to_string(), Session { catalog, handle });
        Ok(others)
    }

    /// Remove a session. No-op if the username is not registered.
    pub async fn deregister(&self, username: &str) {
        self.sessions.lock().await.remove(username);
    }

    /// Apply a catalog mutation for `username`'s own session. Returns true
    /// when the catalog actually changed, so callers can skip fan-out for
    /// no-ops (absent session, or deleting a filename that was never there).
    pub async fn mutate_catalog(&self, username: &str, op: CatalogOp, filename: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(username) else {
            return false;
        };
        match op {
            CatalogOp::Add => {
                session.catalog.push(filename.to_string());
                true
            }
            CatalogOp::Delete => match session.catalog.iter().position(|f| f == filename) {
                Some(index) => {
                    session.catalog.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    /// Catalogs of every live session other than `username`.
    pub async fn snapshot_excluding(&self, username: &str) -> Catalogs {
        snapshot_excluding(&*self.sessions.lock().await, username)
    }

    /// Outbound handle for a username, if that peer is connected.
    pub async fn lookup(&self, username: &str) -> Option<PeerHandle> {
        self.sessions
            .lock()
            .await
            .get(username)
            .map(|session| session.handle.clone())
    }

    /// Outbound handles of every live session except `exclude`.
    pub async fn recipients_excluding(&self, exclude: Option<&str>) -> Vec<(String, PeerHandle)> {
        self.sessions
            .lock()
            .await
            .iter()
            .filter(|(username, _)| Some(username.as_str()) != exclude)
            .map(|(username, session)| (username.clone(), session.handle.clone()))
            .collect()
    }

    /// Personalized `files_update` views for every live session except
    /// `exclude`, all computed from the same point-in-time state.
    pub async fn update_views(
        &self,
        exclude: Option<&str>,
    ) -> Vec<(String, PeerHandle, Catalogs)> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .filter(|(username, _)| Some(username.as_str()) != exclude)
            .map(|(username, session)| {
                (
                    username.clone(),
                    session.handle.clone(),
                    snapshot_excluding(&sessions, username),
                )
            })
            .collect()
    }
}

fn snapshot_excluding(sessions: &HashMap<String, Session>, username: &str) -> Catalogs {
    sessions
        .iter()
        .filter(|(other, _)| other.as_str() != username)
        .map(|(other, session)| (other.clone(), session.catalog.clone()))
        .collect()
}
