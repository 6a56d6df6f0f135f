//! Open sessions kept alive after discovery, keyed by provider name.

use std::collections::BTreeMap;

use bridge_session::Session;
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};

/// Sessions owned alongside a registry.
///
/// Dropping the pool drops every session, which reaps stdio children; call
/// [`SessionPool::shutdown`] to close them gracefully and observe failures.
#[derive(Debug, Default)]
pub struct SessionPool {
    sessions: BTreeMap<String, Session>,
}

impl SessionPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool holding one session.
    #[must_use]
    pub fn single(provider: impl Into<String>, session: Session) -> Self {
        let mut pool = Self::new();
        pool.insert(provider, session);
        pool
    }

    /// Adds a session, returning the one it replaced.
    pub fn insert(&mut self, provider: impl Into<String>, session: Session) -> Option<Session> {
        self.sessions.insert(provider.into(), session)
    }

    /// Removes the session for `provider`.
    pub fn remove(&mut self, provider: &str) -> Option<Session> {
        self.sessions.remove(provider)
    }

    /// Session for `provider`.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&Session> {
        self.sessions.get(provider)
    }

    /// Mutable session for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingSession`] when the provider has none.
    pub fn session_mut(&mut self, provider: &str) -> RegistryResult<&mut Session> {
        self.sessions
            .get_mut(provider)
            .ok_or_else(|| RegistryError::MissingSession {
                provider: provider.to_owned(),
            })
    }

    /// Provider names with a pooled session.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Number of pooled sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` when the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Closes every session.
    ///
    /// All sessions are closed even when one fails; the first failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Shutdown`] for the first session that failed
    /// to close.
    pub async fn shutdown(mut self) -> RegistryResult<()> {
        let mut first_failure = None;
        for (provider, session) in &mut self.sessions {
            if let Err(source) = session.close().await {
                warn!(provider = %provider, %source, "session close failed");
                first_failure.get_or_insert(RegistryError::Shutdown {
                    provider: provider.clone(),
                    source,
                });
            }
        }
        debug!(sessions = self.sessions.len(), "session pool shut down");
        first_failure.map_or(Ok(()), Err)
    }
}
