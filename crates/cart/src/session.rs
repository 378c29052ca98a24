//! Authenticated session state shared across API calls.
//!
//! The access token is process-wide mutable state. Rather than a bare
//! module-level variable, it lives behind an explicit [`Session`] handle
//! with `set` / `clear` / read operations and a single-flight refresh
//! guard: when several calls hit a 401 at the same time (typical on page
//! load), only one of them performs the `/auth/refresh` round-trip and the
//! rest reuse the rotated token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, MutexGuard};

/// Shared handle to the current access token.
///
/// Cheap to clone; all clones observe the same token. Every token rotation
/// bumps a monotonic epoch so a refresher can tell whether someone else
/// already rotated the token it saw fail.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: RwLock<Option<SecretString>>,
    epoch: AtomicU64,
    refresh_guard: Mutex<()>,
}

impl Session {
    /// Create a session with no token (anonymous).
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                token: RwLock::new(None),
                epoch: AtomicU64::new(0),
                refresh_guard: Mutex::new(()),
            }),
        }
    }

    /// Install a new access token, bumping the epoch.
    pub fn set_token(&self, token: impl Into<String>) {
        let mut slot = self
            .inner
            .token
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(SecretString::from(token.into()));
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the token (logout). Bumps the epoch so in-flight refresh
    /// decisions based on the old token are invalidated.
    pub fn clear(&self) {
        let mut slot = self
            .inner
            .token
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = None;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Current token value, if any. Read synchronously at call time; a call
    /// racing a rotation may still send a stale token and rely on the
    /// client's 401-retry-once path.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    /// Whether a token is currently installed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Epoch of the current token. Advances on every `set_token`/`clear`.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Acquire the single-flight refresh guard.
    ///
    /// Callers must re-check [`epoch`](Self::epoch) against the epoch they
    /// observed before the 401: if it advanced while waiting for the guard,
    /// another caller already refreshed and the fresh token should be reused
    /// instead of issuing a second refresh request.
    pub async fn begin_refresh(&self) -> MutexGuard<'_, ()> {
        self.inner.refresh_guard.lock().await
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("authenticated", &self.is_authenticated())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_anonymous() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn test_set_and_clear_bump_epoch() {
        let session = Session::new();
        session.set_token("tok-1");
        assert_eq!(session.token().as_deref(), Some("tok-1"));
        assert_eq!(session.epoch(), 1);

        session.set_token("tok-2");
        assert_eq!(session.token().as_deref(), Some("tok-2"));
        assert_eq!(session.epoch(), 2);

        session.clear();
        assert!(!session.is_authenticated());
        assert_eq!(session.epoch(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let a = Session::new();
        let b = a.clone();
        a.set_token("shared");
        assert_eq!(b.token().as_deref(), Some("shared"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session::new();
        session.set_token("very-secret-token");
        let debug = format!("{session:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret-token"));
    }

    #[tokio::test]
    async fn test_refresh_guard_coalesces() {
        // Simulates two callers that both saw a 401 at epoch 1: the first
        // through the guard refreshes, the second sees the advanced epoch
        // and reuses the rotated token.
        let session = Session::new();
        session.set_token("stale");
        let observed_epoch = session.epoch();

        let refreshes = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));

        for _ in 0..2 {
            let guard = session.begin_refresh().await;
            if session.epoch() == observed_epoch {
                session.set_token("fresh");
                refreshes.fetch_add(1, Ordering::SeqCst);
            }
            drop(guard);
        }

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(session.token().as_deref(), Some("fresh"));
    }
}
