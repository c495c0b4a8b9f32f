//! Session cache with per-account locking and TTL
//!
//! Holds at most one [`Session`] per [`CacheKey`]. Each session guards its
//! token behind its own async mutex so that checking, refreshing, and
//! replacing a token for one account is serialized while other accounts
//! proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::credentials::{CacheKey, Credentials};

/// Mutable token state of a session
#[derive(Debug, Default)]
pub struct SessionState {
    /// Session id issued by the server, absent until first login
    token: Option<SecretString>,
    /// Client-side expiry of `token`
    expires_at: Option<Instant>,
}

impl SessionState {
    /// True when a token is present and its local TTL has not elapsed
    pub fn is_valid(&self) -> bool {
        match (&self.token, self.expires_at) {
            (Some(_), Some(expires_at)) => Instant::now() < expires_at,
            _ => false,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }

    /// Store a freshly issued token valid for `ttl`
    pub fn install(&mut self, token: String, ttl: Duration) {
        self.token = Some(SecretString::new(token.into()));
        self.expires_at = Some(Instant::now() + ttl);
    }

    pub fn invalidate(&mut self) {
        self.token = None;
        self.expires_at = None;
    }
}

/// One cached session bound to a credentials triple
///
/// `auth_header` is fixed for the lifetime of the session; a different
/// secret for the same key produces a new session instead.
#[derive(Debug)]
pub struct Session {
    auth_header: SecretString,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(auth_header: SecretString) -> Self {
        Self {
            auth_header,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// `Authorization` header value sent with every request
    pub fn auth_header(&self) -> &str {
        self.auth_header.expose_secret()
    }

    /// Lock the token state for this session
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }
}

/// Keyed session cache
///
/// Entries are created lazily, replaced when the secret for a key changes,
/// and swept once expired and no longer in use. Nothing is persisted and no
/// logout is sent to the server on eviction.
#[derive(Debug)]
pub struct SessionCache {
    /// Client-side session lifetime
    ttl: Duration,
    /// Live sessions keyed by normalized account and server
    entries: Mutex<HashMap<CacheKey, Arc<Session>>>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get or create the session for `creds`
    ///
    /// Idle expired sessions are swept first. A cached session whose
    /// `Authorization` value differs from the one derived from `creds`
    /// belongs to an old secret and is discarded.
    pub async fn session_for(&self, creds: &Credentials) -> Arc<Session> {
        let key = creds.cache_key();
        let auth_header = creds.basic_auth_header();

        let mut entries = self.entries.lock().await;
        let swept = sweep(&mut entries);
        if swept > 0 {
            debug!(swept, "swept expired sessions");
        }

        if let Some(existing) = entries.get(&key) {
            if existing.auth_header() == auth_header.expose_secret() {
                debug!(account = %key.account, server = %key.server_url, "using cached session");
                return Arc::clone(existing);
            }
            info!(
                account = %key.account,
                server = %key.server_url,
                "credentials changed, replacing cached session"
            );
        } else {
            info!(account = %key.account, server = %key.server_url, "creating new session");
        }

        let session = Arc::new(Session::new(auth_header));
        entries.insert(key, Arc::clone(&session));
        session
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Drop every cached session (process shutdown)
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        debug!(count, "session cache cleared");
    }
}

/// Evict sessions that are expired or unauthenticated and not in flight
///
/// A session is in flight while some caller still holds an `Arc` to it or
/// holds its state lock; those are left alone so concurrent callers for the
/// same key keep sharing one session.
fn sweep(entries: &mut HashMap<CacheKey, Arc<Session>>) -> usize {
    let before = entries.len();
    entries.retain(|key, session| {
        if Arc::strong_count(session) > 1 {
            return true;
        }
        let keep = session
            .state
            .try_lock()
            .map_or(true, |state| state.is_valid());
        if !keep {
            debug!(account = %key.account, server = %key.server_url, "removing expired session");
        }
        keep
    });
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::SessionCache;
    use crate::credentials::Credentials;

    fn creds(secret: &str) -> Credentials {
        Credentials::new("user@example.com", secret, "https://mail.example.com")
            .expect("valid credentials")
    }

    #[tokio::test]
    async fn same_credentials_share_one_session() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let a = cache.session_for(&creds("secret123")).await;
        let b = cache.session_for(&creds("secret123")).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn account_case_differences_map_to_same_key() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let upper = Credentials::new("USER@example.com", "s", "https://mail.example.com/")
            .expect("valid credentials");
        let _a = cache.session_for(&upper).await;
        let _b = cache.session_for(&creds("s")).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn changed_secret_replaces_session() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let old = cache.session_for(&creds("old-secret")).await;
        old.lock()
            .await
            .install("abc".to_owned(), Duration::from_secs(60));

        let new = cache.session_for(&creds("new-secret")).await;
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(new.lock().await.token().is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn installed_token_expires_after_ttl() {
        let cache = SessionCache::new(Duration::ZERO);
        let session = cache.session_for(&creds("s")).await;
        let mut state = session.lock().await;
        assert!(!state.is_valid());
        state.install("abc".to_owned(), cache.ttl());
        assert!(!state.is_valid());
        state.install("abc".to_owned(), Duration::from_secs(60));
        assert!(state.is_valid());
        state.invalidate();
        assert!(!state.is_valid());
        assert!(state.token().is_none());
    }

    #[tokio::test]
    async fn lookup_sweeps_idle_unauthenticated_sessions() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let other = Credentials::new("other@example.com", "s", "https://mail.example.com")
            .expect("valid credentials");

        let held = cache.session_for(&creds("s")).await;
        let _other = cache.session_for(&other).await;
        assert_eq!(cache.len().await, 2);

        drop(held);
        let _other = cache.session_for(&other).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn lookup_sweeps_idle_expired_sessions() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let other = Credentials::new("other@example.com", "s", "https://mail.example.com")
            .expect("valid credentials");
        {
            let session = cache.session_for(&creds("s")).await;
            session
                .lock()
                .await
                .install("abc".to_owned(), Duration::ZERO);
        }
        assert_eq!(cache.len().await, 1);

        let _other = cache.session_for(&other).await;
        assert_eq!(cache.len().await, 1);
        let fresh = cache.session_for(&creds("s")).await;
        assert!(fresh.lock().await.token().is_none());
    }

    #[tokio::test]
    async fn lookup_keeps_valid_idle_sessions() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let other = Credentials::new("other@example.com", "s", "https://mail.example.com")
            .expect("valid credentials");
        {
            let session = cache.session_for(&creds("s")).await;
            session
                .lock()
                .await
                .install("abc".to_owned(), Duration::from_secs(60));
        }
        let _other = cache.session_for(&other).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
