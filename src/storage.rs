//! Storage of sent messages.
//!
//! The service provider remembers every authentication request it sends so
//! the response can be matched through `InResponseTo`. Stored messages and
//! the sessions holding them expire, and both are capped in number.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::SamlResult;
use crate::types::SamlMessage;

/// Messages sent within one browser session, keyed by message ID.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Remembers `message` under its ID.
    async fn store(&self, message: SamlMessage);

    /// Returns the message with `id` and forgets every stored message.
    ///
    /// A message can be retrieved once; a replayed response finds nothing.
    /// Expired messages are never returned.
    async fn retrieve(&self, id: &str) -> Option<SamlMessage>;
}

/// Bounds on what the service provider keeps per browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// How long a sent request can be answered, in seconds. Also the idle
    /// lifetime of a session.
    #[serde(default = "default_message_ttl")]
    pub message_ttl_secs: i64,

    /// Sessions kept at once; the one closest to expiry is dropped first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Pending requests kept per session; the oldest is dropped first.
    #[serde(default = "default_max_messages")]
    pub max_messages_per_session: usize,
}

const fn default_message_ttl() -> i64 {
    600
}

const fn default_max_sessions() -> usize {
    10_000
}

const fn default_max_messages() -> usize {
    16
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            message_ttl_secs: default_message_ttl(),
            max_sessions: default_max_sessions(),
            max_messages_per_session: default_max_messages(),
        }
    }
}

impl SessionLimits {
    /// The message lifetime; negative or oversized values are refused.
    pub fn message_ttl(&self) -> SamlResult<TimeDelta> {
        crate::config::seconds("message_ttl_secs", self.message_ttl_secs)
    }
}

#[derive(Debug)]
struct Pending {
    message: SamlMessage,
    expires_at: DateTime<Utc>,
}

/// In-memory message store.
///
/// This is suitable for single-instance deployments or testing.
#[derive(Debug)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, Pending>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    capacity: usize,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    /// Creates an empty store with the default limits and the system clock.
    #[must_use]
    pub fn new() -> Self {
        let limits = SessionLimits::default();
        Self::with_limits(
            Arc::new(SystemClock),
            TimeDelta::seconds(limits.message_ttl_secs),
            limits.max_messages_per_session,
        )
    }

    /// Creates an empty store keeping at most `capacity` messages for `ttl`.
    #[must_use]
    pub fn with_limits(clock: Arc<dyn Clock>, ttl: TimeDelta, capacity: usize) -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            clock,
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.checked_add_signed(self.ttl).unwrap_or(now)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn store(&self, message: SamlMessage) {
        let now = self.clock.now();
        let expires_at = self.expiry();
        let mut messages = self.messages.write().await;
        messages.retain(|_, pending| pending.expires_at > now);
        while messages.len() >= self.capacity {
            let oldest = messages
                .iter()
                .min_by_key(|(_, pending)| pending.expires_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => messages.remove(&id),
                None => break,
            };
        }
        debug!(id = %message.id(), kind = message.kind(), "storing message");
        messages.insert(
            message.id().to_string(),
            Pending {
                message,
                expires_at,
            },
        );
    }

    async fn retrieve(&self, id: &str) -> Option<SamlMessage> {
        let now = self.clock.now();
        let mut messages = self.messages.write().await;
        let pending = messages.remove(id);
        messages.clear();
        match pending {
            Some(pending) if pending.expires_at > now => Some(pending.message),
            Some(pending) => {
                debug!(id, expired_at = %pending.expires_at, "stored message expired");
                None
            }
            None => None,
        }
    }
}

#[derive(Debug)]
struct Session {
    store: Arc<InMemoryMessageStore>,
    expires_at: DateTime<Utc>,
}

/// One [`MessageStore`] per browser session.
///
/// Sessions exist only under IDs handed out by [`SessionStores::open`].
#[derive(Debug)]
pub struct SessionStores {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    limits: SessionLimits,
}

impl Default for SessionStores {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStores {
    /// Creates an empty registry with the default limits.
    #[must_use]
    pub fn new() -> Self {
        let limits = SessionLimits::default();
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            ttl: TimeDelta::seconds(limits.message_ttl_secs),
            limits,
        }
    }

    /// Creates an empty registry bounded by `limits`.
    pub fn with_limits(clock: Arc<dyn Clock>, limits: SessionLimits) -> SamlResult<Self> {
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
            ttl: limits.message_ttl()?,
            limits,
        })
    }

    /// Starts a session under a fresh random ID.
    pub async fn open(&self) -> (String, Arc<InMemoryMessageStore>) {
        let id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let store = Arc::new(InMemoryMessageStore::with_limits(
            Arc::clone(&self.clock),
            self.ttl,
            self.limits.max_messages_per_session,
        ));

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        while sessions.len() >= self.limits.max_sessions.max(1) {
            let closest = sessions
                .iter()
                .min_by_key(|(_, session)| session.expires_at)
                .map(|(id, _)| id.clone());
            match closest {
                Some(closest) => sessions.remove(&closest),
                None => break,
            };
        }
        sessions.insert(
            id.clone(),
            Session {
                store: Arc::clone(&store),
                expires_at: now.checked_add_signed(self.ttl).unwrap_or(now),
            },
        );
        debug!(sessions = sessions.len(), "opened session");
        (id, store)
    }

    /// Store of a live session, extending its lifetime.
    ///
    /// Unknown and expired IDs give `None`.
    pub async fn existing(&self, session: &str) -> Option<Arc<InMemoryMessageStore>> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session) {
            Some(live) if live.expires_at > now => {
                live.expires_at = now.checked_add_signed(self.ttl).unwrap_or(now);
                Some(Arc::clone(&live.store))
            }
            Some(_) => {
                sessions.remove(session);
                None
            }
            None => None,
        }
    }

    /// Number of sessions currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::testing;
    use crate::types::{Binding, LogoutRequest, NameId, NameIdFormat};

    fn message(id: &str) -> SamlMessage {
        SamlMessage::LogoutRequest(LogoutRequest {
            id: id.to_string(),
            issue_instant: testing::instant(),
            destination: Some(crate::metadata::Endpoint::new(
                "https://idp.example.com/slo",
                Binding::Redirect,
                0,
            )),
            issuer: "https://sp.example.com".to_string(),
            name_id: NameId::new("alice", NameIdFormat::Persistent),
            session_indexes: vec![],
            not_on_or_after: None,
            signing: None,
            signature: None,
        })
    }

    fn limits(max_sessions: usize, max_messages_per_session: usize) -> SessionLimits {
        SessionLimits {
            message_ttl_secs: 600,
            max_sessions,
            max_messages_per_session,
        }
    }

    #[tokio::test]
    async fn retrieve_consumes_the_store() {
        let store = InMemoryMessageStore::new();
        store.store(message("_a")).await;
        store.store(message("_b")).await;

        assert_eq!(store.retrieve("_a").await.map(|m| m.id().to_string()), Some("_a".to_string()));
        assert!(store.retrieve("_a").await.is_none());
        assert!(store.retrieve("_b").await.is_none());
    }

    #[tokio::test]
    async fn unknown_id_still_clears() {
        let store = InMemoryMessageStore::new();
        store.store(message("_a")).await;
        assert!(store.retrieve("_other").await.is_none());
        assert!(store.retrieve("_a").await.is_none());
    }

    #[tokio::test]
    async fn expired_request_is_not_matched() {
        let clock = Arc::new(FixedClock::new(testing::instant()));
        let store = InMemoryMessageStore::with_limits(clock.clone(), TimeDelta::seconds(600), 4);

        store.store(message("_fresh")).await;
        clock.advance(TimeDelta::seconds(599));
        assert!(store.retrieve("_fresh").await.is_some());

        store.store(message("_stale")).await;
        clock.advance(TimeDelta::seconds(600));
        assert!(store.retrieve("_stale").await.is_none());
    }

    #[tokio::test]
    async fn oldest_request_gives_way() {
        let clock = Arc::new(FixedClock::new(testing::instant()));
        let store = InMemoryMessageStore::with_limits(clock.clone(), TimeDelta::seconds(600), 2);
        for id in ["_1", "_2", "_3"] {
            store.store(message(id)).await;
            clock.advance(TimeDelta::seconds(1));
        }
        assert!(store.retrieve("_1").await.is_none());

        for id in ["_1", "_2", "_3"] {
            store.store(message(id)).await;
            clock.advance(TimeDelta::seconds(1));
        }
        assert!(store.retrieve("_3").await.is_some());
    }

    #[tokio::test]
    async fn only_issued_sessions_exist() {
        let stores = SessionStores::new();
        let (one, store) = stores.open().await;
        store.store(message("_a")).await;

        assert!(stores.existing("made-up-by-the-client").await.is_none());
        assert!(!stores.is_empty().await);
        assert_eq!(stores.len().await, 1);
        let (two, _) = stores.open().await;
        assert_ne!(one, two);
        assert!(stores.existing(&two).await.unwrap().retrieve("_a").await.is_none());
        assert!(stores.existing(&one).await.unwrap().retrieve("_a").await.is_some());
    }

    #[tokio::test]
    async fn sessions_expire_and_are_capped() {
        let clock = Arc::new(FixedClock::new(testing::instant()));
        let stores = SessionStores::with_limits(clock.clone(), limits(2, 4)).unwrap();

        let (first, _) = stores.open().await;
        clock.advance(TimeDelta::seconds(1));
        let (second, _) = stores.open().await;
        clock.advance(TimeDelta::seconds(1));
        let (third, _) = stores.open().await;
        assert_eq!(stores.len().await, 2);
        assert!(stores.existing(&first).await.is_none());
        assert!(stores.existing(&second).await.is_some());

        clock.advance(TimeDelta::seconds(600));
        assert!(stores.existing(&third).await.is_none());
        stores.open().await;
        assert_eq!(stores.len().await, 1);
    }

    #[test]
    fn negative_ttl_is_refused() {
        let clock = Arc::new(FixedClock::new(testing::instant()));
        let mut bad = limits(1, 1);
        bad.message_ttl_secs = -1;
        assert!(SessionStores::with_limits(clock, bad).is_err());
    }
}
