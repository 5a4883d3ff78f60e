//! Session registry.
//!
//! Owns one [`SessionAdapter`] per live transport session and is the
//! [`SessionListener`] for all of them:
//!
//! - Application frames received after a handshake ended are forwarded to a
//!   bounded channel as [`PassThroughMessage`]s.
//! - Closed sessions are removed from the map.
//!
//! ```text
//! transport ──accept/connect──> SessionRegistry ──owns──> SessionAdapter (×N)
//!                                    ↑                        │
//!                                    └── on_message/closed ───┘
//!                                    │
//!                                    ↓
//!                       mpsc::Receiver<PassThroughMessage>
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    attestation::measurement::MeasurementService,
    config::{ProtocolConfig, Role},
    env::Environment,
    session::{SessionAdapter, SessionHandler},
    transport::{SessionId, SessionListener, TransportSession},
};

/// Close code given to a session whose id was reused by a newer one
pub const CLOSE_SESSION_REPLACED: u16 = 4000;

/// Application frame received after the handshake ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThroughMessage {
    /// Session the frame arrived on
    pub session: SessionId,
    /// Raw frame bytes, exactly as received
    pub payload: Bytes,
}

/// Live sessions, keyed by transport session id
pub struct SessionRegistry<E: Environment> {
    config: ProtocolConfig,
    env: E,
    service: Arc<dyn MeasurementService>,
    sessions: RwLock<HashMap<SessionId, Arc<SessionAdapter<E>>>>,
    pass_through: mpsc::Sender<PassThroughMessage>,
}

impl<E: Environment> SessionRegistry<E> {
    /// Create a registry and the receiving end of its pass-through channel
    ///
    /// `capacity` bounds the channel. Frames arriving while it is full are
    /// dropped with a warning, so a slow consumer never holds back a session.
    pub fn new(
        config: ProtocolConfig,
        env: E,
        service: Arc<dyn MeasurementService>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<PassThroughMessage>) {
        let (pass_through, receiver) = mpsc::channel(capacity.max(1));
        let registry = Arc::new(Self {
            config,
            env,
            service,
            sessions: RwLock::new(HashMap::new()),
            pass_through,
        });
        (registry, receiver)
    }

    /// Register an inbound session and wait for the peer's `Hello`
    pub async fn accept(
        self: &Arc<Self>,
        session: Arc<dyn TransportSession>,
    ) -> Arc<SessionAdapter<E>> {
        self.open(Role::Acceptor, session).await
    }

    /// Register an outbound session and send `Hello`
    pub async fn connect(
        self: &Arc<Self>,
        session: Arc<dyn TransportSession>,
    ) -> Arc<SessionAdapter<E>> {
        self.open(Role::Initiator, session).await
    }

    async fn open(
        self: &Arc<Self>,
        role: Role,
        session: Arc<dyn TransportSession>,
    ) -> Arc<SessionAdapter<E>> {
        let listener: Arc<dyn SessionListener> = self.clone();
        let adapter = Arc::new(SessionAdapter::new(
            self.config.clone().with_role(role),
            self.env.clone(),
            Arc::clone(&self.service),
            listener,
        ));

        let id = session.id();
        if let Some(previous) = self.get(id) {
            tracing::warn!(session_id = %id, "session id reused, closing previous session");
            previous.on_close(id, CLOSE_SESSION_REPLACED, "session id reused").await;
        }

        adapter.on_open(session).await;
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&adapter));
        adapter
    }

    /// Adapter for a live session
    #[must_use]
    pub fn get(&self, session: SessionId) -> Option<Arc<SessionAdapter<E>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).get(&session).cloned()
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live sessions, sorted
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> =
            self.sessions.read().unwrap_or_else(PoisonError::into_inner).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run the handshake timeout check on every live session
    pub async fn tick(&self) {
        let adapters: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for adapter in adapters {
            adapter.tick().await;
        }
    }
}

#[async_trait]
impl<E: Environment> SessionListener for SessionRegistry<E> {
    async fn on_message(&self, session: SessionId, bytes: Bytes) {
        let message = PassThroughMessage { session, payload: bytes };
        match self.pass_through.try_send(message) {
            Ok(()) => {},
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    session_id = %session,
                    len = message.payload.len(),
                    "pass-through channel full, dropping frame"
                );
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %session, "pass-through receiver dropped");
            },
        }
    }

    async fn notify_closed(&self, session: SessionId) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        // A stale close for a reused id must not release its replacement
        let removed = match sessions.get(&session) {
            Some(adapter) if adapter.is_closed() => sessions.remove(&session),
            _ => None,
        };
        tracing::debug!(session_id = %session, removed = removed.is_some(), "session released");
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex as StdMutex, time::Duration};

    use idscp_proto::{
        MessageType, Payload,
        payloads::session::{Hello, SelfDescription},
    };

    use super::*;
    use crate::{
        attestation::measurement::{AttestationRequest, AttestationResponse, MeasurementError},
        env::SystemEnv,
        event::Event,
        machine::ProtocolState,
    };

    struct Unavailable;

    #[async_trait]
    impl MeasurementService for Unavailable {
        async fn measure(
            &self,
            _request: AttestationRequest,
        ) -> Result<AttestationResponse, MeasurementError> {
            Err(MeasurementError::Unavailable("test".into()))
        }
    }

    struct Session {
        id: SessionId,
        sent: StdMutex<Vec<Bytes>>,
    }

    impl Session {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self { id: SessionId(id), sent: StdMutex::new(Vec::new()) })
        }

        fn sent_types(&self) -> Vec<MessageType> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|bytes| Event::from_bytes(bytes.clone()).message_type())
                .collect()
        }
    }

    #[async_trait]
    impl TransportSession for Session {
        fn id(&self) -> SessionId {
            self.id
        }

        fn remote(&self) -> String {
            format!("peer-{}", self.id.0)
        }

        async fn send(&self, bytes: Bytes) -> io::Result<()> {
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }
    }

    fn registry() -> (Arc<SessionRegistry<SystemEnv>>, mpsc::Receiver<PassThroughMessage>) {
        SessionRegistry::new(ProtocolConfig::default(), SystemEnv, Arc::new(Unavailable), 8)
    }

    fn frame(payload: Payload) -> Bytes {
        Event::from_payload(payload).unwrap().raw().clone()
    }

    #[tokio::test]
    async fn sessions_get_the_requested_role() {
        let (registry, _rx) = registry();
        let inbound = Session::new(1);
        let outbound = Session::new(2);

        registry.accept(inbound.clone()).await;
        registry.connect(outbound.clone()).await;

        assert_eq!(registry.session_ids(), vec![SessionId(1), SessionId(2)]);
        assert!(inbound.sent_types().is_empty());
        assert_eq!(outbound.sent_types(), vec![MessageType::Hello]);
    }

    #[tokio::test]
    async fn close_removes_the_session() {
        let (registry, _rx) = registry();
        let adapter = registry.accept(Session::new(7)).await;
        assert_eq!(registry.len(), 1);

        adapter.on_close(SessionId(7), 1000, "done").await;

        assert!(registry.is_empty());
        assert!(registry.get(SessionId(7)).is_none());
    }

    #[tokio::test]
    async fn terminal_frames_reach_the_channel() {
        let (registry, mut rx) = registry();
        let adapter = registry.accept(Session::new(3)).await;

        // Metadata before Hello fails the handshake
        let metadata = frame(Payload::Metadata(SelfDescription { document: "x".into() }));
        adapter.on_message(SessionId(3), metadata).await;
        assert_eq!(adapter.state(), ProtocolState::Error);

        let late = frame(Payload::Hello(Hello { version: 1, mutual_attestation: false }));
        adapter.on_message(SessionId(3), late.clone()).await;

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(message, Some(PassThroughMessage { session: SessionId(3), payload: late }));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block_sessions() {
        let (registry, rx) = registry();
        drop(rx);
        let adapter = registry.accept(Session::new(4)).await;
        adapter.on_message(SessionId(4), frame(Payload::Raw(Bytes::from_static(b"x")))).await;

        adapter.on_message(SessionId(4), frame(Payload::Raw(Bytes::from_static(b"y")))).await;

        assert_eq!(adapter.state(), ProtocolState::Error);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (registry, mut rx) =
            SessionRegistry::new(ProtocolConfig::default(), SystemEnv, Arc::new(Unavailable), 1);
        let adapter = registry.accept(Session::new(6)).await;

        let first = frame(Payload::Raw(Bytes::from_static(b"first")));
        let second = frame(Payload::Raw(Bytes::from_static(b"second")));
        // The first frame fails the handshake and is not forwarded
        adapter.on_message(SessionId(6), frame(Payload::Raw(Bytes::from_static(b"x")))).await;
        adapter.on_message(SessionId(6), first.clone()).await;

        let forwarded = tokio::time::timeout(
            Duration::from_secs(1),
            adapter.on_message(SessionId(6), second),
        )
        .await;
        assert!(forwarded.is_ok(), "forwarding waited on a full channel");

        tokio::time::timeout(Duration::from_secs(1), adapter.on_close(SessionId(6), 1000, "done"))
            .await
            .unwrap();
        assert!(registry.is_empty());

        let forwarded = rx.recv().await;
        assert_eq!(forwarded, Some(PassThroughMessage { session: SessionId(6), payload: first }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reused_id_closes_the_previous_session() {
        let (registry, _rx) = registry();
        let first = registry.accept(Session::new(9)).await;
        let second = registry.accept(Session::new(9)).await;

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(SessionId(9)).unwrap(), &second));

        // A late close on the replaced adapter leaves the new one registered
        first.on_close(SessionId(9), 1000, "late").await;
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(SessionId(9)).unwrap(), &second));

        second.on_close(SessionId(9), 1000, "done").await;
        assert!(registry.is_empty());
    }
}
