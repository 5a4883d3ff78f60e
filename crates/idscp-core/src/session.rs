//! Session adapter.
//!
//! Binds one [`ProtocolMachine`] to one [`TransportSession`] and translates
//! transport notifications into machine calls.
//!
//! # Concurrency
//!
//! Transports may deliver frames for one session from several tasks at once.
//! Every notification takes the adapter's async mutex before touching the
//! machine, so at most one event is processed at a time. The lock is held
//! across the measurement service call; that call is bounded by
//! `measurement_timeout`.
//!
//! Waiting for the lock is cancellable: dropping an `on_message` future
//! before it acquires the lock leaves the frame unprocessed and the machine
//! untouched. Dropping it while the measurement service is answering also
//! leaves the machine in its previous state, with the challenge still
//! pending, so the same frame can be delivered again.
//!
//! After every notification the adapter publishes a snapshot of the machine
//! on a `watch` channel. Queries read the snapshot without taking the lock,
//! and [`SessionAdapter::wait_for_completion`] waits on it.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, watch};

use crate::{
    attestation::{RatResult, measurement::MeasurementService},
    config::ProtocolConfig,
    env::Environment,
    error::SessionError,
    event::Event,
    machine::{ProtocolAction, ProtocolMachine, ProtocolState},
    transport::{SessionId, SessionListener, TransportSession},
};

/// Transport lifecycle callbacks
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Connection established
    async fn on_open(&self, session: Arc<dyn TransportSession>);

    /// One complete frame received
    async fn on_message(&self, session: SessionId, bytes: Bytes);

    /// Connection closed
    async fn on_close(&self, session: SessionId, code: u16, reason: &str);

    /// Transport fault; the session is expected to close afterwards
    async fn on_error(&self, session: SessionId, error: &(dyn std::error::Error + Send + Sync));
}

struct Bound<E: Environment> {
    session: Arc<dyn TransportSession>,
    machine: ProtocolMachine<E>,
}

#[derive(Clone)]
struct Snapshot {
    state: ProtocolState,
    rat_result: Option<RatResult>,
    metadata: Option<String>,
    session: Option<Arc<dyn TransportSession>>,
    closed: bool,
}

impl Snapshot {
    fn idle() -> Self {
        Self {
            state: ProtocolState::Hello,
            rat_result: None,
            metadata: None,
            session: None,
            closed: false,
        }
    }

    fn closed() -> Self {
        Self { closed: true, ..Self::idle() }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("rat_result", &self.rat_result)
            .field("metadata", &self.metadata)
            .field("session", &self.session.as_ref().map(|session| session.id()))
            .field("closed", &self.closed)
            .finish()
    }
}

/// Drives the handshake of one transport session
pub struct SessionAdapter<E: Environment> {
    config: ProtocolConfig,
    env: E,
    service: Arc<dyn MeasurementService>,
    listener: Arc<dyn SessionListener>,
    inner: Mutex<Option<Bound<E>>>,
    status: watch::Sender<Snapshot>,
}

impl<E: Environment> SessionAdapter<E> {
    /// Create an adapter; the machine is built on [`SessionHandler::on_open`]
    pub fn new(
        config: ProtocolConfig,
        env: E,
        service: Arc<dyn MeasurementService>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        let (status, _) = watch::channel(Snapshot::idle());
        Self { config, env, service, listener, inner: Mutex::new(None), status }
    }

    /// Current handshake state
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.status.borrow().state
    }

    /// Outcome of attesting the peer, once known
    #[must_use]
    pub fn attestation_result(&self) -> Option<RatResult> {
        self.status.borrow().rat_result.clone()
    }

    /// Peer self-description, once received
    #[must_use]
    pub fn metadata(&self) -> Option<String> {
        self.status.borrow().metadata.clone()
    }

    /// Whether [`SessionHandler::on_close`] ran since the last open
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status.borrow().closed
    }

    /// Bound transport session, between open and close
    #[must_use]
    pub fn session(&self) -> Option<Arc<dyn TransportSession>> {
        self.status.borrow().session.clone()
    }

    /// Wait until the handshake reaches `End` or `Error`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if the handshake is still running
    /// after `timeout`, or [`SessionError::Closed`] if the session closes
    /// first.
    pub async fn wait_for_completion(
        &self,
        timeout: Duration,
    ) -> Result<ProtocolState, SessionError> {
        let mut status = self.status.subscribe();

        let wait = async {
            loop {
                {
                    let snapshot = status.borrow_and_update();
                    if snapshot.state.is_terminal() {
                        return Ok(snapshot.state);
                    }
                    if snapshot.closed {
                        return Err(SessionError::Closed);
                    }
                }

                if status.changed().await.is_err() {
                    return Err(SessionError::Closed);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout { state: self.state(), waited: timeout }),
        }
    }

    /// Enforce the handshake timeout
    ///
    /// Call periodically from the transport's driver loop.
    pub async fn tick(&self) {
        let mut inner = self.inner.lock().await;
        let Some(bound) = inner.as_mut() else {
            return;
        };

        let actions = bound.machine.tick(self.env.now());
        if actions.is_empty() {
            return;
        }

        self.execute(bound, actions).await;
        self.publish(bound);
    }

    async fn execute(&self, bound: &Bound<E>, actions: Vec<ProtocolAction>) {
        let session_id = bound.session.id();

        for action in actions {
            match action {
                ProtocolAction::SendFrame(frame) => {
                    let bytes = match frame.to_bytes() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!(%session_id, error = %e, "failed to encode frame");
                            continue;
                        },
                    };

                    if let Err(e) = bound.session.send(bytes).await {
                        tracing::warn!(
                            %session_id,
                            remote = %bound.session.remote(),
                            error = %e,
                            "failed to send frame"
                        );
                    }
                },
                ProtocolAction::PassThrough(raw) => {
                    self.listener.on_message(session_id, raw).await;
                },
            }
        }
    }

    fn publish(&self, bound: &Bound<E>) {
        self.status.send_replace(Snapshot {
            state: bound.machine.state(),
            rat_result: bound.machine.rat_result().cloned(),
            metadata: bound.machine.metadata().map(str::to_string),
            session: Some(Arc::clone(&bound.session)),
            closed: false,
        });
    }
}

#[async_trait]
impl<E: Environment> SessionHandler for SessionAdapter<E> {
    async fn on_open(&self, session: Arc<dyn TransportSession>) {
        let mut inner = self.inner.lock().await;

        tracing::debug!(
            session_id = %session.id(),
            remote = %session.remote(),
            role = ?self.config.role,
            "session opened"
        );

        let mut machine =
            ProtocolMachine::new(self.config.clone(), self.env.clone(), Arc::clone(&self.service));
        let actions = machine.start().unwrap_or_else(|e| {
            tracing::warn!(session_id = %session.id(), error = %e, "failed to start handshake");
            Vec::new()
        });

        let bound = inner.insert(Bound { session, machine });
        self.execute(bound, actions).await;
        self.publish(bound);
    }

    async fn on_message(&self, session: SessionId, bytes: Bytes) {
        let mut inner = self.inner.lock().await;

        let Some(bound) = inner.as_mut() else {
            tracing::warn!(session_id = %session, "message for a session that is not open");
            return;
        };

        if bound.session.id() != session {
            tracing::warn!(
                session_id = %session,
                bound = %bound.session.id(),
                "message for a different session"
            );
            return;
        }

        if bound.machine.state().is_terminal() {
            self.listener.on_message(session, bytes).await;
            return;
        }

        let event = Event::from_bytes(bytes);
        tracing::debug!(
            session_id = %session,
            message_type = ?event.message_type(),
            len = event.raw().len(),
            "frame received"
        );

        let actions = bound.machine.feed_event(event).await;
        self.execute(bound, actions).await;
        self.publish(bound);
    }

    async fn on_close(&self, session: SessionId, code: u16, reason: &str) {
        let mut inner = self.inner.lock().await;

        if let Some(mut bound) = inner.take() {
            tracing::info!(
                session_id = %session,
                code,
                reason,
                state = ?bound.machine.state(),
                "session closed"
            );
            bound.machine.reset();
        }

        // Published first: the listener checks `is_closed` before releasing
        self.status.send_replace(Snapshot::closed());
        self.listener.notify_closed(session).await;
    }

    async fn on_error(&self, session: SessionId, error: &(dyn std::error::Error + Send + Sync)) {
        let mut inner = self.inner.lock().await;

        tracing::warn!(session_id = %session, error = %error, "transport error");

        if let Some(bound) = inner.as_mut() {
            bound.machine.reset();
            self.publish(bound);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex as StdMutex, time::Instant};

    use idscp_proto::{
        Payload,
        payloads::session::{Hello, SelfDescription},
    };

    use super::*;
    use crate::attestation::measurement::{
        AttestationRequest, AttestationResponse, MeasurementError,
    };

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Self::Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }
    }

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

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<Bytes>>,
        passed: StdMutex<Vec<Bytes>>,
        closed: StdMutex<Vec<SessionId>>,
    }

    struct Session(Arc<Recorder>);

    #[async_trait]
    impl TransportSession for Session {
        fn id(&self) -> SessionId {
            SessionId(1)
        }

        fn remote(&self) -> String {
            "test".into()
        }

        async fn send(&self, bytes: Bytes) -> io::Result<()> {
            self.0.sent.lock().unwrap().push(bytes);
            Ok(())
        }
    }

    #[async_trait]
    impl SessionListener for Recorder {
        async fn on_message(&self, _session: SessionId, bytes: Bytes) {
            self.passed.lock().unwrap().push(bytes);
        }

        async fn notify_closed(&self, session: SessionId) {
            self.closed.lock().unwrap().push(session);
        }
    }

    fn adapter() -> (SessionAdapter<TestEnv>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let adapter = SessionAdapter::new(
            ProtocolConfig::default(),
            TestEnv,
            Arc::new(Unavailable),
            recorder.clone(),
        );
        (adapter, recorder)
    }

    fn frame(payload: Payload) -> Bytes {
        Event::from_payload(payload).unwrap().raw().clone()
    }

    #[tokio::test]
    async fn queries_are_absent_before_open() {
        let (adapter, _) = adapter();

        assert_eq!(adapter.state(), ProtocolState::Hello);
        assert!(adapter.attestation_result().is_none());
        assert!(adapter.metadata().is_none());
        assert!(adapter.session().is_none());
    }

    #[tokio::test]
    async fn error_before_open_is_harmless() {
        let (adapter, _) = adapter();
        let error = io::Error::other("boom");

        adapter.on_error(SessionId(1), &error).await;

        assert_eq!(adapter.state(), ProtocolState::Hello);
    }

    #[tokio::test]
    async fn message_before_open_is_dropped() {
        let (adapter, recorder) = adapter();

        let hello = frame(Payload::Hello(Hello { version: 1, mutual_attestation: false }));
        adapter.on_message(SessionId(1), hello).await;

        assert_eq!(adapter.state(), ProtocolState::Hello);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminal_session_passes_frames_through() {
        let (adapter, recorder) = adapter();
        adapter.on_open(Arc::new(Session(recorder.clone()))).await;

        let early = frame(Payload::Metadata(SelfDescription { document: "early".into() }));
        adapter.on_message(SessionId(1), early).await;
        assert_eq!(adapter.state(), ProtocolState::Error);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);

        let app = frame(Payload::Raw(Bytes::from_static(b"app data")));
        adapter.on_message(SessionId(1), app.clone()).await;

        assert_eq!(*recorder.passed.lock().unwrap(), vec![app]);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_resets_and_notifies() {
        let (adapter, recorder) = adapter();
        adapter.on_open(Arc::new(Session(recorder.clone()))).await;
        adapter
            .on_message(
                SessionId(1),
                frame(Payload::Hello(Hello { version: 1, mutual_attestation: false })),
            )
            .await;
        assert_eq!(adapter.state(), ProtocolState::ChallengeIssued);

        adapter.on_close(SessionId(1), 1000, "bye").await;

        assert_eq!(adapter.state(), ProtocolState::Hello);
        assert!(adapter.session().is_none());
        assert_eq!(*recorder.closed.lock().unwrap(), vec![SessionId(1)]);
        assert_eq!(
            adapter.wait_for_completion(Duration::from_secs(1)).await,
            Err(SessionError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_mid_handshake() {
        let (adapter, recorder) = adapter();
        adapter.on_open(Arc::new(Session(recorder))).await;

        let result = adapter.wait_for_completion(Duration::from_secs(2)).await;

        assert_eq!(
            result,
            Err(SessionError::Timeout {
                state: ProtocolState::Hello,
                waited: Duration::from_secs(2),
            })
        );
    }
}
