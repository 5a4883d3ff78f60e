//! Handshake state machine.
//!
//! One [`ProtocolMachine`] drives the handshake of one session. It consumes
//! [`Event`]s, delegates the attestation phase to the
//! [`AttestationCoordinator`], and returns [`ProtocolAction`]s for the driver
//! to execute. It never touches the transport.
//!
//! # State Machine
//!
//! Acceptor (verifies the initiator first):
//!
//! ```text
//! ┌───────┐ Hello  ┌─────────────────┐ Response ┌──────────┐ Metadata ┌─────┐
//! │ Hello │───────>│ ChallengeIssued │─────────>│ Metadata │─────────>│ End │
//! └───────┘        └─────────────────┘ (pass)   └──────────┘          └─────┘
//!                           │ (pass, mutual)          ↑
//!                           ↓                         │ Result (pass)
//!                  ┌──────────────────┐ Challenge ┌────────────────┐
//!                  │ ResponseReceived │──────────>│ VerdictPending │
//!                  └──────────────────┘           └────────────────┘
//! ```
//!
//! Initiator (after [`ProtocolMachine::start`] sent `Hello`):
//!
//! ```text
//! ┌───────┐ Challenge ┌────────────────┐ Result (pass) ┌──────────┐ Metadata ┌─────┐
//! │ Hello │──────────>│ VerdictPending │──────────────>│ Metadata │─────────>│ End │
//! └───────┘           └────────────────┘               └──────────┘          └─────┘
//!                             │ Result (pass, mutual)        ↑
//!                             ↓                              │ Response (pass)
//!                     ┌─────────────────┐                    │
//!                     │ ChallengeIssued │────────────────────┘
//!                     └─────────────────┘
//! ```
//!
//! Any other (state, message) pair, an `Error` from the peer, an undecodable
//! frame, a failed attestation or the handshake timeout moves the machine to
//! `Error`.
//!
//! # Invariants
//!
//! - **Fail Closed**: Every (state, message) pair not in the tables above
//!   ends in `Error`. There is no ignore path.
//! - **Terminal States**: `End` and `Error` only loop back to themselves.
//!   Every event they receive is returned as
//!   [`ProtocolAction::PassThrough`] with its raw bytes.
//! - **One Reply On Failure**: A locally detected failure sends exactly one
//!   frame (an `Error`, or a failing `AttestationResult`). A failure reported
//!   by the peer is never answered.
//! - **Set Once**: The attestation result and peer metadata are written at
//!   most once per handshake and only cleared by [`ProtocolMachine::reset`].

use std::sync::Arc;

use bytes::Bytes;
use idscp_proto::{
    Frame, FrameHeader, MessageType, Payload,
    payloads::{
        attestation::{AttestationChallenge, AttestationResponse, AttestationResult, Verdict},
        session::{Hello, SelfDescription},
    },
};

use crate::{
    attestation::{AttestationCoordinator, RatResult, measurement::MeasurementService},
    config::{ProtocolConfig, Role},
    env::Environment,
    error::HandshakeError,
    event::Event,
};

/// Actions returned by the state machine.
///
/// The driver (session adapter or test harness) executes these in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Hand these raw bytes to the pass-through listener
    PassThrough(Bytes),
}

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// Initial state, waiting for the handshake to start
    Hello,
    /// Our challenge is out, waiting for the peer's evidence
    ChallengeIssued,
    /// Peer verified, waiting for the peer's challenge (acceptor, mutual)
    ResponseReceived,
    /// Our evidence is out, waiting for the peer's verdict
    VerdictPending,
    /// Attestation done, exchanging self-descriptions
    Metadata,
    /// Handshake complete, channel is pass-through
    End,
    /// Handshake failed, channel is pass-through
    Error,
}

impl ProtocolState {
    /// Whether this state is terminal (`End` or `Error`)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::Error)
    }
}

/// Handshake state machine for one session
///
/// Not internally synchronized; the session adapter serializes access.
pub struct ProtocolMachine<E: Environment> {
    state: ProtocolState,
    config: ProtocolConfig,
    env: E,
    coordinator: AttestationCoordinator<E>,
    /// Whether both sides attest (initiator's request, honored by acceptor)
    mutual: bool,
    /// Initiator: whether `Hello` went out
    hello_sent: bool,
    rat_result: Option<RatResult>,
    metadata: Option<String>,
    last_event: Option<Event>,
    started_at: Option<E::Instant>,
    next_sequence: u32,
}

impl<E: Environment> ProtocolMachine<E> {
    /// Create a machine in [`ProtocolState::Hello`]
    pub fn new(config: ProtocolConfig, env: E, service: Arc<dyn MeasurementService>) -> Self {
        let coordinator = AttestationCoordinator::new(
            env.clone(),
            service,
            config.expected_measurements.clone(),
            config.measurement_timeout,
        );

        Self {
            state: ProtocolState::Hello,
            config,
            env,
            coordinator,
            mutual: false,
            hello_sent: false,
            rat_result: None,
            metadata: None,
            last_event: None,
            started_at: None,
            next_sequence: 0,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Configured role
    #[must_use]
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Whether this handshake attests both sides
    #[must_use]
    pub fn is_mutual(&self) -> bool {
        self.mutual
    }

    /// Outcome of attesting the peer, once known
    ///
    /// One-way initiators never verify the acceptor and report `None`.
    #[must_use]
    pub fn rat_result(&self) -> Option<&RatResult> {
        self.rat_result.as_ref()
    }

    /// Peer self-description, once received
    #[must_use]
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    /// Most recent event, kept for diagnostics
    #[must_use]
    pub fn last_event(&self) -> Option<&Event> {
        self.last_event.as_ref()
    }

    /// Initiator: open the handshake by sending `Hello`
    ///
    /// Acceptors wait for the peer and get no actions.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidState`] if the handshake already
    /// started, or [`HandshakeError::Codec`] if `Hello` cannot be encoded.
    pub fn start(&mut self) -> Result<Vec<ProtocolAction>, HandshakeError> {
        if self.config.role == Role::Acceptor {
            return Ok(Vec::new());
        }

        if self.state != ProtocolState::Hello || self.hello_sent {
            return Err(HandshakeError::InvalidState { state: self.state, operation: "start" });
        }

        let hello =
            Hello { version: Hello::VERSION, mutual_attestation: self.config.mutual_attestation };
        let action = self.send(Payload::Hello(hello))?;

        self.mutual = self.config.mutual_attestation;
        self.hello_sent = true;
        self.started_at = Some(self.env.now());

        tracing::debug!(mutual = self.mutual, "sent hello");

        Ok(vec![action])
    }

    /// Feed one inbound event and return the actions it produced
    ///
    /// Never fails: an event that cannot be validated moves the machine to
    /// [`ProtocolState::Error`] and the cause is logged.
    pub async fn feed_event(&mut self, event: Event) -> Vec<ProtocolAction> {
        if self.state.is_terminal() {
            let raw = event.raw().clone();
            self.last_event = Some(event);
            return vec![ProtocolAction::PassThrough(raw)];
        }

        if self.started_at.is_none() {
            self.started_at = Some(self.env.now());
        }

        let from = self.state;
        let result = self.transition(&event).await;
        let message_type = event.message_type();
        self.last_event = Some(event);

        match result {
            Ok(actions) => {
                tracing::debug!(?from, to = ?self.state, ?message_type, "handshake transition");
                if self.state == ProtocolState::End {
                    tracing::info!(
                        role = ?self.config.role,
                        mutual = self.mutual,
                        "handshake complete"
                    );
                }
                actions
            },
            Err(err) => self.fail(err),
        }
    }

    /// Check the handshake timeout
    ///
    /// Call periodically. A handshake still running `handshake_timeout` after
    /// its first message fails with a `HandshakeTimeout` error frame.
    pub fn tick(&mut self, now: E::Instant) -> Vec<ProtocolAction> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        let Some(started_at) = self.started_at else {
            return Vec::new();
        };

        let elapsed = now - started_at;
        if elapsed > self.config.handshake_timeout {
            return self.fail(HandshakeError::Timeout { elapsed });
        }

        Vec::new()
    }

    /// Return to [`ProtocolState::Hello`] and forget the handshake
    ///
    /// Drops the pending challenge, the attestation result, the peer metadata
    /// and the last event. Safe from any state.
    pub fn reset(&mut self) {
        self.state = ProtocolState::Hello;
        self.coordinator.reset();
        self.mutual = false;
        self.hello_sent = false;
        self.rat_result = None;
        self.metadata = None;
        self.last_event = None;
        self.started_at = None;
        self.next_sequence = 0;
    }

    async fn transition(&mut self, event: &Event) -> Result<Vec<ProtocolAction>, HandshakeError> {
        if let Some(err) = event.decode_error() {
            return Err(HandshakeError::MalformedFrame(err.clone()));
        }

        match (self.config.role, self.state, event.payload()) {
            (_, _, Payload::Error(error)) => Err(HandshakeError::PeerError {
                code: error.code,
                message: error.message.clone(),
            }),

            (Role::Acceptor, ProtocolState::Hello, Payload::Hello(hello)) => {
                self.accept_hello(hello)
            },
            (Role::Acceptor, ProtocolState::ChallengeIssued, Payload::AttestationResponse(r)) => {
                self.verify_peer(r).await
            },
            (Role::Acceptor, ProtocolState::ResponseReceived, Payload::AttestationChallenge(c)) => {
                self.answer_challenge(c).await
            },
            (Role::Acceptor, ProtocolState::VerdictPending, Payload::AttestationResult(r)) => {
                self.accept_verdict(r)
            },
            (Role::Acceptor, ProtocolState::Metadata, Payload::Metadata(description)) => {
                self.metadata = Some(description.document.clone());
                let reply = self.own_metadata()?;
                self.state = ProtocolState::End;
                Ok(vec![reply])
            },

            (Role::Initiator, ProtocolState::Hello, Payload::AttestationChallenge(c))
                if self.hello_sent =>
            {
                self.answer_challenge(c).await
            },
            (Role::Initiator, ProtocolState::VerdictPending, Payload::AttestationResult(r)) => {
                self.accept_verdict(r)
            },
            (Role::Initiator, ProtocolState::ChallengeIssued, Payload::AttestationResponse(r)) => {
                self.verify_peer(r).await
            },
            (Role::Initiator, ProtocolState::Metadata, Payload::Metadata(description)) => {
                self.metadata = Some(description.document.clone());
                self.state = ProtocolState::End;
                Ok(Vec::new())
            },

            (_, state, payload) => {
                Err(HandshakeError::UnexpectedMessage {
                    state,
                    message_type: payload.message_type(),
                })
            },
        }
    }

    fn accept_hello(&mut self, hello: &Hello) -> Result<Vec<ProtocolAction>, HandshakeError> {
        if hello.version != Hello::VERSION {
            return Err(HandshakeError::UnsupportedVersion(hello.version));
        }

        self.mutual = hello.mutual_attestation;
        let challenge = self.challenge()?;
        self.state = ProtocolState::ChallengeIssued;
        Ok(vec![challenge])
    }

    /// Verify the peer's evidence and report the verdict to it
    async fn verify_peer(
        &mut self,
        response: &AttestationResponse,
    ) -> Result<Vec<ProtocolAction>, HandshakeError> {
        let result = self.coordinator.handle_response(response).await;
        let reason = result.reason;
        self.rat_result = Some(result);

        if let Some(reason) = reason {
            return Err(HandshakeError::AttestationFailed(reason));
        }

        let mut actions = vec![self.send(Payload::AttestationResult(AttestationResult {
            verdict: Verdict::Pass,
            reason: None,
        }))?];

        self.state = match self.config.role {
            Role::Acceptor if self.mutual => ProtocolState::ResponseReceived,
            Role::Acceptor => ProtocolState::Metadata,
            Role::Initiator => {
                actions.push(self.own_metadata()?);
                ProtocolState::Metadata
            },
        };

        Ok(actions)
    }

    /// Quote over the peer's nonce and send the evidence back
    async fn answer_challenge(
        &mut self,
        challenge: &AttestationChallenge,
    ) -> Result<Vec<ProtocolAction>, HandshakeError> {
        let response = self
            .coordinator
            .handle_peer_challenge(challenge)
            .await
            .map_err(HandshakeError::QuoteFailed)?;

        let action = self.send(Payload::AttestationResponse(response))?;
        self.state = ProtocolState::VerdictPending;
        Ok(vec![action])
    }

    /// Act on the peer's verdict over our evidence
    fn accept_verdict(
        &mut self,
        result: &AttestationResult,
    ) -> Result<Vec<ProtocolAction>, HandshakeError> {
        if !result.verdict.is_pass() {
            return Err(HandshakeError::PeerRejected { reason: result.reason.clone() });
        }

        match self.config.role {
            Role::Acceptor => {
                self.state = ProtocolState::Metadata;
                Ok(Vec::new())
            },
            Role::Initiator if self.mutual => {
                let challenge = self.challenge()?;
                self.state = ProtocolState::ChallengeIssued;
                Ok(vec![challenge])
            },
            Role::Initiator => {
                let metadata = self.own_metadata()?;
                self.state = ProtocolState::Metadata;
                Ok(vec![metadata])
            },
        }
    }

    fn challenge(&mut self) -> Result<ProtocolAction, HandshakeError> {
        let challenge = self
            .coordinator
            .begin_attestation(self.config.attestation_type, self.config.property_mask);
        self.send(Payload::AttestationChallenge(challenge))
    }

    fn own_metadata(&mut self) -> Result<ProtocolAction, HandshakeError> {
        let document = self.config.self_description.clone();
        self.send(Payload::Metadata(SelfDescription { document }))
    }

    /// Move to ERROR and build the single reply, if any
    fn fail(&mut self, err: HandshakeError) -> Vec<ProtocolAction> {
        tracing::warn!(
            state = ?self.state,
            role = ?self.config.role,
            error = %err,
            "handshake failed"
        );
        self.state = ProtocolState::Error;

        let reply = match &err {
            HandshakeError::AttestationFailed(_) => self
                .rat_result
                .as_ref()
                .map(|result| Payload::AttestationResult(result.to_wire())),
            other => other.error_payload().map(Payload::Error),
        };

        let Some(reply) = reply else {
            return Vec::new();
        };

        match self.send(reply) {
            Ok(action) => vec![action],
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode failure reply");
                Vec::new()
            },
        }
    }

    /// Frame an outbound payload with the next sequence number
    fn send(&mut self, payload: Payload) -> Result<ProtocolAction, HandshakeError> {
        let message_type: MessageType = payload.message_type();
        let header = FrameHeader::new(message_type).with_sequence(self.next_sequence);
        let frame = payload.into_frame(header)?;

        self.next_sequence = self.next_sequence.wrapping_add(1);
        Ok(ProtocolAction::SendFrame(frame))
    }
}
