//! Scenario builder API.
//!
//! Provides a declarative API for constructing handshake scenarios that
//! enforce the oracle pattern.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use idscp_core::{
    Event, ProtocolConfig, Role, SessionAdapter, SessionHandler, SessionRegistry,
    transport::{SessionId, TransportSession},
};
use idscp_proto::payloads::attestation::PropertyMask;
use tokio::sync::mpsc;

use crate::{
    Behavior, ChannelSession, SimEnv, SimMeasurementService,
    scenario::{Delivery, OracleFn, Side, World},
    sim_measurement::platform_values,
};

const INITIATOR_SESSION: SessionId = SessionId(0x1000);
const ACCEPTOR_SESSION: SessionId = SessionId(0x2000);

/// Configuration both simulated connectors start from
///
/// Basic attestation, with reference values equal to what an honest
/// [`SimMeasurementService`] reports.
pub fn sim_config(role: Role) -> ProtocolConfig {
    ProtocolConfig {
        expected_measurements: platform_values(PropertyMask::BASIC_SET),
        self_description: format!("{role:?} connector").to_lowercase(),
        ..ProtocolConfig::default().with_role(role)
    }
}

/// Scenario builder.
///
/// Configure both connectors and their measurement services, optionally
/// queue application frames, then add an oracle.
pub struct Scenario {
    initiator_config: ProtocolConfig,
    acceptor_config: ProtocolConfig,
    initiator_behavior: Behavior,
    acceptor_behavior: Behavior,
    seed: u64,
    wait: Duration,
    application_frames: Vec<Bytes>,
}

impl Scenario {
    /// Honest one-way handshake with default configuration.
    pub fn new() -> Self {
        Self {
            initiator_config: sim_config(Role::Initiator),
            acceptor_config: sim_config(Role::Acceptor),
            initiator_behavior: Behavior::Honest,
            acceptor_behavior: Behavior::Honest,
            seed: 0,
            wait: Duration::from_secs(60),
            application_frames: Vec::new(),
        }
    }

    /// Ask for mutual attestation.
    pub fn mutual(mut self) -> Self {
        self.initiator_config.mutual_attestation = true;
        self
    }

    /// Adjust the initiator's configuration.
    pub fn with_initiator_config(mut self, f: impl FnOnce(&mut ProtocolConfig)) -> Self {
        f(&mut self.initiator_config);
        self
    }

    /// Adjust the acceptor's configuration.
    pub fn with_acceptor_config(mut self, f: impl FnOnce(&mut ProtocolConfig)) -> Self {
        f(&mut self.acceptor_config);
        self
    }

    /// Behavior of the initiator's measurement service.
    pub fn with_initiator_behavior(mut self, behavior: Behavior) -> Self {
        self.initiator_behavior = behavior;
        self
    }

    /// Behavior of the acceptor's measurement service.
    pub fn with_acceptor_behavior(mut self, behavior: Behavior) -> Self {
        self.acceptor_behavior = behavior;
        self
    }

    /// Seed for the shared simulation RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// How long (virtual time) to wait for each connector to settle.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Write `frame` from the initiator's transport once both connectors
    /// settled, whatever the outcome.
    pub fn then_send(mut self, frame: Bytes) -> Self {
        self.application_frames.push(frame);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory; a scenario cannot run without verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario on a fresh single-threaded runtime with a paused
    /// clock.
    ///
    /// 1. The acceptor registry accepts its session, the initiator registry
    ///    connects and sends `Hello`.
    /// 2. Frames are relayed between the two until both connectors settle or
    ///    the wait runs out.
    /// 3. Queued application frames are written from the initiator side.
    /// 4. The oracle is invoked on the resulting world.
    ///
    /// # Errors
    ///
    /// Returns the oracle's message if verification fails, or a description
    /// of the runtime failure.
    pub fn run(self) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .map_err(|e| format!("failed to build runtime: {e}"))?;

        let world = runtime.block_on(self.scenario.execute());
        (self.oracle)(&world)
    }
}

impl Scenario {
    async fn execute(self) -> World {
        crate::init_tracing();

        let env = SimEnv::with_seed(self.seed);
        let initiator_service = Arc::new(SimMeasurementService::new(self.initiator_behavior));
        let acceptor_service = Arc::new(SimMeasurementService::new(self.acceptor_behavior));

        let (initiator_registry, _initiator_pass_through) = SessionRegistry::new(
            self.initiator_config,
            env.clone(),
            initiator_service.clone(),
            16,
        );
        let (acceptor_registry, mut acceptor_pass_through) =
            SessionRegistry::new(self.acceptor_config, env, acceptor_service.clone(), 16);

        let ((initiator_session, from_initiator), (acceptor_session, from_acceptor)) =
            ChannelSession::pair(INITIATOR_SESSION, ACCEPTOR_SESSION);
        let log = Arc::new(Mutex::new(Vec::new()));

        let acceptor = acceptor_registry.accept(acceptor_session).await;
        tokio::spawn(relay(
            from_initiator,
            acceptor.clone(),
            ACCEPTOR_SESSION,
            Side::Initiator,
            log.clone(),
        ));

        let initiator = initiator_registry.connect(initiator_session.clone()).await;
        tokio::spawn(relay(
            from_acceptor,
            initiator.clone(),
            INITIATOR_SESSION,
            Side::Acceptor,
            log.clone(),
        ));

        let initiator_outcome = initiator.wait_for_completion(self.wait).await;
        let acceptor_outcome = acceptor.wait_for_completion(self.wait).await;

        for frame in self.application_frames {
            if let Err(e) = initiator_session.send(frame).await {
                tracing::warn!(error = %e, "application frame not sent");
            }
        }

        let mut pass_through = Vec::new();
        while let Ok(Some(message)) =
            tokio::time::timeout(Duration::from_millis(100), acceptor_pass_through.recv()).await
        {
            pass_through.push(message);
        }

        let deliveries = std::mem::take(&mut *log.lock().unwrap_or_else(PoisonError::into_inner));

        World {
            initiator,
            acceptor,
            initiator_service,
            acceptor_service,
            initiator_outcome,
            acceptor_outcome,
            deliveries,
            pass_through,
        }
    }
}

/// Relay frames sent by one connector to the other, logging each
async fn relay(
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    to: Arc<SessionAdapter<SimEnv>>,
    session: SessionId,
    from: Side,
    log: Arc<Mutex<Vec<Delivery>>>,
) {
    while let Some(bytes) = frames.recv().await {
        let message_type = Event::from_bytes(bytes.clone()).message_type();
        log.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery { from, message_type, bytes: bytes.clone() });

        to.on_message(session, bytes).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::oracle;

    #[test]
    fn scenario_requires_oracle() {
        let _scenario = Scenario::new().oracle(Box::new(|_world| Ok(())));
    }

    #[test]
    fn default_scenario_completes() {
        Scenario::new().oracle(oracle::both_completed()).run().expect("scenario should succeed");
    }

    #[test]
    fn failing_oracle_fails_the_run() {
        let result = Scenario::new().oracle(Box::new(|_world| Err("nope".to_string()))).run();

        assert_eq!(result, Err("nope".to_string()));
    }
}
