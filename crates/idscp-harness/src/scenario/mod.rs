//! Scenario testing framework for deterministic handshake tests.
//!
//! A scenario wires an initiator and an acceptor connector back to back over
//! in-memory sessions, runs the handshake on a paused Tokio clock, and then
//! hands the resulting [`World`] to a mandatory oracle.
//!
//! ```ignore
//! Scenario::new()
//!     .with_initiator_behavior(Behavior::Tampered)
//!     .oracle(oracle::acceptor_rejected(FailureReason::MeasurementMismatch))
//!     .run()?;
//! ```

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario, sim_config};
pub use oracle::OracleFn;
pub use world::{Delivery, Side, World};
