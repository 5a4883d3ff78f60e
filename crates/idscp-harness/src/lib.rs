//! Deterministic simulation harness for IDSCP handshake testing.
//!
//! This crate provides simulated implementations of the boundaries the
//! handshake core depends on, so that whole handshakes can be replayed
//! deterministically:
//!
//! - [`SimEnv`]: virtual time and a seeded RNG
//! - [`SimMeasurementService`]: a measurement service with scripted
//!   behaviors (honest, silent, broken, tampering)
//! - [`sim_transport`]: in-memory channel sessions and Turmoil TCP sessions
//! - [`scenario`]: a declarative two-connector handshake runner that enforces
//!   the oracle pattern

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_measurement;
pub mod sim_transport;

pub use sim_env::SimEnv;
pub use sim_measurement::{Behavior, SimMeasurementService};
pub use sim_transport::{ChannelSession, SimTransport, TcpSession};

/// Install a `tracing` subscriber for tests
///
/// Honors `RUST_LOG` and writes through the test writer, so output only
/// shows for failing tests. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
