//! IDSCP handshake core logic
//!
//! This crate drives the attested handshake between two connectors: a
//! challenge/response remote attestation against a local measurement service,
//! a self-description exchange, and finally the switch into pass-through mode
//! where application frames bypass the protocol engine.
//!
//! # Architecture: "The Hollow Shell"
//!
//! Protocol logic is separated from transport concerns:
//!
//! ```text
//!      ┌──────────────────────────────┐
//!      │ idscp-core                   │
//!      │ - Handshake state machine    │
//!      │ - Attestation coordinator    │
//!      │ - Session adapter / registry │
//!      └──────────────────────────────┘
//!         ↓                      ↓
//! ┌─────────────────┐  ┌──────────────────┐
//! │ idscp-harness   │  │ embedding server │
//! │ (Turmoil)       │  │ (Tokio)          │
//! │ - Virtual time  │  │ - Real network   │
//! │ - Seeded RNG    │  │ - tpmd socket    │
//! │ - Sim measuring │  │ - System clock   │
//! └─────────────────┘  └──────────────────┘
//! ```
//!
//! The state machine never writes to the network. Every transition returns
//! [`machine::ProtocolAction`]s which the [`session::SessionAdapter`]
//! executes against its [`transport::TransportSession`].
//!
//! # Modules
//!
//! - [`machine`]: Handshake state machine
//! - [`attestation`]: Attestation coordinator, verdicts, measurement service
//! - [`session`]: Session adapter (locking, lifecycle, completion waits)
//! - [`registry`]: Session registry and pass-through listener
//! - [`event`]: Inbound events decoded from raw frames
//! - [`config`]: Handshake configuration
//! - [`env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport boundary traits
//! - [`error`]: Handshake and session error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod attestation;
pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod machine;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::{ProtocolConfig, Role};
pub use event::Event;
pub use machine::{ProtocolAction, ProtocolMachine, ProtocolState};
pub use registry::{PassThroughMessage, SessionRegistry};
pub use session::{SessionAdapter, SessionHandler};
pub use transport::{SessionId, SessionListener, TransportSession};
