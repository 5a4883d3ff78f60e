//! World state for scenario execution.
//!
//! One initiator and one acceptor, each owned by its own session registry,
//! plus everything observed on the simulated wire.

use std::sync::Arc;

use bytes::Bytes;
use idscp_core::{PassThroughMessage, ProtocolState, SessionAdapter, error::SessionError};
use idscp_proto::MessageType;

use crate::{SimEnv, SimMeasurementService};

/// Which connector sent a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The connector that opened the channel
    Initiator,
    /// The connector that accepted it
    Acceptor,
}

/// One frame delivered across the simulated wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sender
    pub from: Side,
    /// Type read from the frame header (`Error` if it did not decode)
    pub message_type: MessageType,
    /// Frame bytes as sent
    pub bytes: Bytes,
}

/// World state after a scenario ran
pub struct World {
    pub(crate) initiator: Arc<SessionAdapter<SimEnv>>,
    pub(crate) acceptor: Arc<SessionAdapter<SimEnv>>,
    pub(crate) initiator_service: Arc<SimMeasurementService>,
    pub(crate) acceptor_service: Arc<SimMeasurementService>,
    pub(crate) initiator_outcome: Result<ProtocolState, SessionError>,
    pub(crate) acceptor_outcome: Result<ProtocolState, SessionError>,
    pub(crate) deliveries: Vec<Delivery>,
    pub(crate) pass_through: Vec<PassThroughMessage>,
}

impl World {
    /// Initiator's session adapter
    pub fn initiator(&self) -> &SessionAdapter<SimEnv> {
        &self.initiator
    }

    /// Acceptor's session adapter
    pub fn acceptor(&self) -> &SessionAdapter<SimEnv> {
        &self.acceptor
    }

    /// Initiator's measurement service
    pub fn initiator_service(&self) -> &SimMeasurementService {
        &self.initiator_service
    }

    /// Acceptor's measurement service
    pub fn acceptor_service(&self) -> &SimMeasurementService {
        &self.acceptor_service
    }

    /// What the initiator's completion wait returned
    pub fn initiator_outcome(&self) -> &Result<ProtocolState, SessionError> {
        &self.initiator_outcome
    }

    /// What the acceptor's completion wait returned
    pub fn acceptor_outcome(&self) -> &Result<ProtocolState, SessionError> {
        &self.acceptor_outcome
    }

    /// Every frame delivered, in delivery order
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Message types sent by `side`, in order
    pub fn sent_by(&self, side: Side) -> Vec<MessageType> {
        self.deliveries
            .iter()
            .filter(|delivery| delivery.from == side)
            .map(|delivery| delivery.message_type)
            .collect()
    }

    /// Frames the acceptor passed through to its application
    pub fn pass_through(&self) -> &[PassThroughMessage] {
        &self.pass_through
    }
}
