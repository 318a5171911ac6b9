use serde::{Deserialize, Serialize};

use crate::game::level::SessionDescriptor;
use crate::session::role::{EntityId, RoleKind};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Transport-level readiness: the client can receive its role entity
    Ready,
    /// Toggle the waiting-room ready flag
    SetReady { ready: bool },
    /// Party leader asks the host to start a session
    RequestStart { level_id: u32, dynamic_placement: bool },
    /// Level content finished loading on the client
    LoadComplete,
    /// Leave the session
    Leave,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Admission refused; the connection is closed after this
    Rejected { reason: String },
    /// The connection's role entity was created or replaced
    RoleAssigned {
        entity: EntityId,
        role: RoleKind,
        is_party_leader: bool,
    },
    /// Waiting-room readiness changed
    ReadyStateChanged { ready_to_load: bool },
    /// Begin loading the described session
    StartSession(SessionDescriptor),
    /// The host closed the waiting room
    LobbyClosed,
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
