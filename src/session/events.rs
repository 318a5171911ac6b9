use crate::net::connection::ConnectionId;
use crate::session::status::SessionStatus;

/// Notifications published to UI and loading-screen code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ParticipantConnected(ConnectionId),
    ParticipantDisconnected(ConnectionId),
    StatusChanged { from: SessionStatus, to: SessionStatus },
    ReadyStateChanged { ready_to_load: bool },
    /// Level content finished loading on this process
    LevelLoadComplete,
}
