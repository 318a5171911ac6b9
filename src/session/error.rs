use crate::net::connection::ConnectionId;
use crate::session::role::EntityId;

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Admission refused; the connection has been closed
    #[error("Capacity exceeded ({current}/{max} connections)")]
    CapacityExceeded { current: usize, max: usize },
    /// Transition attempted on a connection that is no longer valid
    #[error("Stale connection: {0}")]
    StaleConnection(ConnectionId),
    /// Operation called in a state that does not allow it
    #[error("Precondition violated: {0}")]
    PreconditionViolation(&'static str),
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),
}

impl SessionError {
    /// Recoverable errors leave the session untouched and need no operator attention
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SessionError::PreconditionViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SessionError::CapacityExceeded { current: 16, max: 16 };
        assert_eq!(err.to_string(), "Capacity exceeded (16/16 connections)");

        let err = SessionError::StaleConnection(ConnectionId(3));
        assert_eq!(err.to_string(), "Stale connection: conn#3");
    }

    #[test]
    fn test_recoverable() {
        assert!(SessionError::StaleConnection(ConnectionId(1)).is_recoverable());
        assert!(SessionError::CapacityExceeded { current: 1, max: 1 }.is_recoverable());
        assert!(!SessionError::PreconditionViolation("no server").is_recoverable());
    }
}
