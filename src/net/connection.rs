use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::session::role::EntityId;

/// Transport-assigned connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted, waiting for the peer to signal readiness
    Connecting,
    /// Peer is ready; a role entity may be bound
    Ready,
    /// Transport reported the peer gone
    Disconnected,
}

/// Admitted connection and its current role binding
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    pub state: ConnectionState,
    /// Role entity currently bound to this connection
    pub bound_entity: Option<EntityId>,
}

impl Connection {
    pub fn new(id: ConnectionId, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            remote_addr,
            state: ConnectionState::Connecting,
            bound_entity: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Still usable for binding or transitions
    pub fn is_valid(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }
}

/// Registry of admitted connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection. Re-admitting an existing id returns false.
    pub fn admit(&mut self, id: ConnectionId, remote_addr: Option<SocketAddr>) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(id, Connection::new(id, remote_addr));
        true
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(|conn| conn.state)
    }

    /// Mark the peer as ready. Returns false for unknown or dead connections.
    pub fn mark_ready(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.is_valid() => {
                conn.state = ConnectionState::Ready;
                true
            }
            _ => false,
        }
    }

    /// True if the connection exists and has not disconnected
    pub fn is_valid(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).is_some_and(Connection::is_valid)
    }

    /// Entity currently bound to a connection
    pub fn bound_entity(&self, id: ConnectionId) -> Option<EntityId> {
        self.connections.get(&id).and_then(|conn| conn.bound_entity)
    }

    /// Bind an entity, returning the previously bound one
    pub fn bind(&mut self, id: ConnectionId, entity: EntityId) -> Option<EntityId> {
        self.connections
            .get_mut(&id)
            .and_then(|conn| conn.bound_entity.replace(entity))
    }

    /// Clear the binding of a connection
    pub fn unbind(&mut self, id: ConnectionId) -> Option<EntityId> {
        self.connections
            .get_mut(&id)
            .and_then(|conn| conn.bound_entity.take())
    }

    /// Remove a connection
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id).map(|mut conn| {
            conn.state = ConnectionState::Disconnected;
            conn
        })
    }

    /// Get connection count
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Get all connection IDs, sorted for deterministic fan-out
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Connections that are ready but have no bound entity
    pub fn unbound_ready(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|conn| conn.is_ready() && conn.bound_entity.is_none())
            .map(|conn| conn.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every connection, returning their ids
    pub fn drain(&mut self) -> Vec<ConnectionId> {
        let ids = self.ids();
        self.connections.clear();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use uuid::Uuid;

    fn test_addr() -> Option<SocketAddr> {
        Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080))
    }

    #[test]
    fn test_connection_new() {
        let conn = Connection::new(ConnectionId(1), test_addr());
        assert_eq!(conn.id, ConnectionId(1));
        assert_eq!(conn.state, ConnectionState::Connecting);
        assert!(conn.bound_entity.is_none());
        assert!(conn.is_valid());
        assert!(!conn.is_ready());
    }

    #[test]
    fn test_admit_twice() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.admit(ConnectionId(1), test_addr()));
        assert!(!registry.admit(ConnectionId(1), test_addr()));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_mark_ready() {
        let mut registry = ConnectionRegistry::new();
        registry.admit(ConnectionId(1), None);

        assert!(registry.mark_ready(ConnectionId(1)));
        assert_eq!(registry.state(ConnectionId(1)), Some(ConnectionState::Ready));
        assert!(!registry.mark_ready(ConnectionId(2)));
    }

    #[test]
    fn test_bind_replaces() {
        let mut registry = ConnectionRegistry::new();
        registry.admit(ConnectionId(1), None);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(registry.bind(ConnectionId(1), first), None);
        assert_eq!(registry.bind(ConnectionId(1), second), Some(first));
        assert_eq!(registry.bound_entity(ConnectionId(1)), Some(second));

        assert_eq!(registry.unbind(ConnectionId(1)), Some(second));
        assert_eq!(registry.bound_entity(ConnectionId(1)), None);
    }

    #[test]
    fn test_remove_invalidates() {
        let mut registry = ConnectionRegistry::new();
        registry.admit(ConnectionId(3), None);

        let removed = registry.remove(ConnectionId(3)).unwrap();
        assert_eq!(removed.state, ConnectionState::Disconnected);
        assert!(!registry.is_valid(ConnectionId(3)));
        assert!(registry.remove(ConnectionId(3)).is_none());
    }

    #[test]
    fn test_unbound_ready() {
        let mut registry = ConnectionRegistry::new();
        registry.admit(ConnectionId(2), None);
        registry.admit(ConnectionId(1), None);
        registry.admit(ConnectionId(3), None);
        registry.mark_ready(ConnectionId(1));
        registry.mark_ready(ConnectionId(2));
        registry.bind(ConnectionId(2), Uuid::new_v4());

        assert_eq!(registry.unbound_ready(), vec![ConnectionId(1)]);
    }

    #[test]
    fn test_drain() {
        let mut registry = ConnectionRegistry::new();
        registry.admit(ConnectionId(2), None);
        registry.admit(ConnectionId(1), None);

        assert_eq!(registry.drain(), vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(registry.count(), 0);
    }
}
