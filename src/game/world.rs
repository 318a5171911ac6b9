//! World-entity collaborator: creates and destroys the world-visible
//! object behind each role entity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::net::connection::ConnectionId;
use crate::session::role::RoleKind;
use crate::util::vec3::Vec3;

/// Position and euler rotation of an active participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Opaque handle to a spawned world object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldHandle(pub u64);

impl fmt::Display for WorldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Spawns and despawns role objects
pub trait World: Send + Sync {
    /// Instantiate the object for a role owned by `connection`
    fn instantiate(&mut self, role: RoleKind, connection: ConnectionId) -> WorldHandle;

    /// Destroy a previously instantiated object. Unknown handles are ignored.
    fn destroy(&mut self, handle: WorldHandle);
}

#[derive(Debug, Clone, Copy)]
struct SpawnedObject {
    role: RoleKind,
    owner: ConnectionId,
}

/// In-process object table
#[derive(Debug, Default)]
pub struct WorldRegistry {
    objects: HashMap<WorldHandle, SpawnedObject>,
    next_handle: u64,
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_live(&self, handle: WorldHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Live objects owned by a connection
    pub fn owned_by(&self, connection: ConnectionId) -> usize {
        self.objects.values().filter(|obj| obj.owner == connection).count()
    }
}

impl World for WorldRegistry {
    fn instantiate(&mut self, role: RoleKind, connection: ConnectionId) -> WorldHandle {
        self.next_handle += 1;
        let handle = WorldHandle(self.next_handle);
        self.objects.insert(handle, SpawnedObject { role, owner: connection });
        debug!("Spawned {} for {} ({:?})", handle, connection, role);
        handle
    }

    fn destroy(&mut self, handle: WorldHandle) {
        match self.objects.remove(&handle) {
            Some(obj) => debug!("Despawned {} for {} ({:?})", handle, obj.owner, obj.role),
            None => warn!("Destroy requested for unknown {}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_unique_handles() {
        let mut world = WorldRegistry::new();
        let a = world.instantiate(RoleKind::WaitingRoom, ConnectionId(1));
        let b = world.instantiate(RoleKind::Loading, ConnectionId(1));

        assert_ne!(a, b);
        assert_eq!(world.live_count(), 2);
        assert_eq!(world.owned_by(ConnectionId(1)), 2);
    }

    #[test]
    fn test_destroy() {
        let mut world = WorldRegistry::new();
        let handle = world.instantiate(RoleKind::Active, ConnectionId(7));

        world.destroy(handle);
        assert!(!world.is_live(handle));
        assert_eq!(world.live_count(), 0);

        // Second destroy is ignored
        world.destroy(handle);
        assert_eq!(world.live_count(), 0);
    }
}
