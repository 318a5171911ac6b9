//! Role entities: the connection-bound participant objects.
//!
//! A connection holds exactly one of three roles at a time. The variant tag
//! doubles as the back-reference to the store partition holding the entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::game::world::{Transform, WorldHandle};
use crate::net::connection::ConnectionId;

/// Unique id of a role entity
pub type EntityId = Uuid;

/// Role variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    WaitingRoom,
    Loading,
    Active,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::WaitingRoom => "waiting-room",
            RoleKind::Loading => "loading",
            RoleKind::Active => "active",
        };
        f.write_str(name)
    }
}

/// Participant sitting in the waiting room
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingRoomParticipant {
    pub id: EntityId,
    pub connection: ConnectionId,
    pub world: WorldHandle,
    pub is_ready: bool,
    pub is_party_leader: bool,
    /// Last readiness result pushed to this participant's UI
    pub can_start: bool,
}

impl WaitingRoomParticipant {
    pub fn new(connection: ConnectionId, world: WorldHandle, is_party_leader: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            world,
            is_ready: false,
            is_party_leader,
            can_start: false,
        }
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.is_ready = ready;
    }
}

/// Participant loading level content
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingParticipant {
    pub id: EntityId,
    pub connection: ConnectionId,
    pub world: WorldHandle,
    pub is_loaded: bool,
}

impl LoadingParticipant {
    pub fn new(connection: ConnectionId, world: WorldHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            world,
            is_loaded: false,
        }
    }
}

/// Participant live in the world
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveParticipant {
    pub id: EntityId,
    pub connection: ConnectionId,
    pub world: WorldHandle,
    pub transform: Transform,
}

impl ActiveParticipant {
    pub fn new(connection: ConnectionId, world: WorldHandle, transform: Transform) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            world,
            transform,
        }
    }
}

/// A connection-bound entity in one of the three roles
#[derive(Debug, Clone, PartialEq)]
pub enum RoleEntity {
    WaitingRoom(WaitingRoomParticipant),
    Loading(LoadingParticipant),
    Active(ActiveParticipant),
}

impl RoleEntity {
    pub fn id(&self) -> EntityId {
        match self {
            RoleEntity::WaitingRoom(p) => p.id,
            RoleEntity::Loading(p) => p.id,
            RoleEntity::Active(p) => p.id,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        match self {
            RoleEntity::WaitingRoom(p) => p.connection,
            RoleEntity::Loading(p) => p.connection,
            RoleEntity::Active(p) => p.connection,
        }
    }

    pub fn world(&self) -> WorldHandle {
        match self {
            RoleEntity::WaitingRoom(p) => p.world,
            RoleEntity::Loading(p) => p.world,
            RoleEntity::Active(p) => p.world,
        }
    }

    /// Partition this entity belongs to
    pub fn kind(&self) -> RoleKind {
        match self {
            RoleEntity::WaitingRoom(_) => RoleKind::WaitingRoom,
            RoleEntity::Loading(_) => RoleKind::Loading,
            RoleEntity::Active(_) => RoleKind::Active,
        }
    }

    pub fn is_party_leader(&self) -> bool {
        matches!(self, RoleEntity::WaitingRoom(p) if p.is_party_leader)
    }
}

impl From<WaitingRoomParticipant> for RoleEntity {
    fn from(participant: WaitingRoomParticipant) -> Self {
        RoleEntity::WaitingRoom(participant)
    }
}

impl From<LoadingParticipant> for RoleEntity {
    fn from(participant: LoadingParticipant) -> Self {
        RoleEntity::Loading(participant)
    }
}

impl From<ActiveParticipant> for RoleEntity {
    fn from(participant: ActiveParticipant) -> Self {
        RoleEntity::Active(participant)
    }
}
