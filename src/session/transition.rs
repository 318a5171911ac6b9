//! Player Transition Engine.
//!
//! Replaces a connection's role entity with a fresh entity of another role.
//! The connection stays admitted throughout; only the entity and its world
//! object change.

use tracing::debug;

use crate::game::world::{Transform, World};
use crate::net::connection::ConnectionRegistry;
use crate::session::error::SessionError;
use crate::session::role::{
    ActiveParticipant, EntityId, LoadingParticipant, RoleEntity, RoleKind, WaitingRoomParticipant,
};
use crate::session::store::RoleEntityStore;

/// Role to transition into, with the state the new entity starts with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetRole {
    WaitingRoom { is_party_leader: bool },
    Loading,
    Active { transform: Transform },
}

impl TargetRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            TargetRole::WaitingRoom { .. } => RoleKind::WaitingRoom,
            TargetRole::Loading => RoleKind::Loading,
            TargetRole::Active { .. } => RoleKind::Active,
        }
    }
}

/// Move the connection behind `previous` into `target`, returning the new entity.
///
/// Fails with `StaleConnection` if the connection has disconnected and with
/// `EntityNotFound` if `previous` is in no partition. Nothing is mutated on failure.
pub fn transition(
    registry: &mut ConnectionRegistry,
    store: &mut RoleEntityStore,
    world: &mut dyn World,
    previous: EntityId,
    target: TargetRole,
) -> Result<RoleEntity, SessionError> {
    let old = store
        .get(previous)
        .ok_or(SessionError::EntityNotFound(previous))?;
    let connection = old.connection();

    if !registry.is_valid(connection) {
        return Err(SessionError::StaleConnection(connection));
    }

    let handle = world.instantiate(target.kind(), connection);
    world.destroy(old.world());

    let entity: RoleEntity = match target {
        TargetRole::WaitingRoom { is_party_leader } => {
            WaitingRoomParticipant::new(connection, handle, is_party_leader).into()
        }
        TargetRole::Loading => LoadingParticipant::new(connection, handle).into(),
        TargetRole::Active { transform } => {
            ActiveParticipant::new(connection, handle, transform).into()
        }
    };

    registry.bind(connection, entity.id());
    store.remove(previous);
    store.add(entity.clone());

    debug!(
        "Transitioned {} {} -> {} ({})",
        connection,
        old.kind(),
        entity.kind(),
        entity.id()
    );

    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::WorldRegistry;
    use crate::net::connection::ConnectionId;
    use crate::util::vec3::Vec3;

    struct Fixture {
        registry: ConnectionRegistry,
        store: RoleEntityStore,
        world: WorldRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: ConnectionRegistry::new(),
                store: RoleEntityStore::new(),
                world: WorldRegistry::new(),
            }
        }

        fn seat(&mut self, conn: u64) -> EntityId {
            let connection = ConnectionId(conn);
            self.registry.admit(connection, None);
            self.registry.mark_ready(connection);
            let handle = self.world.instantiate(RoleKind::WaitingRoom, connection);
            let participant = WaitingRoomParticipant::new(connection, handle, false);
            let id = participant.id;
            self.registry.bind(connection, id);
            self.store.add(participant.into());
            id
        }

        fn run(&mut self, previous: EntityId, target: TargetRole) -> Result<RoleEntity, SessionError> {
            transition(&mut self.registry, &mut self.store, &mut self.world, previous, target)
        }
    }

    #[test]
    fn test_transition_replaces_entity() {
        let mut fx = Fixture::new();
        let old = fx.seat(1);

        let new = fx.run(old, TargetRole::Loading).unwrap();

        assert_eq!(new.kind(), RoleKind::Loading);
        assert_ne!(new.id(), old);
        assert!(!fx.store.contains(old));
        assert_eq!(
            fx.store.find_by_connection(ConnectionId(1)),
            Some((new.id(), RoleKind::Loading))
        );
        assert_eq!(fx.registry.bound_entity(ConnectionId(1)), Some(new.id()));
        assert_eq!(fx.store.total(), 1);
    }

    #[test]
    fn test_transition_swaps_world_object() {
        let mut fx = Fixture::new();
        let old = fx.seat(1);
        let old_handle = fx.store.get(old).unwrap().world();

        let new = fx.run(old, TargetRole::Loading).unwrap();

        assert!(!fx.world.is_live(old_handle));
        assert!(fx.world.is_live(new.world()));
        assert_eq!(fx.world.owned_by(ConnectionId(1)), 1);
    }

    #[test]
    fn test_transition_to_active_carries_transform() {
        let mut fx = Fixture::new();
        let old = fx.seat(1);
        let loading = fx.run(old, TargetRole::Loading).unwrap();

        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::ZERO,
        };
        let active = fx.run(loading.id(), TargetRole::Active { transform }).unwrap();

        match active {
            RoleEntity::Active(p) => assert_eq!(p.transform, transform),
            other => panic!("expected active participant, got {:?}", other.kind()),
        }
        assert_eq!(fx.store.len(RoleKind::Loading), 0);
        assert_eq!(fx.store.len(RoleKind::Active), 1);
    }

    #[test]
    fn test_stale_connection_leaves_partitions_untouched() {
        let mut fx = Fixture::new();
        let old = fx.seat(1);
        fx.registry.remove(ConnectionId(1));

        let err = fx.run(old, TargetRole::Loading).unwrap_err();

        assert_eq!(err, SessionError::StaleConnection(ConnectionId(1)));
        assert!(fx.store.contains(old));
        assert_eq!(fx.store.len(RoleKind::Loading), 0);
        assert_eq!(fx.world.live_count(), 1);
    }

    #[test]
    fn test_unknown_entity() {
        let mut fx = Fixture::new();
        let missing = uuid::Uuid::new_v4();

        assert_eq!(
            fx.run(missing, TargetRole::Loading).unwrap_err(),
            SessionError::EntityNotFound(missing)
        );
    }

    #[test]
    fn test_back_to_waiting_room_as_leader() {
        let mut fx = Fixture::new();
        let old = fx.seat(1);
        let loading = fx.run(old, TargetRole::Loading).unwrap();

        let back = fx
            .run(loading.id(), TargetRole::WaitingRoom { is_party_leader: true })
            .unwrap();

        assert!(back.is_party_leader());
        assert_eq!(fx.store.waiting_room().len(), 1);
    }
}
