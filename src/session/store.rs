//! Role Entity Store: three role-partitioned collections.

use crate::net::connection::ConnectionId;
use crate::session::role::{
    ActiveParticipant, EntityId, LoadingParticipant, RoleEntity, RoleKind, WaitingRoomParticipant,
};

/// Role-partitioned participant collections, kept in join order
#[derive(Debug, Default)]
pub struct RoleEntityStore {
    waiting_room: Vec<WaitingRoomParticipant>,
    loading: Vec<LoadingParticipant>,
    active: Vec<ActiveParticipant>,
}

impl RoleEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity into the partition matching its variant
    pub fn add(&mut self, entity: RoleEntity) {
        match entity {
            RoleEntity::WaitingRoom(p) => self.waiting_room.push(p),
            RoleEntity::Loading(p) => self.loading.push(p),
            RoleEntity::Active(p) => self.active.push(p),
        }
    }

    /// Remove an entity from whichever partition holds it.
    ///
    /// Removing an absent entity is a no-op.
    pub fn remove(&mut self, id: EntityId) -> Option<RoleEntity> {
        if let Some(pos) = self.waiting_room.iter().position(|p| p.id == id) {
            return Some(self.waiting_room.remove(pos).into());
        }
        if let Some(pos) = self.loading.iter().position(|p| p.id == id) {
            return Some(self.loading.remove(pos).into());
        }
        if let Some(pos) = self.active.iter().position(|p| p.id == id) {
            return Some(self.active.remove(pos).into());
        }
        None
    }

    /// Owned copy of an entity
    pub fn get(&self, id: EntityId) -> Option<RoleEntity> {
        self.waiting_room
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .map(RoleEntity::from)
            .or_else(|| self.loading.iter().find(|p| p.id == id).cloned().map(RoleEntity::from))
            .or_else(|| self.active.iter().find(|p| p.id == id).cloned().map(RoleEntity::from))
    }

    /// Partition currently holding an entity
    pub fn kind_of(&self, id: EntityId) -> Option<RoleKind> {
        if self.waiting_room.iter().any(|p| p.id == id) {
            Some(RoleKind::WaitingRoom)
        } else if self.loading.iter().any(|p| p.id == id) {
            Some(RoleKind::Loading)
        } else if self.active.iter().any(|p| p.id == id) {
            Some(RoleKind::Active)
        } else {
            None
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.kind_of(id).is_some()
    }

    /// Entity bound to a connection across all partitions
    pub fn find_by_connection(&self, connection: ConnectionId) -> Option<(EntityId, RoleKind)> {
        self.waiting_room
            .iter()
            .find(|p| p.connection == connection)
            .map(|p| (p.id, RoleKind::WaitingRoom))
            .or_else(|| {
                self.loading
                    .iter()
                    .find(|p| p.connection == connection)
                    .map(|p| (p.id, RoleKind::Loading))
            })
            .or_else(|| {
                self.active
                    .iter()
                    .find(|p| p.connection == connection)
                    .map(|p| (p.id, RoleKind::Active))
            })
    }

    pub fn waiting_room(&self) -> &[WaitingRoomParticipant] {
        &self.waiting_room
    }

    pub fn loading(&self) -> &[LoadingParticipant] {
        &self.loading
    }

    pub fn active(&self) -> &[ActiveParticipant] {
        &self.active
    }

    pub fn waiting_room_mut(&mut self) -> &mut [WaitingRoomParticipant] {
        &mut self.waiting_room
    }

    pub fn waiting_room_participant_mut(
        &mut self,
        connection: ConnectionId,
    ) -> Option<&mut WaitingRoomParticipant> {
        self.waiting_room.iter_mut().find(|p| p.connection == connection)
    }

    pub fn loading_participant_mut(
        &mut self,
        connection: ConnectionId,
    ) -> Option<&mut LoadingParticipant> {
        self.loading.iter_mut().find(|p| p.connection == connection)
    }

    /// Copy of a partition's entity ids.
    ///
    /// Iterate this instead of the partition when visiting members mutates it.
    pub fn snapshot_ids(&self, kind: RoleKind) -> Vec<EntityId> {
        match kind {
            RoleKind::WaitingRoom => self.waiting_room.iter().map(|p| p.id).collect(),
            RoleKind::Loading => self.loading.iter().map(|p| p.id).collect(),
            RoleKind::Active => self.active.iter().map(|p| p.id).collect(),
        }
    }

    /// Empty a partition, returning its entities
    pub fn clear(&mut self, kind: RoleKind) -> Vec<RoleEntity> {
        match kind {
            RoleKind::WaitingRoom => self.waiting_room.drain(..).map(RoleEntity::from).collect(),
            RoleKind::Loading => self.loading.drain(..).map(RoleEntity::from).collect(),
            RoleKind::Active => self.active.drain(..).map(RoleEntity::from).collect(),
        }
    }

    pub fn len(&self, kind: RoleKind) -> usize {
        match kind {
            RoleKind::WaitingRoom => self.waiting_room.len(),
            RoleKind::Loading => self.loading.len(),
            RoleKind::Active => self.active.len(),
        }
    }

    /// Entities across all partitions
    pub fn total(&self) -> usize {
        self.waiting_room.len() + self.loading.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{Transform, WorldHandle};

    fn waiting(conn: u64) -> WaitingRoomParticipant {
        WaitingRoomParticipant::new(ConnectionId(conn), WorldHandle(conn), false)
    }

    #[test]
    fn test_add_dispatches_by_variant() {
        let mut store = RoleEntityStore::new();
        store.add(waiting(1).into());
        store.add(LoadingParticipant::new(ConnectionId(2), WorldHandle(2)).into());
        store.add(ActiveParticipant::new(ConnectionId(3), WorldHandle(3), Transform::default()).into());

        assert_eq!(store.len(RoleKind::WaitingRoom), 1);
        assert_eq!(store.len(RoleKind::Loading), 1);
        assert_eq!(store.len(RoleKind::Active), 1);
        assert_eq!(store.total(), 3);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = RoleEntityStore::new();
        let participant = waiting(1);
        let id = participant.id;
        store.add(participant.into());

        let removed = store.remove(id);
        assert_eq!(removed.map(|e| e.kind()), Some(RoleKind::WaitingRoom));
        assert!(store.remove(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_by_connection() {
        let mut store = RoleEntityStore::new();
        let loading = LoadingParticipant::new(ConnectionId(5), WorldHandle(1));
        let id = loading.id;
        store.add(waiting(4).into());
        store.add(loading.into());

        assert_eq!(store.find_by_connection(ConnectionId(5)), Some((id, RoleKind::Loading)));
        assert!(store.find_by_connection(ConnectionId(6)).is_none());
        assert_eq!(store.kind_of(id), Some(RoleKind::Loading));
        assert_eq!(store.get(id).map(|e| e.connection()), Some(ConnectionId(5)));
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let mut store = RoleEntityStore::new();
        for conn in 1..=3 {
            store.add(waiting(conn).into());
        }

        let ids = store.snapshot_ids(RoleKind::WaitingRoom);
        for id in &ids {
            if let Some(RoleEntity::WaitingRoom(p)) = store.remove(*id) {
                store.add(LoadingParticipant::new(p.connection, p.world).into());
            }
        }

        assert_eq!(ids.len(), 3);
        assert_eq!(store.len(RoleKind::WaitingRoom), 0);
        assert_eq!(store.len(RoleKind::Loading), 3);
    }

    #[test]
    fn test_clear_partition() {
        let mut store = RoleEntityStore::new();
        store.add(waiting(1).into());
        store.add(waiting(2).into());
        store.add(LoadingParticipant::new(ConnectionId(3), WorldHandle(3)).into());

        let cleared = store.clear(RoleKind::WaitingRoom);
        assert_eq!(cleared.len(), 2);
        assert_eq!(store.total(), 1);
    }

    #[test]
    fn test_participant_mut_lookup() {
        let mut store = RoleEntityStore::new();
        store.add(waiting(1).into());

        if let Some(p) = store.waiting_room_participant_mut(ConnectionId(1)) {
            p.set_ready(true);
        }
        assert!(store.waiting_room()[0].is_ready);
        assert!(store.loading_participant_mut(ConnectionId(1)).is_none());
    }
}
