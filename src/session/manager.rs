//! Session manager: owns the status, the connection registry and the role
//! partitions, and funnels every mutation of them.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::capacity;
use crate::game::level::{Level, SessionDescriptor, SessionKind};
use crate::game::loader::{HeadlessLoader, LevelLoader};
use crate::game::world::{World, WorldRegistry};
use crate::metrics::Metrics;
use crate::net::connection::{ConnectionId, ConnectionRegistry, ConnectionState};
use crate::net::protocol::{ClientMessage, ServerMessage};
use crate::net::transport::Transport;
use crate::session::error::SessionError;
use crate::session::events::SessionEvent;
use crate::session::readiness;
use crate::session::role::{
    ActiveParticipant, EntityId, LoadingParticipant, RoleEntity, RoleKind, WaitingRoomParticipant,
};
use crate::session::scheduler::SessionCommand;
use crate::session::status::{NetworkMode, SessionStatus};
use crate::session::store::RoleEntityStore;
use crate::session::transition::{transition, TargetRole};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Process-wide session state
pub struct SessionManager {
    status: SessionStatus,
    mode: NetworkMode,
    /// Admission cap currently in force
    max_connections: usize,
    /// Cap applied while hosting a waiting room
    lobby_capacity: usize,
    min_players: usize,
    registry: ConnectionRegistry,
    store: RoleEntityStore,
    world: Box<dyn World>,
    loader: Box<dyn LevelLoader>,
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
    events: broadcast::Sender<SessionEvent>,
    descriptor: Option<SessionDescriptor>,
    ready_to_load: bool,
    level_loaded: bool,
    /// Entity the remote host assigned to this process (client mode)
    local_role: Option<(EntityId, RoleKind)>,
    /// Outbound channel to the remote host (client mode)
    host_link: Option<mpsc::UnboundedSender<ClientMessage>>,
}

impl SessionManager {
    pub fn new(config: &ServerConfig, transport: Arc<dyn Transport>, metrics: Arc<Metrics>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            status: SessionStatus::Menu,
            mode: NetworkMode::Offline,
            max_connections: 0,
            lobby_capacity: config.max_connections,
            min_players: config.min_players,
            registry: ConnectionRegistry::new(),
            store: RoleEntityStore::new(),
            world: Box::new(WorldRegistry::new()),
            loader: Box::new(HeadlessLoader::default()),
            transport,
            metrics,
            events,
            descriptor: None,
            ready_to_load: false,
            level_loaded: false,
            local_role: None,
            host_link: None,
        }
    }

    /// Replace the world-entity collaborator
    pub fn with_world(mut self, world: Box<dyn World>) -> Self {
        self.world = world;
        self
    }

    /// Replace the level-load collaborator
    pub fn with_loader(mut self, loader: Box<dyn LevelLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Route client-mode messages to a remote host
    pub fn with_host_link(mut self, host_link: mpsc::UnboundedSender<ClientMessage>) -> Self {
        self.host_link = Some(host_link);
        self
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    pub fn is_authoritative(&self) -> bool {
        self.mode.is_authoritative()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn min_players(&self) -> usize {
        self.min_players
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &RoleEntityStore {
        &self.store
    }

    pub fn waiting_room_participants(&self) -> &[WaitingRoomParticipant] {
        self.store.waiting_room()
    }

    pub fn loading_participants(&self) -> &[LoadingParticipant] {
        self.store.loading()
    }

    pub fn active_participants(&self) -> &[ActiveParticipant] {
        self.store.active()
    }

    pub fn connection_state(&self, connection: ConnectionId) -> Option<ConnectionState> {
        self.registry.state(connection)
    }

    /// Descriptor of the session being loaded or played
    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    /// Last readiness result pushed to (or received by) the waiting room
    pub fn ready_to_load(&self) -> bool {
        self.ready_to_load
    }

    pub fn level_loaded(&self) -> bool {
        self.level_loaded
    }

    pub fn local_role(&self) -> Option<(EntityId, RoleKind)> {
        self.local_role
    }

    pub fn level_progress(&self) -> f32 {
        self.loader.progress()
    }

    // ---- Status commands ----

    /// Start hosting a waiting room.
    ///
    /// Participants still loading or playing are moved back into the room.
    pub fn enter_waiting_room(&mut self) -> Result<(), SessionError> {
        if self.mode == NetworkMode::Client {
            return Err(SessionError::PreconditionViolation(
                "cannot host while joined to a remote session",
            ));
        }
        if !self.status.can_enter_waiting_room() {
            return Err(SessionError::PreconditionViolation(
                "waiting room can only be entered from menu or active",
            ));
        }

        self.mode = NetworkMode::Host;
        self.max_connections = self.lobby_capacity;

        let mut returning = self.store.snapshot_ids(RoleKind::Loading);
        returning.extend(self.store.snapshot_ids(RoleKind::Active));
        for id in returning {
            let is_party_leader = self.store.waiting_room().is_empty();
            self.transition_and_announce(id, TargetRole::WaitingRoom { is_party_leader });
        }

        self.loader.cancel();
        self.descriptor = None;
        self.level_loaded = false;
        self.set_status(SessionStatus::WaitingRoom);

        // Peers that became ready while the room was closed
        for connection in self.registry.unbound_ready() {
            if let Err(e) = self.bind_connection(connection) {
                warn!("Seating {} failed: {}", connection, e);
            }
        }

        self.notify_ready_state_changed();
        self.sync_metrics();

        info!(
            "Hosting waiting room (capacity {}, minimum {})",
            self.max_connections, self.min_players
        );
        Ok(())
    }

    /// Join a remote host's waiting room as a non-authoritative participant
    pub fn join_waiting_room(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Menu {
            return Err(SessionError::PreconditionViolation(
                "a waiting room can only be joined from the menu",
            ));
        }
        if self.mode != NetworkMode::Offline {
            self.stop_all();
        }

        self.mode = NetworkMode::Client;
        self.max_connections = 0;
        self.set_status(SessionStatus::WaitingRoom);
        if !self.send_to_host(ClientMessage::Ready) {
            warn!("No host link; the host will not seat this participant");
        }
        info!("Joined remote waiting room");
        Ok(())
    }

    /// Toggle this participant's ready flag in the remote waiting room
    pub fn set_local_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        if self.mode != NetworkMode::Client || self.status != SessionStatus::WaitingRoom {
            return Err(SessionError::PreconditionViolation(
                "ready toggle requires a joined waiting room",
            ));
        }
        if !self.send_to_host(ClientMessage::SetReady { ready }) {
            return Err(SessionError::PreconditionViolation("host link closed"));
        }
        Ok(())
    }

    /// Send a message to the remote host. Returns false without a live link.
    pub fn send_to_host(&self, message: ClientMessage) -> bool {
        match &self.host_link {
            Some(link) => link.send(message).is_ok(),
            None => false,
        }
    }

    /// Return to the menu as a single-participant offline host
    pub fn enter_offline_menu(&mut self) {
        if self.mode != NetworkMode::Offline {
            self.stop_all();
        }

        self.mode = NetworkMode::Host;
        self.max_connections = capacity::OFFLINE_MAX_CONNECTIONS;
        self.set_status(SessionStatus::Menu);
        info!("Offline menu (capacity {})", self.max_connections);
    }

    /// Tear down hosting or serving and reset to the menu.
    ///
    /// Waiting-room participants are told the lobby closed. Loading
    /// participants are dropped without a notice.
    pub fn stop_all(&mut self) {
        match self.status {
            SessionStatus::WaitingRoom => {
                let connections: Vec<ConnectionId> = self
                    .store
                    .waiting_room()
                    .iter()
                    .map(|p| p.connection)
                    .collect();
                let notified = self.transport.broadcast(&connections, &ServerMessage::LobbyClosed);
                debug!("Lobby closure sent to {}/{} participants", notified, connections.len());
            }
            SessionStatus::Loading => {
                debug!("Dropping {} loading participants", self.store.len(RoleKind::Loading));
            }
            SessionStatus::Menu | SessionStatus::Active => {}
        }

        if self.mode == NetworkMode::Client {
            self.send_to_host(ClientMessage::Leave);
        }

        for kind in [RoleKind::WaitingRoom, RoleKind::Loading, RoleKind::Active] {
            for entity in self.store.clear(kind) {
                self.world.destroy(entity.world());
            }
        }

        let connections = self.registry.drain();
        for connection in &connections {
            self.transport.disconnect(*connection);
        }

        self.loader.cancel();
        self.descriptor = None;
        self.ready_to_load = false;
        self.level_loaded = false;
        self.local_role = None;
        self.mode = NetworkMode::Offline;
        self.max_connections = 0;
        self.set_status(SessionStatus::Menu);
        self.sync_metrics();

        info!("Session stopped ({} connections closed)", connections.len());
    }

    /// Move every waiting-room participant to loading and broadcast the
    /// descriptor to every connection. Returns how many peers accepted it.
    pub fn begin_load_sequence(&mut self, descriptor: SessionDescriptor) -> Result<usize, SessionError> {
        if !self.mode.is_authoritative() {
            return Err(SessionError::PreconditionViolation(
                "load sequence requires the authoritative role",
            ));
        }
        if !self.status.can_begin_loading() {
            return Err(SessionError::PreconditionViolation(
                "load sequence already in progress",
            ));
        }

        for id in self.store.snapshot_ids(RoleKind::WaitingRoom) {
            self.transition_and_announce(id, TargetRole::Loading);
        }

        let targets = self.registry.ids();
        let delivered = self
            .transport
            .broadcast(&targets, &ServerMessage::StartSession(descriptor.clone()));
        self.metrics.sessions_started.fetch_add(1, Ordering::Relaxed);

        info!(
            "Starting {:?} session on '{}' ({}/{} peers notified)",
            descriptor.session_kind,
            descriptor.level.name,
            delivered,
            targets.len()
        );

        self.start_level_load(descriptor);
        self.sync_metrics();
        Ok(delivered)
    }

    /// Make the loaded session live.
    ///
    /// The host spawns every loading participant as active; a client only
    /// updates its local status.
    pub fn complete_load_sequence(&mut self) -> Result<usize, SessionError> {
        if self.status != SessionStatus::Loading {
            return Err(SessionError::PreconditionViolation("no load sequence in progress"));
        }

        let mut spawned = 0;
        if self.mode.is_authoritative() {
            let descriptor = self
                .descriptor
                .clone()
                .ok_or(SessionError::PreconditionViolation("no session descriptor"))?;

            for (index, id) in self.store.snapshot_ids(RoleKind::Loading).into_iter().enumerate() {
                let transform = descriptor.spawn_transform(index);
                if self.transition_and_announce(id, TargetRole::Active { transform }) {
                    spawned += 1;
                }
            }
        }

        self.set_status(SessionStatus::Active);
        self.sync_metrics();
        info!("Session active with {} participants", spawned);
        Ok(spawned)
    }

    // ---- Connection registry ----

    /// Admit a new transport connection or reject it when at capacity.
    ///
    /// Binding waits until the connection reports ready.
    pub fn on_connect(
        &mut self,
        connection: ConnectionId,
        remote_addr: Option<SocketAddr>,
    ) -> Result<(), SessionError> {
        let current = self.registry.count();
        if current >= self.max_connections {
            let err = SessionError::CapacityExceeded {
                current,
                max: self.max_connections,
            };
            warn!("Rejecting {}: {}", connection, err);

            let notice = ServerMessage::Rejected {
                reason: err.to_string(),
            };
            if let Err(e) = self.transport.send(connection, &notice) {
                debug!("Rejection notice to {} not delivered: {}", connection, e);
            }
            self.transport.disconnect(connection);
            self.metrics.connections_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        if !self.registry.admit(connection, remote_addr) {
            return Err(SessionError::PreconditionViolation("connection already admitted"));
        }

        info!(
            "{} connected from {:?} ({}/{})",
            connection,
            remote_addr,
            self.registry.count(),
            self.max_connections
        );
        self.emit(SessionEvent::ParticipantConnected(connection));
        Ok(())
    }

    /// Record transport-level readiness for a connection
    pub fn mark_ready(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        if self.registry.mark_ready(connection) {
            Ok(())
        } else {
            Err(SessionError::UnknownConnection(connection))
        }
    }

    /// Bind a role entity to a ready connection according to the status.
    ///
    /// Returns `None` while loading or active; late joins are not seated.
    /// Binding an already bound connection returns its current entity.
    pub fn bind_connection(&mut self, connection: ConnectionId) -> Result<Option<RoleEntity>, SessionError> {
        let (is_valid, is_ready, bound) = match self.registry.get(connection) {
            Some(conn) => (conn.is_valid(), conn.is_ready(), conn.bound_entity),
            None => return Err(SessionError::UnknownConnection(connection)),
        };
        if !is_valid {
            return Err(SessionError::StaleConnection(connection));
        }
        if !is_ready {
            return Err(SessionError::PreconditionViolation("connection is not ready"));
        }
        if let Some(existing) = bound {
            return Ok(self.store.get(existing));
        }

        let entity: RoleEntity = match self.status {
            SessionStatus::Menu => {
                let handle = self.world.instantiate(RoleKind::Loading, connection);
                LoadingParticipant::new(connection, handle).into()
            }
            SessionStatus::WaitingRoom => {
                let is_party_leader = self.store.waiting_room().is_empty();
                let handle = self.world.instantiate(RoleKind::WaitingRoom, connection);
                WaitingRoomParticipant::new(connection, handle, is_party_leader).into()
            }
            SessionStatus::Loading | SessionStatus::Active => {
                debug!("{} arrived during {}, not seated", connection, self.status);
                return Ok(None);
            }
        };

        self.registry.bind(connection, entity.id());
        self.store.add(entity.clone());
        self.announce_role(&entity);

        info!(
            "{} bound as {}{}",
            connection,
            entity.kind(),
            if entity.is_party_leader() { " (party leader)" } else { "" }
        );

        if entity.kind() == RoleKind::WaitingRoom {
            self.notify_ready_state_changed();
        }
        self.sync_metrics();
        Ok(Some(entity))
    }

    /// Unbind and forget a connection. Unknown connections are ignored.
    pub fn on_disconnect(&mut self, connection: ConnectionId) {
        let entity_id = self
            .registry
            .bound_entity(connection)
            .or_else(|| self.store.find_by_connection(connection).map(|(id, _)| id));
        let removed = entity_id.and_then(|id| self.store.remove(id));
        if let Some(entity) = &removed {
            self.world.destroy(entity.world());
        }

        let record = self.registry.remove(connection);
        if record.is_none() && removed.is_none() {
            debug!("Disconnect for unknown {}", connection);
            return;
        }

        if self.status == SessionStatus::WaitingRoom {
            if removed.as_ref().is_some_and(RoleEntity::is_party_leader) {
                self.promote_party_leader();
            }
            self.notify_ready_state_changed();
        }

        info!(
            "{} disconnected from {:?} ({} remaining)",
            connection,
            record.and_then(|conn| conn.remote_addr),
            self.registry.count()
        );
        self.emit(SessionEvent::ParticipantDisconnected(connection));
        self.sync_metrics();
    }

    // ---- Messages ----

    /// Apply a client message. A start request yields the command to run.
    pub fn handle_client_message(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<Option<SessionCommand>, SessionError> {
        if self.registry.get(connection).is_none() {
            return Err(SessionError::UnknownConnection(connection));
        }

        match message {
            ClientMessage::Ready => {
                self.mark_ready(connection)?;
                debug!("{} ready", connection);
            }
            ClientMessage::SetReady { ready } => {
                match self.store.waiting_room_participant_mut(connection) {
                    Some(participant) => participant.set_ready(ready),
                    None => {
                        debug!("Ready toggle from {} outside the waiting room", connection);
                        return Ok(None);
                    }
                }
                self.notify_ready_state_changed();
            }
            ClientMessage::RequestStart {
                level_id,
                dynamic_placement,
            } => {
                let session_kind = match self.status {
                    SessionStatus::WaitingRoom => {
                        let is_leader = self
                            .store
                            .waiting_room()
                            .iter()
                            .any(|p| p.connection == connection && p.is_party_leader);
                        if !is_leader {
                            return Err(SessionError::PreconditionViolation(
                                "only the party leader can start the session",
                            ));
                        }
                        if !self.is_ready_to_load() {
                            return Err(SessionError::PreconditionViolation(
                                "waiting room is not ready",
                            ));
                        }
                        SessionKind::Multiplayer
                    }
                    SessionStatus::Menu
                        if self.store.loading().iter().any(|p| p.connection == connection) =>
                    {
                        SessionKind::SinglePlayer
                    }
                    _ => {
                        return Err(SessionError::PreconditionViolation(
                            "session cannot be started now",
                        ))
                    }
                };

                let level = Level::from_id(level_id)
                    .ok_or(SessionError::PreconditionViolation("unknown level"))?;
                info!("{} requested {} on {}", connection, session_kind_name(session_kind), level);

                return Ok(Some(SessionCommand::BeginLoadSequence(SessionDescriptor::new(
                    session_kind,
                    level.data(),
                    dynamic_placement,
                ))));
            }
            ClientMessage::LoadComplete => match self.store.loading_participant_mut(connection) {
                Some(participant) => {
                    participant.is_loaded = true;
                    debug!("{} finished loading", connection);
                }
                None => debug!("Load completion from {} outside loading", connection),
            },
            ClientMessage::Leave => {
                self.on_disconnect(connection);
                self.transport.disconnect(connection);
            }
            ClientMessage::Ping { timestamp } => {
                let pong = ServerMessage::Pong {
                    client_timestamp: timestamp,
                    server_timestamp: unix_millis(),
                };
                if let Err(e) = self.transport.send(connection, &pong) {
                    debug!("Pong to {} not delivered: {}", connection, e);
                }
            }
        }

        Ok(None)
    }

    /// Apply a message from the remote host (client mode only)
    pub fn handle_server_message(&mut self, message: ServerMessage) {
        if self.mode != NetworkMode::Client {
            debug!("Ignoring host message outside client mode");
            return;
        }

        match message {
            ServerMessage::StartSession(descriptor) => {
                if !self.status.can_begin_loading() {
                    warn!("Start broadcast received during {}", self.status);
                    return;
                }
                info!("[CLIENT] Host started '{}'", descriptor.level.name);
                self.start_level_load(descriptor);
            }
            ServerMessage::LobbyClosed => {
                info!("[CLIENT] Host closed the lobby");
                self.stop_all();
            }
            ServerMessage::Rejected { reason } => {
                warn!("[CLIENT] Rejected by host: {}", reason);
                self.stop_all();
            }
            ServerMessage::ReadyStateChanged { ready_to_load } => {
                self.ready_to_load = ready_to_load;
                self.emit(SessionEvent::ReadyStateChanged { ready_to_load });
            }
            ServerMessage::RoleAssigned { entity, role, .. } => {
                debug!("[CLIENT] Assigned {} as {}", entity, role);
                self.local_role = Some((entity, role));
            }
            ServerMessage::Pong { .. } => {}
        }
    }

    /// Advance local level loading by one tick
    pub fn tick(&mut self) {
        self.metrics.tick_count.fetch_add(1, Ordering::Relaxed);

        if !self.loader.is_loading() {
            return;
        }

        self.loader.poll();
        if self.loader.is_loading() || self.level_loaded {
            return;
        }

        self.level_loaded = true;
        info!("Level load complete");
        self.emit(SessionEvent::LevelLoadComplete);

        if self.mode == NetworkMode::Client && self.status == SessionStatus::Loading {
            if !self.send_to_host(ClientMessage::LoadComplete) {
                warn!("Load completion not delivered to host");
            }
            if let Err(e) = self.complete_load_sequence() {
                warn!("Failed to activate session: {}", e);
            }
        }
    }

    // ---- Readiness ----

    pub fn is_ready_to_load(&self) -> bool {
        readiness::is_ready_to_load(&self.store, self.min_players)
    }

    pub fn all_loaded(&self) -> bool {
        readiness::all_loaded(&self.store)
    }

    /// Push readiness to the waiting room and publish it
    pub fn notify_ready_state_changed(&mut self) -> bool {
        let ready_to_load = readiness::notify_ready_state_changed(
            &mut self.store,
            self.transport.as_ref(),
            self.min_players,
        );
        self.ready_to_load = ready_to_load;
        self.emit(SessionEvent::ReadyStateChanged { ready_to_load });
        ready_to_load
    }

    // ---- Internals ----

    fn start_level_load(&mut self, descriptor: SessionDescriptor) {
        self.loader.begin(&descriptor);
        self.level_loaded = false;
        self.descriptor = Some(descriptor);
        self.set_status(SessionStatus::Loading);
    }

    /// Transition an entity and tell its connection. Failures are logged.
    fn transition_and_announce(&mut self, previous: EntityId, target: TargetRole) -> bool {
        match transition(
            &mut self.registry,
            &mut self.store,
            self.world.as_mut(),
            previous,
            target,
        ) {
            Ok(entity) => {
                self.metrics.transitions_total.fetch_add(1, Ordering::Relaxed);
                self.announce_role(&entity);
                true
            }
            Err(e) => {
                warn!("Transition of {} to {} failed: {}", previous, target.kind(), e);
                false
            }
        }
    }

    fn announce_role(&self, entity: &RoleEntity) {
        let message = ServerMessage::RoleAssigned {
            entity: entity.id(),
            role: entity.kind(),
            is_party_leader: entity.is_party_leader(),
        };
        if let Err(e) = self.transport.send(entity.connection(), &message) {
            debug!("Role notice to {} not delivered: {}", entity.connection(), e);
        }
    }

    /// Hand leadership to the longest-waiting participant if nobody holds it
    fn promote_party_leader(&mut self) {
        if self.store.waiting_room().iter().any(|p| p.is_party_leader) {
            return;
        }
        let promoted = match self.store.waiting_room_mut().first_mut() {
            Some(participant) => {
                participant.is_party_leader = true;
                RoleEntity::from(participant.clone())
            }
            None => return,
        };

        info!("{} promoted to party leader", promoted.connection());
        self.announce_role(&promoted);
    }

    fn set_status(&mut self, to: SessionStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        self.metrics.session_status.store(to.code(), Ordering::Relaxed);
        info!("Session status {} -> {}", from, to);
        self.emit(SessionEvent::StatusChanged { from, to });
    }

    fn sync_metrics(&self) {
        self.metrics.set_partitions(
            self.store.len(RoleKind::WaitingRoom),
            self.store.len(RoleKind::Loading),
            self.store.len(RoleKind::Active),
        );
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn session_kind_name(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::SinglePlayer => "single-player",
        SessionKind::Multiplayer => "multiplayer",
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
