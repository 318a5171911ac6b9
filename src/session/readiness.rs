//! Readiness Coordinator: gates the waiting room on ready flags and the
//! loading screen on per-participant load completion.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::net::protocol::ServerMessage;
use crate::net::transport::Transport;
use crate::session::scheduler::SharedSession;
use crate::session::status::SessionStatus;
use crate::session::store::RoleEntityStore;

/// True iff the waiting room holds at least `min_players` and all of them are ready
pub fn is_ready_to_load(store: &RoleEntityStore, min_players: usize) -> bool {
    let participants = store.waiting_room();
    participants.len() >= min_players && participants.iter().all(|p| p.is_ready)
}

/// True iff every loading participant reported its content loaded
pub fn all_loaded(store: &RoleEntityStore) -> bool {
    store.loading().iter().all(|p| p.is_loaded)
}

/// Push the current readiness result to every waiting-room participant.
///
/// Only the waiting-room partition is touched.
pub fn notify_ready_state_changed(
    store: &mut RoleEntityStore,
    transport: &dyn Transport,
    min_players: usize,
) -> bool {
    let ready_to_load = is_ready_to_load(store, min_players);
    let message = ServerMessage::ReadyStateChanged { ready_to_load };

    for participant in store.waiting_room_mut() {
        participant.can_start = ready_to_load;
        if let Err(e) = transport.send(participant.connection, &message) {
            debug!("Ready state for {} not delivered: {}", participant.connection, e);
        }
    }

    ready_to_load
}

/// How a load wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    AllLoaded,
    /// The session left `Loading` before everyone finished
    Abandoned,
}

/// Wait until every loading participant has loaded.
///
/// Checks once per tick and releases the session between checks.
pub async fn wait_for_all_loaded(session: &SharedSession, tick: Duration) -> WaitOutcome {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let guard = session.read().await;
        if guard.status() != SessionStatus::Loading {
            debug!("Load wait abandoned in status {}", guard.status());
            return WaitOutcome::Abandoned;
        }
        if guard.all_loaded() {
            return WaitOutcome::AllLoaded;
        }
    }
}
