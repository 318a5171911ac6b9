//! The session scheduler.
//!
//! One task owns the event loop: transport events, menu commands and the
//! tick all funnel through it. Handlers that must wait (connection
//! readiness, level loading) run as tasks that re-check their condition once
//! per tick and never hold the session across a yield.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::game::level::SessionDescriptor;
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::net::transport::NetEvent;
use crate::session::error::SessionError;
use crate::session::manager::SessionManager;
use crate::session::readiness::{wait_for_all_loaded, WaitOutcome};
use crate::session::role::RoleEntity;
use crate::session::status::SessionStatus;

/// Shared handle to the session manager
pub type SharedSession = Arc<RwLock<SessionManager>>;

/// Commands issued by menu/UI code
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    EnterWaitingRoom,
    JoinWaitingRoom,
    EnterOfflineMenu,
    BeginLoadSequence(SessionDescriptor),
    StopAll,
}

/// Run the scheduler until both input channels close
pub async fn run_session_loop(
    session: SharedSession,
    mut events: mpsc::UnboundedReceiver<NetEvent>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;
    let mut commands_open = true;

    info!("Session scheduler started ({:?} tick)", tick);

    while events_open || commands_open {
        tokio::select! {
            _ = interval.tick() => {
                session.write().await.tick();
            }
            event = events.recv(), if events_open => match event {
                Some(event) => handle_net_event(&session, event, tick).await,
                None => {
                    debug!("Transport event channel closed");
                    events_open = false;
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    if let Err(e) = dispatch_command(&session, command, tick).await {
                        warn!("Session command failed: {}", e);
                    }
                }
                None => {
                    debug!("Command channel closed");
                    commands_open = false;
                }
            },
        }
    }

    info!("Session scheduler stopped");
}

/// Apply one transport event
pub async fn handle_net_event(session: &SharedSession, event: NetEvent, tick: Duration) {
    match event {
        NetEvent::Connected {
            connection,
            remote_addr,
        } => {
            let admitted = session.write().await.on_connect(connection, remote_addr);
            if admitted.is_ok() {
                let session = session.clone();
                tokio::spawn(async move {
                    await_ready_and_bind(&session, connection, tick).await;
                });
            }
        }
        NetEvent::Message {
            connection,
            message,
        } => {
            let result = session
                .write()
                .await
                .handle_client_message(connection, message);
            match result {
                Ok(Some(command)) => {
                    if let Err(e) = dispatch_command(session, command, tick).await {
                        warn!("Command from {} failed: {}", connection, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Message from {} refused: {}", connection, e),
            }
        }
        NetEvent::Disconnected { connection } => {
            session.write().await.on_disconnect(connection);
        }
    }
}

/// Apply a menu command. A load sequence continues in its own task.
pub async fn dispatch_command(
    session: &SharedSession,
    command: SessionCommand,
    tick: Duration,
) -> Result<(), SessionError> {
    match command {
        SessionCommand::EnterWaitingRoom => session.write().await.enter_waiting_room(),
        SessionCommand::JoinWaitingRoom => session.write().await.join_waiting_room(),
        SessionCommand::EnterOfflineMenu => {
            session.write().await.enter_offline_menu();
            Ok(())
        }
        SessionCommand::StopAll => {
            session.write().await.stop_all();
            Ok(())
        }
        SessionCommand::BeginLoadSequence(descriptor) => {
            session.write().await.begin_load_sequence(descriptor)?;
            let session = session.clone();
            tokio::spawn(async move {
                if let Err(e) = finish_load_sequence(&session, tick).await {
                    warn!("Load sequence failed: {}", e);
                }
            });
            Ok(())
        }
    }
}

/// Wait for a connection to report ready, then bind its role entity.
///
/// Gives up if the connection disconnects first.
pub async fn await_ready_and_bind(
    session: &SharedSession,
    connection: ConnectionId,
    tick: Duration,
) -> Option<RoleEntity> {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let mut guard = session.write().await;
        match guard.connection_state(connection) {
            Some(ConnectionState::Connecting) => continue,
            Some(ConnectionState::Ready) => {
                return match guard.bind_connection(connection) {
                    Ok(entity) => entity,
                    Err(e) => {
                        warn!("Binding {} failed: {}", connection, e);
                        None
                    }
                };
            }
            Some(ConnectionState::Disconnected) | None => {
                debug!("{} left before becoming ready", connection);
                return None;
            }
        }
    }
}

/// Begin loading, wait for every participant, then go live
pub async fn run_load_sequence(
    session: &SharedSession,
    descriptor: SessionDescriptor,
    tick: Duration,
) -> Result<WaitOutcome, SessionError> {
    session.write().await.begin_load_sequence(descriptor)?;
    finish_load_sequence(session, tick).await
}

async fn finish_load_sequence(
    session: &SharedSession,
    tick: Duration,
) -> Result<WaitOutcome, SessionError> {
    let outcome = wait_for_all_loaded(session, tick).await;
    if outcome == WaitOutcome::AllLoaded {
        let mut guard = session.write().await;
        // Status may have moved on between the check and this lock
        if guard.status() != SessionStatus::Loading {
            return Ok(WaitOutcome::Abandoned);
        }
        guard.complete_load_sequence()?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::level::{Level, SessionKind};
    use crate::metrics::Metrics;
    use crate::net::protocol::ClientMessage;
    use crate::net::transport::LocalTransport;

    const TICK: Duration = Duration::from_millis(10);

    fn shared() -> SharedSession {
        let transport = Arc::new(LocalTransport::new());
        let manager = SessionManager::new(&ServerConfig::default(), transport, Arc::new(Metrics::new()));
        Arc::new(RwLock::new(manager))
    }

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor::new(SessionKind::Multiplayer, Level::from_id(2).unwrap().data(), false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_waits_for_ready() {
        let session = shared();
        session.write().await.enter_waiting_room().unwrap();
        session.write().await.on_connect(ConnectionId(1), None).unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { await_ready_and_bind(&session, ConnectionId(1), TICK).await })
        };

        tokio::time::sleep(TICK * 3).await;
        assert!(session.read().await.store().is_empty());

        session.write().await.mark_ready(ConnectionId(1)).unwrap();
        let entity = waiter.await.unwrap().unwrap();

        assert!(entity.is_party_leader());
        assert_eq!(session.read().await.waiting_room_participants().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_wait_exits_on_disconnect() {
        let session = shared();
        session.write().await.enter_waiting_room().unwrap();
        session.write().await.on_connect(ConnectionId(1), None).unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { await_ready_and_bind(&session, ConnectionId(1), TICK).await })
        };

        tokio::time::sleep(TICK * 2).await;
        session.write().await.on_disconnect(ConnectionId(1));

        assert!(waiter.await.unwrap().is_none());
        assert!(session.read().await.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_sequence_waits_for_everyone() {
        let session = shared();
        {
            let mut guard = session.write().await;
            guard.enter_waiting_room().unwrap();
            for conn in [1, 2] {
                guard.on_connect(ConnectionId(conn), None).unwrap();
                guard.mark_ready(ConnectionId(conn)).unwrap();
                guard.bind_connection(ConnectionId(conn)).unwrap();
            }
        }

        let sequence = {
            let session = session.clone();
            tokio::spawn(async move { run_load_sequence(&session, descriptor(), TICK).await })
        };

        tokio::time::sleep(TICK * 2).await;
        assert_eq!(session.read().await.status(), SessionStatus::Loading);

        for conn in [1, 2] {
            session
                .write()
                .await
                .handle_client_message(ConnectionId(conn), ClientMessage::LoadComplete)
                .unwrap();
        }

        assert_eq!(sequence.await.unwrap(), Ok(WaitOutcome::AllLoaded));
        let guard = session.read().await;
        assert_eq!(guard.status(), SessionStatus::Active);
        assert_eq!(guard.active_participants().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_sequence_abandoned_by_stop() {
        let session = shared();
        {
            let mut guard = session.write().await;
            guard.enter_waiting_room().unwrap();
            guard.on_connect(ConnectionId(1), None).unwrap();
            guard.mark_ready(ConnectionId(1)).unwrap();
            guard.bind_connection(ConnectionId(1)).unwrap();
        }

        let sequence = {
            let session = session.clone();
            tokio::spawn(async move { run_load_sequence(&session, descriptor(), TICK).await })
        };

        tokio::time::sleep(TICK * 2).await;
        session.write().await.stop_all();

        assert_eq!(sequence.await.unwrap(), Ok(WaitOutcome::Abandoned));
        assert_eq!(session.read().await.status(), SessionStatus::Menu);
    }

    #[tokio::test]
    async fn test_load_sequence_requires_host() {
        let session = shared();

        let result = run_load_sequence(&session, descriptor(), TICK).await;

        assert!(matches!(result, Err(SessionError::PreconditionViolation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_end_to_end() {
        let session = shared();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let scheduler = tokio::spawn(run_session_loop(session.clone(), event_rx, command_rx, TICK));

        command_tx.send(SessionCommand::EnterWaitingRoom).unwrap();
        tokio::time::sleep(TICK).await;
        assert_eq!(session.read().await.status(), SessionStatus::WaitingRoom);

        for conn in [1, 2] {
            event_tx
                .send(NetEvent::Connected {
                    connection: ConnectionId(conn),
                    remote_addr: None,
                })
                .unwrap();
            event_tx
                .send(NetEvent::Message {
                    connection: ConnectionId(conn),
                    message: ClientMessage::Ready,
                })
                .unwrap();
        }
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(session.read().await.waiting_room_participants().len(), 2);

        for conn in [1, 2] {
            event_tx
                .send(NetEvent::Message {
                    connection: ConnectionId(conn),
                    message: ClientMessage::SetReady { ready: true },
                })
                .unwrap();
        }
        event_tx
            .send(NetEvent::Message {
                connection: ConnectionId(1),
                message: ClientMessage::RequestStart {
                    level_id: 3,
                    dynamic_placement: true,
                },
            })
            .unwrap();
        tokio::time::sleep(TICK * 3).await;
        assert_eq!(session.read().await.loading_participants().len(), 2);

        for conn in [1, 2] {
            event_tx
                .send(NetEvent::Message {
                    connection: ConnectionId(conn),
                    message: ClientMessage::LoadComplete,
                })
                .unwrap();
        }
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(session.read().await.status(), SessionStatus::Active);

        drop(event_tx);
        drop(command_tx);
        scheduler.await.unwrap();
    }
}
