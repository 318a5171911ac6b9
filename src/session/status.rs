use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide session status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Main menu; the offline flow assigns loading participants directly
    #[default]
    Menu,
    /// Lobby: participants gather and ready up
    WaitingRoom,
    /// Level content is loading
    Loading,
    /// Session is live
    Active,
}

impl SessionStatus {
    /// Numeric code for metrics
    pub fn code(&self) -> u64 {
        match self {
            SessionStatus::Menu => 0,
            SessionStatus::WaitingRoom => 1,
            SessionStatus::Loading => 2,
            SessionStatus::Active => 3,
        }
    }

    /// Statuses a load sequence may begin from
    pub fn can_begin_loading(&self) -> bool {
        matches!(self, SessionStatus::Menu | SessionStatus::WaitingRoom)
    }

    /// Statuses the host may (re)open the waiting room from
    pub fn can_enter_waiting_room(&self) -> bool {
        matches!(self, SessionStatus::Menu | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Menu => "menu",
            SessionStatus::WaitingRoom => "waiting-room",
            SessionStatus::Loading => "loading",
            SessionStatus::Active => "active",
        };
        f.write_str(name)
    }
}

/// Role of this process in the network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// Not hosting and not joined
    #[default]
    Offline,
    /// Authoritative: admits connections and drives transitions
    Host,
    /// Joined a remote host; follows its broadcasts
    Client,
}

impl NetworkMode {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, NetworkMode::Host)
    }
}
