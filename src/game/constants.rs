/// Scheduler tick constants
pub mod tick {
    /// Session scheduler ticks per second
    pub const TICK_RATE: u32 = 30;
    /// Duration of one tick in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Upper bound accepted from configuration
    pub const MAX_TICK_RATE: u32 = 240;
}

/// Admission limits
pub mod capacity {
    /// Default waiting-room connection cap
    pub const LOBBY_MAX_CONNECTIONS: usize = 16;
    /// Connection cap of the single-participant offline host
    pub const OFFLINE_MAX_CONNECTIONS: usize = 1;
    /// Minimum waiting-room participants before a session may load
    pub const MIN_PLAYERS: usize = 2;
}

pub mod net {
    /// Maximum reliable message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Default WebTransport port
    pub const DEFAULT_PORT: u16 = 4433;
    /// Default metrics endpoint port
    pub const DEFAULT_METRICS_PORT: u16 = 9090;
}

/// Start placement for active participants
pub mod placement {
    /// Distance between participants when starting positions are chosen dynamically
    pub const SPAWN_SPACING: f32 = 10.0;
}

/// Get the scheduler tick duration for a tick rate
pub fn tick_duration(tick_rate: u32) -> std::time::Duration {
    std::time::Duration::from_millis(1000 / tick_rate.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_rate() {
        assert_eq!(tick::TICK_RATE, 30);
        assert_eq!(tick::TICK_DURATION_MS, 33);
    }

    #[test]
    fn test_tick_duration() {
        assert_eq!(tick_duration(10).as_millis(), 100);
        // Zero is clamped rather than dividing by zero
        assert_eq!(tick_duration(0).as_millis(), 1000);
    }

    #[test]
    fn test_capacity_defaults() {
        assert!(capacity::MIN_PLAYERS <= capacity::LOBBY_MAX_CONNECTIONS);
        assert_eq!(capacity::OFFLINE_MAX_CONNECTIONS, 1);
    }
}
