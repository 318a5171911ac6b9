use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::game::constants::{capacity, net, tick};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Waiting-room connection cap
    pub max_connections: usize,
    /// Minimum waiting-room participants before a session may load
    pub min_players: usize,
    /// Scheduler ticks per second
    pub tick_rate: u32,
    /// Port of the metrics endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::DEFAULT_PORT,
            max_connections: capacity::LOBBY_MAX_CONNECTIONS,
            min_players: capacity::MIN_PLAYERS,
            tick_rate: tick::TICK_RATE,
            metrics_port: net::DEFAULT_METRICS_PORT,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDRESS") {
            match addr.parse() {
                Ok(parsed) => config.bind_address = parsed,
                Err(_) => tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr),
            }
        }

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                Ok(_) => tracing::warn!("PORT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Some(max) = lookup("MAX_CONNECTIONS") {
            match max.parse::<usize>() {
                Ok(parsed) if (1..=1024).contains(&parsed) => config.max_connections = parsed,
                Ok(_) => tracing::warn!("MAX_CONNECTIONS must be 1-1024, using default"),
                Err(_) => tracing::warn!("Invalid MAX_CONNECTIONS '{}', using default", max),
            }
        }

        if let Some(min) = lookup("MIN_PLAYERS") {
            match min.parse::<usize>() {
                Ok(parsed) => config.min_players = parsed,
                Err(_) => tracing::warn!("Invalid MIN_PLAYERS '{}', using default", min),
            }
        }

        if let Some(rate) = lookup("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if parsed > 0 && parsed <= tick::MAX_TICK_RATE => {
                    config.tick_rate = parsed
                }
                Ok(_) => tracing::warn!(
                    "TICK_RATE must be 1-{}, using default",
                    tick::MAX_TICK_RATE
                ),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Some(port) = lookup("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.metrics_port = parsed,
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }

        config.tls_cert_path = lookup("TLS_CERT_PATH");
        config.tls_key_path = lookup("TLS_KEY_PATH");

        config
    }

    /// Scheduler tick duration
    pub fn tick_duration(&self) -> Duration {
        crate::game::constants::tick_duration(self.tick_rate)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.min_players > self.max_connections {
            return Err("min_players cannot exceed max_connections".to_string());
        }
        if self.tick_rate == 0 || self.tick_rate > tick::MAX_TICK_RATE {
            return Err(format!("tick_rate must be 1-{}", tick::MAX_TICK_RATE));
        }
        Ok(())
    }
}
