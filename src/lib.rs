//! Session Server Library
//!
//! Hosts a multiplayer waiting room over WebTransport and moves each
//! connection through its roles: waiting room, loading, active.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
pub mod session;
