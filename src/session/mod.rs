pub mod error;
pub mod events;
pub mod manager;
pub mod readiness;
pub mod role;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod transition;

pub use error::SessionError;
pub use manager::SessionManager;
pub use scheduler::{SessionCommand, SharedSession};
pub use status::{NetworkMode, SessionStatus};
