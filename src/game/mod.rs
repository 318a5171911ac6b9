pub mod constants;
pub mod level;
pub mod loader;
pub mod world;
