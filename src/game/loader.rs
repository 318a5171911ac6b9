//! Level-load collaborator.
//!
//! The scheduler calls [`LevelLoader::poll`] once per tick after a session
//! starts and raises the level-load-complete notification when progress
//! reaches 1.0.

use tracing::{debug, info};

use crate::game::level::SessionDescriptor;

/// Loads the content for a session descriptor
pub trait LevelLoader: Send + Sync {
    /// Start loading content for `descriptor`, discarding any previous load
    fn begin(&mut self, descriptor: &SessionDescriptor);

    /// Advance loading by one tick and return progress in `[0, 1]`
    fn poll(&mut self) -> f32;

    /// Current progress in `[0, 1]` without advancing
    fn progress(&self) -> f32;

    /// True while a load has been started and not yet completed
    fn is_loading(&self) -> bool;

    /// Abandon the current load
    fn cancel(&mut self);
}

/// Loader for processes without content (dedicated server, tests).
///
/// Completes after a fixed number of ticks.
#[derive(Debug)]
pub struct HeadlessLoader {
    ticks_required: u32,
    ticks_elapsed: u32,
    active: bool,
}

impl HeadlessLoader {
    pub fn new(ticks_required: u32) -> Self {
        Self {
            ticks_required,
            ticks_elapsed: 0,
            active: false,
        }
    }
}

impl Default for HeadlessLoader {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LevelLoader for HeadlessLoader {
    fn begin(&mut self, descriptor: &SessionDescriptor) {
        info!(
            "Loading level '{}' (location: {}, environment: {})",
            descriptor.level.name, descriptor.level.location, descriptor.level.environment
        );
        self.ticks_elapsed = 0;
        self.active = true;
    }

    fn poll(&mut self) -> f32 {
        if self.active && self.ticks_elapsed < self.ticks_required {
            self.ticks_elapsed += 1;
            debug!("Level load progress {:.0}%", self.progress() * 100.0);
        }
        let progress = self.progress();
        if progress >= 1.0 {
            self.active = false;
        }
        progress
    }

    fn progress(&self) -> f32 {
        if self.ticks_required == 0 {
            return 1.0;
        }
        (self.ticks_elapsed as f32 / self.ticks_required as f32).min(1.0)
    }

    fn is_loading(&self) -> bool {
        self.active
    }

    fn cancel(&mut self) {
        self.active = false;
        self.ticks_elapsed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::{LevelData, SessionKind};

    fn descriptor() -> SessionDescriptor {
        SessionDescriptor::new(SessionKind::SinglePlayer, LevelData::default(), false)
    }

    #[test]
    fn test_progress_advances_per_poll() {
        let mut loader = HeadlessLoader::new(4);
        loader.begin(&descriptor());

        assert!(loader.is_loading());
        assert_eq!(loader.poll(), 0.25);
        assert_eq!(loader.poll(), 0.5);
        assert_eq!(loader.poll(), 0.75);
        assert_eq!(loader.poll(), 1.0);
        assert!(!loader.is_loading());
    }

    #[test]
    fn test_progress_stays_in_range() {
        let mut loader = HeadlessLoader::new(1);
        loader.begin(&descriptor());
        for _ in 0..5 {
            let p = loader.poll();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_cancel() {
        let mut loader = HeadlessLoader::new(3);
        loader.begin(&descriptor());
        loader.poll();
        loader.cancel();

        assert!(!loader.is_loading());
        assert_eq!(loader.progress(), 0.0);
    }

    #[test]
    fn test_zero_ticks_completes_immediately() {
        let mut loader = HeadlessLoader::new(0);
        loader.begin(&descriptor());
        assert_eq!(loader.poll(), 1.0);
    }
}
