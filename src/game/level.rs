//! Level catalogue and the session descriptor broadcast at session start.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::constants::placement;
use crate::game::world::Transform;
use crate::util::vec3::Vec3;

/// Whether the session is played alone or with other participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    SinglePlayer,
    Multiplayer,
}

/// Game rules attached to a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    TimeTrial,
    FreeRoam,
}

/// Content description of a level, sent verbatim in the start message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    pub name: String,
    pub game_type: GameType,
    /// Location content to load
    pub location: String,
    /// Environment content to load
    pub environment: String,
    pub terrain_seed: String,
    pub start_position: Vec3,
    /// Euler angles in degrees
    pub start_rotation: Vec3,
}

impl Default for LevelData {
    fn default() -> Self {
        Self {
            name: String::new(),
            game_type: GameType::FreeRoam,
            location: "space".to_string(),
            environment: "planet-orbit-bottom-day".to_string(),
            terrain_seed: String::new(),
            start_position: Vec3::ZERO,
            start_rotation: Vec3::ZERO,
        }
    }
}

/// Built-in level entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub id: u32,
    pub name: &'static str,
    pub slug: &'static str,
    pub game_type: GameType,
}

const LEVELS: [Level; 9] = [
    Level { id: 0, name: "A Gentle Start", slug: "a-gentle-start", game_type: GameType::TimeTrial },
    Level { id: 1, name: "Around The Block", slug: "around-the-block", game_type: GameType::TimeTrial },
    Level { id: 2, name: "Hold on to your stomach", slug: "hold-on-to-your-stomach", game_type: GameType::TimeTrial },
    Level { id: 3, name: "Around the station", slug: "around-the-station", game_type: GameType::TimeTrial },
    Level { id: 4, name: "Speed is Only Half the Battle", slug: "speed-is-only-half-the-battle", game_type: GameType::TimeTrial },
    Level { id: 5, name: "You Might Wanna Hold Back a Bit", slug: "you-might-wanna-hold-back-a-bit", game_type: GameType::TimeTrial },
    Level { id: 6, name: "Death Valley", slug: "death-valley", game_type: GameType::TimeTrial },
    Level { id: 7, name: "You Have Headlights, Right?", slug: "you-have-headlights-right", game_type: GameType::TimeTrial },
    Level { id: 8, name: "Limiter Mastery", slug: "limiter-mastery", game_type: GameType::TimeTrial },
];

impl Level {
    /// All built-in levels in catalogue order
    pub fn list() -> &'static [Level] {
        &LEVELS
    }

    pub fn from_id(id: u32) -> Option<Level> {
        LEVELS.iter().find(|level| level.id == id).copied()
    }

    pub fn from_slug(slug: &str) -> Option<Level> {
        LEVELS.iter().find(|level| level.slug == slug).copied()
    }

    /// Level content for this catalogue entry.
    ///
    /// Content files live with the client; the server only needs the
    /// identifiers, so location and environment are derived from the slug.
    pub fn data(&self) -> LevelData {
        LevelData {
            name: self.name.to_string(),
            game_type: self.game_type,
            location: self.slug.to_string(),
            environment: format!("{}-environment", self.slug),
            terrain_seed: String::new(),
            start_position: Vec3::ZERO,
            start_rotation: Vec3::ZERO,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.slug)
    }
}

/// Immutable session start payload: `{session_kind, level, dynamic_placement}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_kind: SessionKind,
    pub level: LevelData,
    /// Choose starting positions per participant instead of using the level start for everyone
    pub dynamic_placement: bool,
}

impl SessionDescriptor {
    pub fn new(session_kind: SessionKind, level: LevelData, dynamic_placement: bool) -> Self {
        Self {
            session_kind,
            level,
            dynamic_placement,
        }
    }

    /// Starting transform for the participant at `index` in spawn order
    pub fn spawn_transform(&self, index: usize) -> Transform {
        let position = if self.dynamic_placement {
            self.level.start_position + Vec3::RIGHT * (placement::SPAWN_SPACING * index as f32)
        } else {
            self.level.start_position
        };

        Transform {
            position,
            rotation: self.level.start_rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_lookup() {
        assert_eq!(Level::list().len(), 9);
        assert_eq!(Level::from_id(6).map(|l| l.slug), Some("death-valley"));
        assert_eq!(Level::from_slug("limiter-mastery").map(|l| l.id), Some(8));
        assert!(Level::from_id(42).is_none());
        assert!(Level::from_slug("nowhere").is_none());
    }

    #[test]
    fn test_level_data() {
        let level = Level::from_id(0).unwrap();
        let data = level.data();
        assert_eq!(data.name, "A Gentle Start");
        assert_eq!(data.location, "a-gentle-start");
        assert_eq!(data.game_type, GameType::TimeTrial);
    }

    #[test]
    fn test_fixed_spawn_transform() {
        let mut level = LevelData::default();
        level.start_position = Vec3::new(5.0, 10.0, 0.0);
        level.start_rotation = Vec3::new(0.0, 90.0, 0.0);
        let descriptor = SessionDescriptor::new(SessionKind::Multiplayer, level, false);

        let first = descriptor.spawn_transform(0);
        let third = descriptor.spawn_transform(2);
        assert_eq!(first, third);
        assert_eq!(first.position, Vec3::new(5.0, 10.0, 0.0));
        assert_eq!(first.rotation, Vec3::new(0.0, 90.0, 0.0));
    }

    #[test]
    fn test_dynamic_spawn_transform() {
        let descriptor = SessionDescriptor::new(SessionKind::Multiplayer, LevelData::default(), true);

        let first = descriptor.spawn_transform(0);
        let second = descriptor.spawn_transform(1);
        assert_ne!(first.position, second.position);
        assert_eq!(second.position, first.position + Vec3::RIGHT * placement::SPAWN_SPACING);
    }
}
