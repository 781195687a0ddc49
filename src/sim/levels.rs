//! Static per-level ring configuration
//!
//! Six escalating levels, keyed 1..=6. Looked up by the scheduler (downtime)
//! and by the embedding game's orbit renderer (radius/arc/tilt). Never
//! mutated.

use serde::{Deserialize, Serialize};

/// Lowest ring level
pub const LEVEL_MIN: u8 = 1;
/// Highest ring level
pub const LEVEL_MAX: u8 = 6;

/// Forward-track cursor range is 1..=3
pub const FORWARD_TERMINAL: u8 = 3;
/// Reverse-track cursor range is 4..=6
pub const REVERSE_TERMINAL: u8 = 4;
/// Canonical forward cursor start
pub const FORWARD_START: u8 = 1;
/// Canonical reverse cursor start
pub const REVERSE_START: u8 = 6;

/// Immutable parameters for a single ring level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Orbit radius in world units
    pub radius: f32,
    /// Rest period after the level's batch fully completes
    pub downtime_secs: f32,
    /// Extra arc traveled beyond a full circle before an orbit completes
    pub arc_extension_deg: f32,
    /// Orbit plane tilt handed to the spawn factory
    pub tilt_deg: f32,
}

/// The level table, index 0 = level 1
const LEVEL_TABLE: [LevelConfig; 6] = [
    LevelConfig {
        radius: 120.0,
        downtime_secs: 2.0,
        arc_extension_deg: 0.0,
        tilt_deg: 0.0,
    },
    LevelConfig {
        radius: 170.0,
        downtime_secs: 3.0,
        arc_extension_deg: 30.0,
        tilt_deg: 6.0,
    },
    LevelConfig {
        radius: 220.0,
        downtime_secs: 4.0,
        arc_extension_deg: 60.0,
        tilt_deg: 12.0,
    },
    LevelConfig {
        radius: 270.0,
        downtime_secs: 5.0,
        arc_extension_deg: 90.0,
        tilt_deg: 18.0,
    },
    LevelConfig {
        radius: 320.0,
        downtime_secs: 6.0,
        arc_extension_deg: 120.0,
        tilt_deg: 24.0,
    },
    LevelConfig {
        radius: 370.0,
        downtime_secs: 7.0,
        arc_extension_deg: 150.0,
        tilt_deg: 30.0,
    },
];

/// Look up the configuration for a level in 1..=6.
///
/// Out-of-range levels are a programmer error; release builds clamp.
#[inline]
pub fn level_config(level: u8) -> &'static LevelConfig {
    debug_assert!(
        (LEVEL_MIN..=LEVEL_MAX).contains(&level),
        "level {level} out of range"
    );
    let idx = (level.clamp(LEVEL_MIN, LEVEL_MAX) - 1) as usize;
    &LEVEL_TABLE[idx]
}

/// The three levels of an odd/even set
#[inline]
pub fn phase_levels(odd_phase: bool) -> [u8; 3] {
    if odd_phase { [1, 3, 5] } else { [2, 4, 6] }
}
