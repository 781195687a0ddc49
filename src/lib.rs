//! Twin Orbit - twin orbital-emitter wave scheduler
//!
//! Core modules:
//! - `sim`: Deterministic scheduling core (levels, mode resolution, the tick loop)
//! - `settings`: Data-driven session tuning
//!
//! Two emitters (A and B) repeatedly spawn rings of short-lived orbiting
//! entities at one of six escalating levels. The crate owns the progression
//! and synchronization scheduling only; orbit motion, collision, and
//! presentation belong to the embedding game and talk to the scheduler
//! through the [`sim::World`] trait and the orbit completion gateway.

pub mod settings;
pub mod sim;

pub use settings::Settings;
pub use sim::{EmitterId, SessionState, Variant, World};

use glam::Vec2;

/// Scheduler timing and batch constants
pub mod consts {
    /// Fixed simulation rate (60 Hz scheduler ticks)
    pub const TICKS_PER_SEC: u32 = 60;

    /// Orbiting units spawned per level batch
    pub const UNITS_PER_BATCH: u32 = 3;

    /// Delay between the three staggered ring spawns of an odd/even set
    pub const ODD_EVEN_STAGGER_SECS: f32 = 0.5;

    /// Barrier waits past this log a stall warning (but never abort)
    pub const STALL_WARN_SECS: f32 = 10.0;

    /// Convert a seconds-valued delay to whole scheduler ticks (rounded up)
    pub fn secs_to_ticks(secs: f32) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        (secs * TICKS_PER_SEC as f32).ceil() as u64
    }
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}
