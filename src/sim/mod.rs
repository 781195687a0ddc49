//! Deterministic scheduling module
//!
//! All scheduler logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (A before B, spawn order per batch)
//! - No rendering or platform dependencies; the outside world is reached
//!   only through the [`World`] trait and the completion gateway

pub mod instances;
pub mod levels;
pub mod mode;
pub mod state;
pub mod tick;

pub use instances::{InstanceRegistry, LiveInstance};
pub use levels::{LEVEL_MAX, LEVEL_MIN, LevelConfig, level_config, phase_levels};
pub use mode::{Coordination, EmitterMode, resolve};
pub use state::{
    CyclePhase, EmitterId, EmitterState, SessionState, StepState, SyncGroup, TrackKind, TrackRef,
    Variant, VariantHistory,
};
pub use tick::{SpawnRequest, World, tick};
