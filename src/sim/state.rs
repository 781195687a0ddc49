//! Session state and core scheduler types
//!
//! All state that must be persisted for Continue/determinism lives here.
//! The tick loop in [`super::tick`] mutates it; nothing here talks to the
//! outside world.

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::instances::InstanceRegistry;
use crate::consts::secs_to_ticks;
use crate::settings::Settings;
use crate::sim::levels::{FORWARD_START, FORWARD_TERMINAL, REVERSE_START, REVERSE_TERMINAL};

/// One of the two orbital emitters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmitterId {
    A,
    B,
}

impl EmitterId {
    /// Both emitters, iteration order A then B
    pub const ALL: [EmitterId; 2] = [EmitterId::A, EmitterId::B];

    /// Stable array index
    #[inline]
    pub fn index(self) -> usize {
        match self {
            EmitterId::A => 0,
            EmitterId::B => 1,
        }
    }

    /// The partner emitter
    #[inline]
    pub fn other(self) -> EmitterId {
        match self {
            EmitterId::A => EmitterId::B,
            EmitterId::B => EmitterId::A,
        }
    }
}

/// Externally-selected enhancement variant for an emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Variant {
    /// Unenhanced odd/even cycling
    #[default]
    Base,
    /// Variant 1: strict forward progression 1 -> 3
    Ascent,
    /// Variant 2: reverse progression 6 -> 4
    Descent,
}

impl Variant {
    /// True for either enhanced variant
    #[inline]
    pub fn is_enhanced(self) -> bool {
        self != Variant::Base
    }
}

/// Permanent record of which variants were ever selected this session.
///
/// Flags are monotonic: once set they survive any later variant change and
/// clear only on a full session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantHistory {
    pub ascent: bool,
    pub descent: bool,
}

impl VariantHistory {
    /// Record the currently selected variant
    pub fn observe(&mut self, variant: Variant) {
        match variant {
            Variant::Base => {}
            Variant::Ascent => self.ascent = true,
            Variant::Descent => self.descent = true,
        }
    }

    /// Both variants unlocked at some point
    #[inline]
    pub fn both(self) -> bool {
        self.ascent && self.descent
    }
}

/// Lifecycle phase of an emitter's cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CyclePhase {
    /// No batch yet, or the track halted
    #[default]
    Idle,
    /// Batch live, barrier-waiting for its instances to drain
    Spawning,
    /// Batch drained, downtime timer running
    WaitingDowntime,
}

/// Which level cursor a step participant uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    /// Forward cursor, 1..=3
    Forward,
    /// Reverse cursor, 6..=4
    Reverse,
}

/// One (emitter, cursor) participant of a step group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub emitter: EmitterId,
    pub track: TrackKind,
}

impl TrackRef {
    pub const fn new(emitter: EmitterId, track: TrackKind) -> Self {
        Self { emitter, track }
    }
}

/// Per-emitter progression record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterState {
    /// Variant sampled from the progression source this tick
    pub variant: Variant,
    /// Permanent selection history
    pub history: VariantHistory,
    /// Forward cursor, 1..=3
    pub forward_level: u8,
    /// Reverse cursor, 6..=4
    pub reverse_level: u8,
    /// Odd set {1,3,5} vs even set {2,4,6} in the base mode
    pub odd_phase: bool,
    /// Units spawned by the current step
    pub active_count: u32,
    /// Units that reported orbit completion this step
    pub completed_count: u32,
    /// True from batch spawn until the downtime timer is scheduled
    pub awaiting_downtime: bool,
    /// Earliest tick the next batch may spawn
    pub next_spawn_deadline: u64,
    /// Lifecycle phase
    pub phase: CyclePhase,
    /// Forward track reached its terminal with looping disabled
    pub forward_halted: bool,
    /// Reverse track reached its terminal with looping disabled
    pub reverse_halted: bool,
}

impl Default for EmitterState {
    fn default() -> Self {
        Self {
            variant: Variant::Base,
            history: VariantHistory::default(),
            forward_level: FORWARD_START,
            reverse_level: REVERSE_START,
            odd_phase: true,
            active_count: 0,
            completed_count: 0,
            awaiting_downtime: false,
            next_spawn_deadline: 0,
            phase: CyclePhase::Idle,
            forward_halted: false,
            reverse_halted: false,
        }
    }
}

impl EmitterState {
    /// Current level of the given cursor
    #[inline]
    pub fn level_of(&self, track: TrackKind) -> u8 {
        match track {
            TrackKind::Forward => self.forward_level,
            TrackKind::Reverse => self.reverse_level,
        }
    }

    /// True when the given cursor halted at its terminal level
    #[inline]
    pub fn halted(&self, track: TrackKind) -> bool {
        match track {
            TrackKind::Forward => self.forward_halted,
            TrackKind::Reverse => self.reverse_halted,
        }
    }

    /// Advance the forward cursor: +1, wrapping 3 -> 1 when looping,
    /// otherwise holding at 3 and halting.
    pub fn advance_forward(&mut self, looping: bool) {
        if self.forward_level >= FORWARD_TERMINAL {
            if looping {
                self.forward_level = FORWARD_START;
            } else {
                self.forward_halted = true;
            }
        } else {
            self.forward_level += 1;
        }
    }

    /// Advance the reverse cursor: -1, wrapping 4 -> 6 when looping,
    /// otherwise holding at 4 and halting.
    pub fn advance_reverse(&mut self, looping: bool) {
        if self.reverse_level <= REVERSE_TERMINAL {
            if looping {
                self.reverse_level = REVERSE_START;
            } else {
                self.reverse_halted = true;
            }
        } else {
            self.reverse_level -= 1;
        }
    }

    /// Begin a new step: counters reset per batch, lifecycle to Spawning
    pub fn begin_step(&mut self) {
        self.active_count = 0;
        self.completed_count = 0;
        self.awaiting_downtime = true;
        self.phase = CyclePhase::Spawning;
    }

    /// Reset cursors and step bookkeeping to canonical start.
    /// History flags survive; only the full session reset clears those.
    pub fn reset_tracks(&mut self, now: u64) {
        self.forward_level = FORWARD_START;
        self.reverse_level = REVERSE_START;
        self.odd_phase = true;
        self.active_count = 0;
        self.completed_count = 0;
        self.awaiting_downtime = false;
        self.next_spawn_deadline = now;
        self.phase = CyclePhase::Idle;
        self.forward_halted = false;
        self.reverse_halted = false;
    }
}

/// Step-group state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    /// May plan and spawn a new step
    Ready,
    /// Mid-step, staggered odd/even ring spawns still pending
    Staggering,
    /// Barrier wait: polling live counts until the step's batches drain
    Draining,
    /// Downtime timer running until the given tick
    Cooldown { until: u64 },
    /// Every member track halted at its terminal level
    Halted,
}

/// A set of tracks stepping in lockstep: spawn together, join on completion,
/// share the max downtime, then advance every member cursor.
///
/// Solo modes are single-member groups; pairwise sync pairs the matching
/// tracks of both emitters; mega-sync is the one four-member group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncGroup {
    pub members: Vec<TrackRef>,
    /// Single-member odd/even set semantics (staggered 3-ring batch,
    /// phase flip instead of cursor advance)
    pub odd_even: bool,
    pub state: StepState,
    /// (emitter, level) batches live this step; drives the join and the
    /// max-downtime rule
    pub spawned: Vec<(EmitterId, u8)>,
    /// Staggered ring spawns not yet fired
    pub pending: Vec<(EmitterId, u8)>,
    /// Tick the next pending ring fires at
    pub stagger_at: u64,
    /// Tick the barrier wait began, for stall detection
    pub drain_started: u64,
    /// Stall warning already logged for this step
    pub stall_warned: bool,
}

impl SyncGroup {
    pub fn new(members: Vec<TrackRef>, odd_even: bool, state: StepState) -> Self {
        Self {
            members,
            odd_even,
            state,
            spawned: Vec::new(),
            pending: Vec::new(),
            stagger_at: 0,
            drain_started: 0,
            stall_warned: false,
        }
    }

    /// Emitters participating in this group, deduplicated
    pub fn emitters(&self) -> Vec<EmitterId> {
        let mut out: Vec<EmitterId> = Vec::with_capacity(2);
        for m in &self.members {
            if !out.contains(&m.emitter) {
                out.push(m.emitter);
            }
        }
        out
    }

    /// A group is at a step boundary when no batch is mid-flight
    #[inline]
    pub fn at_boundary(&self) -> bool {
        matches!(
            self.state,
            StepState::Ready | StepState::Cooldown { .. } | StepState::Halted
        )
    }
}

/// RNG state wrapper for serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Deterministic per-batch stream: the same session seed, tick, emitter
    /// and level always jitter spawn angles identically.
    pub fn batch_rng(&self, now: u64, emitter: EmitterId, level: u8) -> Pcg32 {
        let mix = self
            .seed
            .wrapping_add(now.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add((emitter.index() as u64) << 32)
            .wrapping_add(level as u64);
        Pcg32::seed_from_u64(mix)
    }
}

/// Complete scheduler session state (deterministic, serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Run seed for reproducibility
    pub seed: u64,
    /// RNG state
    pub rng_state: RngState,
    /// Scheduler tick counter
    pub time_ticks: u64,
    /// The two emitter records, indexed by [`EmitterId::index`]
    pub emitters: [EmitterState; 2],
    /// Global synchronize toggle
    pub sync_enabled: bool,
    /// Global pause flag (alongside the polled boss-event signal)
    pub paused: bool,
    /// Forward tracks wrap 3 -> 1 instead of halting
    pub loop_forward: bool,
    /// Reverse tracks wrap 4 -> 6 instead of halting
    pub loop_reverse: bool,
    /// Delay between staggered odd/even ring spawns, in ticks
    pub stagger_ticks: u64,
    /// Barrier stall warning threshold, in ticks
    pub stall_warn_ticks: u64,
    /// Live-instance registry (orbit completion gateway)
    pub registry: InstanceRegistry,
    /// Active step groups
    pub groups: Vec<SyncGroup>,
    /// Mega-sync's one-time re-initialization already ran this session
    pub mega_initialized: bool,
    /// Mega-sync entered but still draining pre-existing instances
    pub mega_reset_pending: bool,
    /// Variant-change hint: re-check group composition this tick
    pub recompose_hint: bool,
}

impl SessionState {
    /// Create a new session with the given seed and settings
    pub fn new(seed: u64, settings: &Settings) -> Self {
        Self {
            seed,
            rng_state: RngState::new(seed),
            time_ticks: 0,
            emitters: [EmitterState::default(), EmitterState::default()],
            sync_enabled: settings.sync_enabled,
            paused: false,
            loop_forward: settings.loop_forward,
            loop_reverse: settings.loop_reverse,
            stagger_ticks: secs_to_ticks(settings.odd_even_stagger_secs.max(0.0)),
            stall_warn_ticks: secs_to_ticks(settings.stall_warn_secs.max(0.0)),
            registry: InstanceRegistry::default(),
            groups: Vec::new(),
            mega_initialized: false,
            mega_reset_pending: false,
            recompose_hint: false,
        }
    }

    /// Session with default settings (tests, demo)
    pub fn with_seed(seed: u64) -> Self {
        Self::new(seed, &Settings::default())
    }

    /// Shared emitter accessor
    #[inline]
    pub fn emitter(&self, id: EmitterId) -> &EmitterState {
        &self.emitters[id.index()]
    }

    /// Mutable emitter accessor
    #[inline]
    pub fn emitter_mut(&mut self, id: EmitterId) -> &mut EmitterState {
        &mut self.emitters[id.index()]
    }

    /// Toggle the global synchronize flag; takes effect at the next safe
    /// step boundary like any other mode input.
    pub fn set_sync_enabled(&mut self, enabled: bool) {
        self.sync_enabled = enabled;
        self.recompose_hint = true;
    }

    /// Set/clear the global pause flag (boss events use the polled signal)
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Optional hint that the externally-selected variant changed.
    /// Purely an optimization: resolution runs every tick regardless.
    pub fn on_variant_changed(&mut self) {
        self.recompose_hint = true;
    }

    /// Clear all tracked live instances and reset every cursor to canonical
    /// start. Used after an external board-clearing event. History flags and
    /// the mega-sync latch survive.
    pub fn force_reset_all_tracks(&mut self) {
        let cleared = self.registry.clear();
        if cleared > 0 {
            log::info!("force reset: discarded {cleared} live instances");
        }
        let now = self.time_ticks;
        for emitter in &mut self.emitters {
            emitter.reset_tracks(now);
        }
        self.groups.clear();
        self.mega_reset_pending = false;
        self.recompose_hint = true;
    }

    /// Full run reset: tracks plus the session-lifetime records (variant
    /// history, mega-sync latch).
    pub fn reset_session(&mut self) {
        self.force_reset_all_tracks();
        for emitter in &mut self.emitters {
            emitter.history = VariantHistory::default();
            emitter.variant = Variant::Base;
        }
        self.mega_initialized = false;
    }

    /// Consistency check: batch counters never run backwards
    #[inline]
    pub fn counters_consistent(&self) -> bool {
        self.emitters
            .iter()
            .all(|e| e.completed_count <= e.active_count)
    }
}
