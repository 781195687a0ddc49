//! Per-tick mode and coordination resolution
//!
//! Pure and idempotent: given the two emitter records and the global
//! synchronize toggle, compute each emitter's behavioral mode and the global
//! coordination flags. Nothing here mutates state; the tick loop calls this
//! every tick and only applies the result at safe step boundaries.

use serde::{Deserialize, Serialize};

use super::state::{EmitterId, EmitterState, Variant};

/// Behavioral mode of one emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitterMode {
    /// Base cycling through {1,3,5} / {2,4,6}
    OddEven,
    /// Strict forward progression 1 -> 3
    Forward,
    /// Reverse progression 6 -> 4
    Reverse,
    /// Own forward and reverse tracks stepping in lockstep with each other
    DualTrack,
}

/// Resolved coordination for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordination {
    /// Per-emitter modes, indexed by [`EmitterId::index`].
    /// Ignored while `mega_sync` is set.
    pub modes: [EmitterMode; 2],
    /// Both emitters' matching tracks barrier together
    pub pair_sync: bool,
    /// Four-track joint mode: A/B forward and reverse all join per step
    pub mega_sync: bool,
    /// Partial stack: forward tracks pair while this emitter's spare
    /// reverse track runs solo alongside
    pub partial_extra: Option<EmitterId>,
}

impl Coordination {
    /// Any joint (cross-emitter) coordination active
    #[inline]
    pub fn joint(&self) -> bool {
        self.mega_sync || self.pair_sync
    }
}

/// Resolve the active modes from current selections and history.
///
/// Precedence, first match wins:
/// 1. mega-sync: both emitters have both history flags, sync enabled, both
///    currently enhanced.
/// 2. partial stack: sync enabled, both currently on variant 1, exactly one
///    emitter has both history flags while the other unlocked only variant 1.
/// 3. solo dual-track: both history flags but no qualifying partner.
/// 4. by current variant: 1 -> Forward, 2 -> Reverse, 0 -> OddEven.
pub fn resolve(a: &EmitterState, b: &EmitterState, sync_enabled: bool) -> Coordination {
    let mega_sync = sync_enabled
        && a.history.both()
        && b.history.both()
        && a.variant.is_enhanced()
        && b.variant.is_enhanced();
    if mega_sync {
        // Per-emitter modes are manager-driven and ignored in mega-sync
        return Coordination {
            modes: [EmitterMode::DualTrack, EmitterMode::DualTrack],
            pair_sync: false,
            mega_sync: true,
            partial_extra: None,
        };
    }

    let partial_extra = partial_stack_extra(a, b, sync_enabled);
    if let Some(extra) = partial_extra {
        return Coordination {
            modes: [EmitterMode::Forward, EmitterMode::Forward],
            pair_sync: true,
            mega_sync: false,
            partial_extra: Some(extra),
        };
    }

    let modes = [mode_for(a), mode_for(b)];

    let pair_sync = sync_enabled
        && a.variant == b.variant
        && a.variant.is_enhanced()
        && modes[0] != EmitterMode::DualTrack
        && modes[1] != EmitterMode::DualTrack;

    Coordination {
        modes,
        pair_sync,
        mega_sync: false,
        partial_extra: None,
    }
}

/// Rules 3 and 4 for a single emitter
fn mode_for(e: &EmitterState) -> EmitterMode {
    if e.history.both() {
        return EmitterMode::DualTrack;
    }
    match e.variant {
        Variant::Ascent => EmitterMode::Forward,
        Variant::Descent => EmitterMode::Reverse,
        Variant::Base => EmitterMode::OddEven,
    }
}

/// Rule 2: which emitter, if any, is the partial-stack "extra".
///
/// Requires both emitters currently on variant 1 with sync enabled; the
/// extra has unlocked both variants while the partner unlocked only the
/// first.
fn partial_stack_extra(a: &EmitterState, b: &EmitterState, sync_enabled: bool) -> Option<EmitterId> {
    if !sync_enabled || a.variant != Variant::Ascent || b.variant != Variant::Ascent {
        return None;
    }
    let ascent_only = |e: &EmitterState| e.history.ascent && !e.history.descent;
    if a.history.both() && ascent_only(b) {
        Some(EmitterId::A)
    } else if b.history.both() && ascent_only(a) {
        Some(EmitterId::B)
    } else {
        None
    }
}
