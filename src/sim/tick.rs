//! Fixed timestep scheduler tick
//!
//! The scheduling loop that advances both emitters deterministically. Each
//! step group runs a small state machine: plan and spawn the step's level
//! batches, barrier-wait until every participating batch drains, apply the
//! max downtime among the spawned levels, advance the cursors, repeat.
//!
//! The original cooperative cycles become these explicit states driven by a
//! single [`tick`] call; timer waits and barrier polls are per-tick checks
//! instead of suspension points.

use std::f32::consts::TAU;

use rand::Rng;

use super::levels::{level_config, phase_levels};
use super::mode::{self, Coordination, EmitterMode};
use super::state::{
    CyclePhase, EmitterId, SessionState, StepState, SyncGroup, TrackKind, TrackRef, Variant,
};
use crate::consts::{UNITS_PER_BATCH, secs_to_ticks};
use crate::normalize_angle;

/// External collaborators of the scheduler, consulted once per tick.
///
/// The embedding game supplies the spawn factory, the variant/progression
/// source, and the boss-event pause signal.
pub trait World {
    /// Currently selected enhancement variant for an emitter
    fn current_variant(&self, emitter: EmitterId) -> Variant;

    /// Instantiate one orbiting unit; the returned handle is tracked by the
    /// completion gateway until the unit finishes or is destroyed.
    fn spawn(&mut self, req: SpawnRequest) -> u32;

    /// Boss-event pause: suspends new spawning, in-flight batches drain
    fn boss_event_active(&self) -> bool;
}

/// Parameters handed to the external spawn factory for one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub emitter: EmitterId,
    pub level: u8,
    /// Starting angle around the ring, radians in [-π, π)
    pub angle_offset: f32,
    /// Orbit plane tilt from the level table
    pub tilt_deg: f32,
}

/// Advance the scheduler by one fixed timestep
pub fn tick(state: &mut SessionState, world: &mut dyn World) {
    state.time_ticks += 1;
    let now = state.time_ticks;

    // Sample variant selections. History flags update immediately; the mode
    // itself only takes effect at the next safe step boundary.
    for id in EmitterId::ALL {
        let variant = world.current_variant(id);
        let emitter = state.emitter_mut(id);
        emitter.variant = variant;
        emitter.history.observe(variant);
    }

    let coord = mode::resolve(
        state.emitter(EmitterId::A),
        state.emitter(EmitterId::B),
        state.sync_enabled,
    );

    mega_sync_gate(state, &coord, now);
    recompose_groups(state, &coord);
    state.recompose_hint = false;

    let hold_spawns = state.paused || world.boss_event_active() || state.mega_reset_pending;

    // Groups are detached while stepping so the step logic can borrow the
    // rest of the session freely.
    let mut groups = std::mem::take(&mut state.groups);
    for group in &mut groups {
        step_group(state, group, world, now, hold_spawns);
    }
    state.groups = groups;

    debug_assert!(state.counters_consistent());
}

/// First-time mega-sync activation: hold spawning until every live instance
/// from either emitter is gone, then reset both cursors to canonical start.
/// The latch keeps this from ever re-running within a session.
fn mega_sync_gate(state: &mut SessionState, coord: &Coordination, now: u64) {
    if !coord.mega_sync {
        state.mega_reset_pending = false;
        return;
    }
    if state.mega_initialized {
        return;
    }
    if !state.mega_reset_pending {
        state.mega_reset_pending = true;
        log::info!("mega-sync unlocked, draining live instances before the combined cycle");
    }
    let all_bounded = state.groups.iter().all(|g| g.at_boundary());
    if all_bounded && state.registry.live_total() == 0 {
        for id in EmitterId::ALL {
            state.emitter_mut(id).reset_tracks(now);
        }
        state.groups.clear();
        state.mega_initialized = true;
        state.mega_reset_pending = false;
        log::info!("mega-sync initialized, cursors reset to canonical 1/6");
    }
}

/// Desired step-group composition for the resolved coordination.
/// Groupings are disjoint track-wise; order is stable (A before B).
fn desired_groups(coord: &Coordination) -> Vec<(Vec<TrackRef>, bool)> {
    use EmitterId::{A, B};
    use TrackKind::{Forward, Reverse};

    if coord.mega_sync {
        return vec![(
            vec![
                TrackRef::new(A, Forward),
                TrackRef::new(A, Reverse),
                TrackRef::new(B, Forward),
                TrackRef::new(B, Reverse),
            ],
            false,
        )];
    }

    if let Some(extra) = coord.partial_extra {
        return vec![
            (
                vec![TrackRef::new(A, Forward), TrackRef::new(B, Forward)],
                false,
            ),
            (vec![TrackRef::new(extra, Reverse)], false),
        ];
    }

    if coord.pair_sync {
        let track = if coord.modes[0] == EmitterMode::Reverse {
            Reverse
        } else {
            Forward
        };
        return vec![(
            vec![TrackRef::new(A, track), TrackRef::new(B, track)],
            false,
        )];
    }

    let mut out = Vec::with_capacity(2);
    for id in EmitterId::ALL {
        let grouping = match coord.modes[id.index()] {
            EmitterMode::OddEven => (vec![TrackRef::new(id, Forward)], true),
            EmitterMode::Forward => (vec![TrackRef::new(id, Forward)], false),
            EmitterMode::Reverse => (vec![TrackRef::new(id, Reverse)], false),
            EmitterMode::DualTrack => (
                vec![TrackRef::new(id, Forward), TrackRef::new(id, Reverse)],
                false,
            ),
        };
        out.push(grouping);
    }
    out
}

/// Re-form step groups toward the desired composition.
///
/// A changed grouping is adopted only when every current group owning one of
/// its tracks is at a step boundary; mid-flight batches always finish first.
/// Pending downtime carries into the new group through the emitters'
/// `next_spawn_deadline`, so recomposition can never shortcut a cooldown.
fn recompose_groups(state: &mut SessionState, coord: &Coordination) {
    if state.mega_reset_pending {
        return;
    }

    let desired = desired_groups(coord);
    let now = state.time_ticks;
    let mut old = std::mem::take(&mut state.groups);
    let mut next: Vec<SyncGroup> = Vec::with_capacity(desired.len());

    for (members, odd_even) in desired {
        // Exact match keeps running untouched, whatever its state
        if let Some(pos) = old
            .iter()
            .position(|g| g.members == members && g.odd_even == odd_even)
        {
            next.push(old.swap_remove(pos));
            continue;
        }

        let overlaps = |g: &SyncGroup| g.members.iter().any(|m| members.contains(m));
        let blocked = old.iter().any(|g| overlaps(g) && !g.at_boundary())
            || next.iter().any(|g| overlaps(g));
        if blocked {
            // Deferred: keep the overlapping groups running as they are
            let mut i = 0;
            while i < old.len() {
                if overlaps(&old[i]) {
                    next.push(old.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            continue;
        }

        // All overlapping groups are at a boundary: retire them and form the
        // new grouping, honoring any downtime still owed.
        old.retain(|g| !overlaps(g));
        let until = members
            .iter()
            .map(|m| state.emitter(m.emitter).next_spawn_deadline)
            .max()
            .unwrap_or(now);
        let init = if until > now {
            StepState::Cooldown { until }
        } else {
            StepState::Ready
        };
        next.push(SyncGroup::new(members, odd_even, init));
    }

    // Leftovers cover tracks nothing wants anymore: drop at the boundary,
    // keep draining otherwise.
    for g in old {
        if !g.at_boundary() {
            next.push(g);
        }
    }
    state.groups = next;
}

/// Drive one step group's state machine for this tick
fn step_group(
    state: &mut SessionState,
    group: &mut SyncGroup,
    world: &mut dyn World,
    now: u64,
    hold_spawns: bool,
) {
    match group.state {
        StepState::Ready => {
            if hold_spawns {
                return;
            }
            begin_group_step(state, group, world, now);
        }

        StepState::Staggering => {
            if hold_spawns || now < group.stagger_at {
                return;
            }
            let batch = group.pending.remove(0);
            spawn_batch(state, world, now, batch.0, batch.1);
            group.spawned.push(batch);
            if group.pending.is_empty() {
                group.state = StepState::Draining;
                group.drain_started = now;
            } else {
                group.stagger_at = now + state.stagger_ticks;
            }
        }

        StepState::Draining => {
            // Barrier: poll live counts directly, never the step counters.
            // Externally destroyed instances leave the counters behind; the
            // registry stays truthful.
            let live: usize = group
                .spawned
                .iter()
                .map(|(e, l)| state.registry.live_count_at(*e, *l))
                .sum();
            if live == 0 {
                finish_group_drain(state, group, now);
            } else if !group.stall_warned
                && state.stall_warn_ticks > 0
                && now.saturating_sub(group.drain_started) >= state.stall_warn_ticks
            {
                // Policy: warn but keep waiting forever. Two waves may never
                // overlap, even at the cost of a hang.
                log::warn!(
                    "barrier wait stalled: {live} live instances after {} ticks (step {:?})",
                    now - group.drain_started,
                    group.spawned,
                );
                group.stall_warned = true;
            }
        }

        StepState::Cooldown { until } => {
            if now < until {
                return;
            }
            // Groups seeded in Cooldown by recomposition have not spawned a
            // step yet; their cursors stay put until a real step completes.
            if !group.odd_even && !group.spawned.is_empty() {
                for m in &group.members {
                    if state.emitter(m.emitter).halted(m.track) {
                        continue;
                    }
                    match m.track {
                        TrackKind::Forward => {
                            let looping = state.loop_forward;
                            state.emitter_mut(m.emitter).advance_forward(looping);
                        }
                        TrackKind::Reverse => {
                            let looping = state.loop_reverse;
                            state.emitter_mut(m.emitter).advance_reverse(looping);
                        }
                    }
                }
            }
            for e in group.emitters() {
                state.emitter_mut(e).phase = CyclePhase::Idle;
            }
            group.state = StepState::Ready;
        }

        StepState::Halted => {}
    }
}

/// Plan and spawn the batches of a fresh step
fn begin_group_step(
    state: &mut SessionState,
    group: &mut SyncGroup,
    world: &mut dyn World,
    now: u64,
) {
    let mut batches: Vec<(EmitterId, u8)> = Vec::with_capacity(group.members.len().max(3));
    if group.odd_even {
        let emitter = group.members[0].emitter;
        let set = phase_levels(state.emitter(emitter).odd_phase);
        batches.extend(set.iter().map(|&l| (emitter, l)));
    } else {
        for m in &group.members {
            let e = state.emitter(m.emitter);
            if !e.halted(m.track) {
                batches.push((m.emitter, e.level_of(m.track)));
            }
        }
    }

    if batches.is_empty() {
        // Every member cursor halted at its terminal level
        for e in group.emitters() {
            state.emitter_mut(e).phase = CyclePhase::Idle;
        }
        group.state = StepState::Halted;
        log::info!("step group {:?} halted at terminal levels", group.members);
        return;
    }

    for e in group.emitters() {
        state.emitter_mut(e).begin_step();
    }
    group.spawned.clear();
    group.pending.clear();
    group.stall_warned = false;

    if group.odd_even {
        // Staggered set: first ring now, the other two on the stagger timer
        let first = batches[0];
        spawn_batch(state, world, now, first.0, first.1);
        group.spawned.push(first);
        group.pending = batches[1..].to_vec();
        group.stagger_at = now + state.stagger_ticks;
        group.state = StepState::Staggering;
    } else {
        for &(emitter, level) in &batches {
            spawn_batch(state, world, now, emitter, level);
        }
        group.spawned = batches;
        group.state = StepState::Draining;
        group.drain_started = now;
    }
    log::info!("step spawned {:?} at tick {now}", group.spawned);
}

/// Spawn one level batch through the external factory and track every unit
fn spawn_batch(
    state: &mut SessionState,
    world: &mut dyn World,
    now: u64,
    emitter: EmitterId,
    level: u8,
) {
    let cfg = level_config(level);
    let mut rng = state.rng_state.batch_rng(now, emitter, level);
    let base: f32 = rng.random_range(0.0..TAU);
    for i in 0..UNITS_PER_BATCH {
        let jitter: f32 = rng.random_range(-0.05..0.05);
        let angle = normalize_angle(base + i as f32 * TAU / UNITS_PER_BATCH as f32 + jitter);
        let id = world.spawn(SpawnRequest {
            emitter,
            level,
            angle_offset: angle,
            tilt_deg: cfg.tilt_deg,
        });
        state.registry.register(id, emitter, level);
        state.emitter_mut(emitter).active_count += 1;
    }
}

/// The step's batches all drained: flip the odd/even phase where relevant
/// and schedule downtime = max over the levels spawned this step.
fn finish_group_drain(state: &mut SessionState, group: &mut SyncGroup, now: u64) {
    let downtime_secs = if group.odd_even {
        // Downtime keys off the level the next phase starts at
        let emitter = group.members[0].emitter;
        let e = state.emitter_mut(emitter);
        e.odd_phase = !e.odd_phase;
        let next_first = phase_levels(e.odd_phase)[0];
        level_config(next_first).downtime_secs
    } else {
        group
            .spawned
            .iter()
            .map(|(_, l)| level_config(*l).downtime_secs)
            .fold(0.0, f32::max)
    };

    let until = now + secs_to_ticks(downtime_secs);
    for e in group.emitters() {
        let emitter = state.emitter_mut(e);
        emitter.awaiting_downtime = false;
        emitter.next_spawn_deadline = until;
        emitter.phase = CyclePhase::WaitingDowntime;
    }
    group.state = StepState::Cooldown { until };
    log::debug!(
        "step {:?} drained, downtime {downtime_secs}s until tick {until}",
        group.spawned,
    );
}

impl SessionState {
    /// Fire-and-forget completion event from one orbiting unit.
    ///
    /// Retires the matching live instance and bumps the emitter's completed
    /// counter; the barrier poll picks the drained batch up on the next tick,
    /// which is what schedules downtime for unsynchronized solo modes.
    pub fn notify_orbit_complete(&mut self, emitter: EmitterId, level: u8) {
        if !self.registry.complete_one(emitter, level) {
            log::debug!("ignored completion for {emitter:?} level {level}: no live instance");
            return;
        }
        let e = self.emitter_mut(emitter);
        if e.completed_count < e.active_count {
            e.completed_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::sim::state::VariantHistory;

    /// Scripted stand-in for the embedding game
    struct TestWorld {
        variants: [Variant; 2],
        boss: bool,
        next_id: u32,
        spawns: Vec<SpawnRequest>,
    }

    impl TestWorld {
        fn new() -> Self {
            Self {
                variants: [Variant::Base, Variant::Base],
                boss: false,
                next_id: 1,
                spawns: Vec::new(),
            }
        }

        fn with_variants(a: Variant, b: Variant) -> Self {
            let mut w = Self::new();
            w.variants = [a, b];
            w
        }

        /// Levels spawned so far for one emitter, one entry per batch
        /// (spawn requests for a batch arrive as UNITS_PER_BATCH runs)
        fn batch_levels(&self, emitter: EmitterId) -> Vec<u8> {
            self.spawns
                .iter()
                .filter(|r| r.emitter == emitter)
                .map(|r| r.level)
                .collect::<Vec<_>>()
                .chunks(UNITS_PER_BATCH as usize)
                .map(|chunk| chunk[0])
                .collect()
        }
    }

    impl World for TestWorld {
        fn current_variant(&self, emitter: EmitterId) -> Variant {
            self.variants[emitter.index()]
        }

        fn spawn(&mut self, req: SpawnRequest) -> u32 {
            let id = self.next_id;
            self.next_id += 1;
            self.spawns.push(req);
            id
        }

        fn boss_event_active(&self) -> bool {
            self.boss
        }
    }

    fn run(state: &mut SessionState, world: &mut TestWorld, ticks: u64) {
        for _ in 0..ticks {
            tick(state, world);
        }
    }

    /// Complete every live instance through the gateway
    fn drain(state: &mut SessionState) {
        let live: Vec<(EmitterId, u8)> = state.registry.iter().map(|i| (i.emitter, i.level)).collect();
        for (emitter, level) in live {
            state.notify_orbit_complete(emitter, level);
        }
    }

    fn downtime_ticks(level: u8) -> u64 {
        secs_to_ticks(level_config(level).downtime_secs)
    }

    fn stagger() -> u64 {
        secs_to_ticks(crate::consts::ODD_EVEN_STAGGER_SECS)
    }

    /// Run one full step for the current composition: drain the live batch,
    /// let the barrier notice, and let the downtime expire.
    fn complete_step(state: &mut SessionState, world: &mut TestWorld) {
        // Finish any staggered spawns first
        run(state, world, stagger() * 3 + 3);
        drain(state);
        // Barrier poll + longest possible downtime + boundary tick
        run(state, world, downtime_ticks(6) + 3);
    }

    #[test]
    fn test_base_mode_spawns_odd_set_staggered() {
        let mut state = SessionState::with_seed(1);
        let mut world = TestWorld::new();

        tick(&mut state, &mut world);
        // First ring of the odd set only, for each emitter
        assert_eq!(world.batch_levels(EmitterId::A), vec![1]);
        assert_eq!(world.batch_levels(EmitterId::B), vec![1]);
        assert_eq!(
            state.emitter(EmitterId::A).active_count,
            UNITS_PER_BATCH
        );
        assert!(state.emitter(EmitterId::A).awaiting_downtime);
        assert_eq!(state.emitter(EmitterId::A).phase, CyclePhase::Spawning);

        run(&mut state, &mut world, stagger());
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3]);
        run(&mut state, &mut world, stagger());
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5]);
        assert_eq!(state.emitter(EmitterId::A).active_count, 3 * UNITS_PER_BATCH);
    }

    #[test]
    fn test_odd_even_flip_uses_next_phase_downtime() {
        let mut state = SessionState::with_seed(2);
        let mut world = TestWorld::new();

        // Spawn the full odd set
        run(&mut state, &mut world, 1 + stagger() * 2);
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5]);

        drain(&mut state);
        tick(&mut state, &mut world);

        // Phase flipped, downtime is level 2's (the next set's first level)
        let e = state.emitter(EmitterId::A);
        assert!(!e.odd_phase);
        assert!(!e.awaiting_downtime);
        assert_eq!(e.phase, CyclePhase::WaitingDowntime);
        assert_eq!(e.next_spawn_deadline - state.time_ticks, downtime_ticks(2));

        // After the downtime the even set begins
        run(&mut state, &mut world, downtime_ticks(2) + 2);
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5, 2]);
    }

    #[test]
    fn test_sequential_advances_and_wraps() {
        let mut state = SessionState::with_seed(3);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);

        // First step, then three completed steps: each complete_step leaves
        // the next batch freshly spawned
        tick(&mut state, &mut world);
        for _ in 0..3 {
            complete_step(&mut state, &mut world);
        }
        // 1 -> 2 -> 3 -> wrap -> 1
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 2, 3, 1]);
    }

    #[test]
    fn test_sequential_halts_without_looping() {
        let mut settings = Settings::default();
        settings.loop_forward = false;
        let mut state = SessionState::new(4, &settings);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);

        tick(&mut state, &mut world);
        for _ in 0..4 {
            complete_step(&mut state, &mut world);
        }
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 2, 3]);
        assert!(state.emitter(EmitterId::A).forward_halted);
        assert_eq!(state.emitter(EmitterId::A).forward_level, 3);
    }

    #[test]
    fn test_reverse_advances_and_wraps() {
        let mut state = SessionState::with_seed(5);
        let mut world = TestWorld::with_variants(Variant::Descent, Variant::Base);

        tick(&mut state, &mut world);
        for _ in 0..3 {
            complete_step(&mut state, &mut world);
        }
        assert_eq!(world.batch_levels(EmitterId::A), vec![6, 5, 4, 6]);
    }

    #[test]
    fn test_barrier_never_proceeds_while_instances_live() {
        let mut state = SessionState::with_seed(6);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);
        world.variants[1] = Variant::Ascent;

        tick(&mut state, &mut world);
        let spawned = world.spawns.len();
        assert!(spawned > 0);

        // Nothing ever completes: run far past the stall threshold
        let far = state.stall_warn_ticks * 3;
        run(&mut state, &mut world, far);
        assert_eq!(world.spawns.len(), spawned, "no new spawns while batch is live");
        assert!(state.emitter(EmitterId::A).awaiting_downtime);
        assert_eq!(state.emitter(EmitterId::A).phase, CyclePhase::Spawning);
    }

    #[test]
    fn test_barrier_polls_live_counts_not_counters() {
        let mut state = SessionState::with_seed(7);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);
        world.variants[1] = Variant::Ascent;

        tick(&mut state, &mut world);
        // Destroy every instance externally, bypassing the completion path
        let ids: Vec<u32> = state.registry.iter().map(|i| i.id).collect();
        for id in ids {
            assert!(state.registry.discard(id));
        }
        assert_eq!(state.emitter(EmitterId::A).completed_count, 0);

        // Barrier proceeds anyway: the counters stayed behind but nothing is
        // live, so downtime gets scheduled.
        tick(&mut state, &mut world);
        assert!(!state.emitter(EmitterId::A).awaiting_downtime);
        assert_eq!(
            state.emitter(EmitterId::A).phase,
            CyclePhase::WaitingDowntime
        );
    }

    #[test]
    fn test_dual_track_spawns_both_and_takes_max_downtime() {
        let mut state = SessionState::with_seed(8);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);
        state.emitter_mut(EmitterId::A).history = VariantHistory {
            ascent: true,
            descent: true,
        };
        state.emitter_mut(EmitterId::A).forward_level = 2;
        state.emitter_mut(EmitterId::A).reverse_level = 5;

        tick(&mut state, &mut world);
        // Both of A's tracks spawned in the same step
        let a_levels: Vec<u8> = world
            .spawns
            .iter()
            .filter(|r| r.emitter == EmitterId::A)
            .map(|r| r.level)
            .collect();
        assert!(a_levels.contains(&2) && a_levels.contains(&5));
        assert_eq!(state.emitter(EmitterId::A).active_count, 2 * UNITS_PER_BATCH);

        drain(&mut state);
        tick(&mut state, &mut world);
        // Downtime is max(level 2 = 3s, level 5 = 6s) = 6s, not the sum
        let e = state.emitter(EmitterId::A);
        assert_eq!(e.next_spawn_deadline - state.time_ticks, downtime_ticks(5));

        // Both cursors advance independently after the cooldown
        run(&mut state, &mut world, downtime_ticks(5) + 1);
        assert_eq!(state.emitter(EmitterId::A).forward_level, 3);
        assert_eq!(state.emitter(EmitterId::A).reverse_level, 4);
    }

    #[test]
    fn test_solo_sequential_despite_partial_history() {
        // Ascent history only, variant 1, sync disabled: plain sequential,
        // no reverse batch, no pairing.
        let mut settings = Settings::default();
        settings.sync_enabled = false;
        let mut state = SessionState::new(9, &settings);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Base);

        tick(&mut state, &mut world);
        let a_levels: Vec<u8> = world
            .spawns
            .iter()
            .filter(|r| r.emitter == EmitterId::A)
            .map(|r| r.level)
            .collect();
        assert_eq!(a_levels, vec![1; UNITS_PER_BATCH as usize]);
    }

    #[test]
    fn test_pair_sync_joins_across_emitters() {
        let mut state = SessionState::with_seed(10);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Ascent);

        tick(&mut state, &mut world);
        // One joint group: both forward batches in the same step
        assert_eq!(world.batch_levels(EmitterId::A), vec![1]);
        assert_eq!(world.batch_levels(EmitterId::B), vec![1]);

        // Complete only A's units: the join must keep waiting on B
        for _ in 0..UNITS_PER_BATCH {
            state.notify_orbit_complete(EmitterId::A, 1);
        }
        run(&mut state, &mut world, 50);
        assert!(state.emitter(EmitterId::A).awaiting_downtime);
        assert_eq!(state.emitter(EmitterId::A).phase, CyclePhase::Spawning);

        // B finishes: both schedule downtime together
        drain(&mut state);
        tick(&mut state, &mut world);
        assert!(!state.emitter(EmitterId::A).awaiting_downtime);
        assert!(!state.emitter(EmitterId::B).awaiting_downtime);
    }

    #[test]
    fn test_mode_change_deferred_until_step_boundary() {
        let mut state = SessionState::with_seed(11);
        let mut world = TestWorld::new();

        // Odd set step in flight
        run(&mut state, &mut world, 1 + stagger() * 2);
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5]);

        // Switch A to variant 1 mid-batch: nothing new may spawn yet
        world.variants[0] = Variant::Ascent;
        run(&mut state, &mut world, 120);
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5]);

        // After the set drains and the downtime passes, the forward track
        // takes over from level 1
        drain(&mut state);
        run(&mut state, &mut world, downtime_ticks(2) + 2);
        assert_eq!(world.batch_levels(EmitterId::A), vec![1, 3, 5, 1]);
        let forward_spawns = world
            .spawns
            .iter()
            .filter(|r| r.emitter == EmitterId::A)
            .count();
        assert_eq!(forward_spawns as u32, 4 * UNITS_PER_BATCH);
    }

    #[test]
    fn test_mega_sync_reset_then_four_batches() {
        let mut state = SessionState::with_seed(12);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Ascent);
        for id in EmitterId::ALL {
            state.emitter_mut(id).history = VariantHistory {
                ascent: true,
                descent: true,
            };
            state.emitter_mut(id).forward_level = 2;
            state.emitter_mut(id).reverse_level = 5;
        }
        // A live leftover instance blocks the one-time reset
        state.registry.register(999, EmitterId::A, 2);

        tick(&mut state, &mut world);
        assert!(state.mega_reset_pending);
        assert!(!state.mega_initialized);
        assert!(world.spawns.is_empty(), "no spawns while the reset drains");

        // Leftover drains: reset runs, cursors canonical, four sub-batches
        state.notify_orbit_complete(EmitterId::A, 2);
        tick(&mut state, &mut world);
        assert!(state.mega_initialized);
        assert!(!state.mega_reset_pending);
        let mut step: Vec<(EmitterId, u8)> =
            world.spawns.iter().map(|r| (r.emitter, r.level)).collect();
        step.dedup();
        assert_eq!(
            step,
            vec![
                (EmitterId::A, 1),
                (EmitterId::A, 6),
                (EmitterId::B, 1),
                (EmitterId::B, 6),
            ]
        );

        // Join across all four, then every cursor advances
        drain(&mut state);
        run(&mut state, &mut world, downtime_ticks(6) + 2);
        assert_eq!(state.emitter(EmitterId::A).forward_level, 2);
        assert_eq!(state.emitter(EmitterId::B).reverse_level, 5);
    }

    #[test]
    fn test_mega_requires_both_histories_on_both() {
        let mut state = SessionState::with_seed(13);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Ascent);
        state.emitter_mut(EmitterId::A).history = VariantHistory {
            ascent: true,
            descent: true,
        };
        // B has ascent history only: partial stack, not mega
        run(&mut state, &mut world, 1);
        assert!(!state.mega_initialized && !state.mega_reset_pending);
        // A's spare reverse track runs solo alongside the paired forwards
        let a_levels: Vec<u8> = world
            .spawns
            .iter()
            .filter(|r| r.emitter == EmitterId::A)
            .map(|r| r.level)
            .collect();
        assert!(a_levels.contains(&1) && a_levels.contains(&6));
        assert_eq!(world.batch_levels(EmitterId::B), vec![1]);
    }

    #[test]
    fn test_partial_stack_reverse_track_is_independent() {
        let mut state = SessionState::with_seed(14);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Ascent);
        state.emitter_mut(EmitterId::A).history = VariantHistory {
            ascent: true,
            descent: true,
        };

        tick(&mut state, &mut world);
        // Complete only the reverse batch: its solo group proceeds to
        // downtime while the paired forward group keeps waiting.
        for _ in 0..UNITS_PER_BATCH {
            state.notify_orbit_complete(EmitterId::A, 6);
        }
        run(&mut state, &mut world, downtime_ticks(6) + 5);
        let reverse_batches = world
            .spawns
            .iter()
            .filter(|r| r.emitter == EmitterId::A && r.level >= 4)
            .count();
        // Reverse stepped again (level 5) while the forwards are still stuck
        assert_eq!(reverse_batches as u32, 2 * UNITS_PER_BATCH);
        assert_eq!(world.batch_levels(EmitterId::B), vec![1]);
    }

    #[test]
    fn test_boss_event_suspends_new_spawns() {
        let mut state = SessionState::with_seed(15);
        let mut world = TestWorld::new();
        world.boss = true;

        run(&mut state, &mut world, 100);
        assert!(world.spawns.is_empty());

        world.boss = false;
        tick(&mut state, &mut world);
        assert!(!world.spawns.is_empty());
    }

    #[test]
    fn test_pause_lets_live_batch_drain() {
        let mut state = SessionState::with_seed(16);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Ascent);

        tick(&mut state, &mut world);
        let spawned = world.spawns.len();
        state.set_paused(true);

        // Draining still completes under pause; only new spawns are held
        drain(&mut state);
        run(&mut state, &mut world, downtime_ticks(1) + 5);
        assert_eq!(world.spawns.len(), spawned);
        assert!(!state.emitter(EmitterId::A).awaiting_downtime);

        state.set_paused(false);
        run(&mut state, &mut world, 2);
        assert!(world.spawns.len() > spawned);
    }

    #[test]
    fn test_force_reset_clears_and_restarts() {
        let mut state = SessionState::with_seed(17);
        let mut world = TestWorld::with_variants(Variant::Ascent, Variant::Descent);

        tick(&mut state, &mut world);
        tick(&mut state, &mut world);
        assert!(state.registry.live_total() > 0);
        state.emitter_mut(EmitterId::A).history.observe(Variant::Ascent);

        state.force_reset_all_tracks();
        assert_eq!(state.registry.live_total(), 0);
        assert_eq!(state.emitter(EmitterId::A).forward_level, 1);
        assert_eq!(state.emitter(EmitterId::B).reverse_level, 6);
        assert!(state.emitter(EmitterId::A).history.ascent);

        // Fresh steps spawn from canonical cursors
        tick(&mut state, &mut world);
        let last = world.spawns.last().unwrap();
        assert!(last.level == 1 || last.level == 6);
    }

    #[test]
    fn test_completion_without_live_instance_is_ignored() {
        let mut state = SessionState::with_seed(18);
        state.notify_orbit_complete(EmitterId::A, 3);
        assert_eq!(state.emitter(EmitterId::A).completed_count, 0);
        assert!(state.counters_consistent());
    }

    #[test]
    fn test_determinism() {
        let script = |state: &mut SessionState, world: &mut TestWorld| {
            run(state, world, 1 + stagger() * 2);
            world.variants = [Variant::Ascent, Variant::Descent];
            drain(state);
            run(state, world, downtime_ticks(6) + 5);
            drain(state);
            run(state, world, downtime_ticks(6) + 5);
        };

        let mut s1 = SessionState::with_seed(777);
        let mut w1 = TestWorld::new();
        script(&mut s1, &mut w1);

        let mut s2 = SessionState::with_seed(777);
        let mut w2 = TestWorld::new();
        script(&mut s2, &mut w2);

        assert_eq!(w1.spawns, w2.spawns);
        assert_eq!(
            serde_json::to_string(&s1).unwrap(),
            serde_json::to_string(&s2).unwrap()
        );
    }
}
