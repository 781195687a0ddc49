//! Twin Orbit demo entry point
//!
//! Headless driver: runs the scheduler against a toy orbit world with a
//! scripted escalation of variant selections, so a minute of log output
//! walks through every mode up to mega-sync.

use glam::Vec2;

use twin_orbit::consts::TICKS_PER_SEC;
use twin_orbit::sim::{SpawnRequest, level_config, tick};
use twin_orbit::{EmitterId, SessionState, Settings, Variant, World, polar_to_cartesian};

/// Orbit speed of demo units, degrees of arc per second
const ORBIT_DEG_PER_SEC: f32 = 180.0;

/// One toy orbiting unit: travels a full circle plus the level's arc
/// extension, then reports completion through the gateway.
struct DemoOrbiter {
    id: u32,
    emitter: EmitterId,
    level: u8,
    angle: f32,
    remaining_deg: f32,
    pos: Vec2,
}

/// Stand-in for the embedding game: spawn factory, variant source, pause
/// signal, and the orbit motion the scheduler treats as external.
struct DemoWorld {
    variants: [Variant; 2],
    next_id: u32,
    orbiters: Vec<DemoOrbiter>,
    total_spawned: u32,
}

impl DemoWorld {
    fn new() -> Self {
        Self {
            variants: [Variant::Base, Variant::Base],
            next_id: 1,
            orbiters: Vec::new(),
            total_spawned: 0,
        }
    }

    /// Advance every live orbiter one tick; finished orbits notify the
    /// scheduler's completion gateway.
    fn advance(&mut self, session: &mut SessionState) {
        let step_deg = ORBIT_DEG_PER_SEC / TICKS_PER_SEC as f32;
        let mut finished: Vec<(EmitterId, u8)> = Vec::new();
        for orbiter in &mut self.orbiters {
            orbiter.angle += step_deg.to_radians();
            orbiter.remaining_deg -= step_deg;
            let radius = level_config(orbiter.level).radius;
            orbiter.pos = polar_to_cartesian(radius, orbiter.angle);
            if orbiter.remaining_deg <= 0.0 {
                log::debug!(
                    "orbiter {} ({:?} L{}) exits at ({:.0}, {:.0})",
                    orbiter.id,
                    orbiter.emitter,
                    orbiter.level,
                    orbiter.pos.x,
                    orbiter.pos.y,
                );
                finished.push((orbiter.emitter, orbiter.level));
            }
        }
        self.orbiters.retain(|o| o.remaining_deg > 0.0);
        for (emitter, level) in finished {
            session.notify_orbit_complete(emitter, level);
        }
    }
}

impl World for DemoWorld {
    fn current_variant(&self, emitter: EmitterId) -> Variant {
        self.variants[emitter.index()]
    }

    fn spawn(&mut self, req: SpawnRequest) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.total_spawned += 1;
        let cfg = level_config(req.level);
        self.orbiters.push(DemoOrbiter {
            id,
            emitter: req.emitter,
            level: req.level,
            angle: req.angle_offset,
            remaining_deg: 360.0 + cfg.arc_extension_deg,
            pos: polar_to_cartesian(cfg.radius, req.angle_offset),
        });
        id
    }

    fn boss_event_active(&self) -> bool {
        false
    }
}

/// Variant selections per demo timeline second
fn scripted_variants(secs: u64) -> [Variant; 2] {
    match secs {
        0..10 => [Variant::Base, Variant::Base],
        10..20 => [Variant::Ascent, Variant::Base],
        20..30 => [Variant::Ascent, Variant::Descent],
        30..40 => [Variant::Descent, Variant::Ascent],
        // Both emitters now carry both history flags: mega-sync
        _ => [Variant::Ascent, Variant::Ascent],
    }
}

fn main() {
    env_logger::init();

    let settings = Settings::load();
    let mut session = SessionState::new(0xC0FFEE, &settings);
    let mut world = DemoWorld::new();

    let total_ticks = 60 * TICKS_PER_SEC as u64;
    for t in 0..total_ticks {
        let secs = t / TICKS_PER_SEC as u64;
        let next = scripted_variants(secs);
        if next != world.variants {
            world.variants = next;
            session.on_variant_changed();
            log::info!("t={secs}s: variants now {:?}", next);
        }
        tick(&mut session, &mut world);
        world.advance(&mut session);
    }

    log::info!(
        "demo done: {} units spawned, {} still live, mega-sync initialized: {}",
        world.total_spawned,
        session.registry.live_total(),
        session.mega_initialized,
    );
    for id in EmitterId::ALL {
        let e = session.emitter(id);
        log::info!(
            "{id:?}: history {:?}, forward L{}, reverse L{}, phase {:?}",
            e.history,
            e.forward_level,
            e.reverse_level,
            e.phase,
        );
    }
}
