//! Live-instance registry - the orbit completion gateway
//!
//! Tracks every spawned orbiting unit by the id the external spawn factory
//! returned. The barrier wait in the tick loop polls these live counts
//! directly instead of trusting the step counters, because an external
//! system (a board clear, a scripted kill) may destroy an instance without
//! it ever reporting completion.

use serde::{Deserialize, Serialize};

use super::state::EmitterId;

/// One tracked orbiting unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInstance {
    /// Handle returned by the spawn factory
    pub id: u32,
    pub emitter: EmitterId,
    pub level: u8,
}

/// Registry of all not-yet-destroyed spawned instances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRegistry {
    live: Vec<LiveInstance>,
}

impl InstanceRegistry {
    /// Track a freshly spawned unit
    pub fn register(&mut self, id: u32, emitter: EmitterId, level: u8) {
        self.live.push(LiveInstance { id, emitter, level });
    }

    /// Live units for one emitter, all levels
    pub fn live_count(&self, emitter: EmitterId) -> usize {
        self.live.iter().filter(|i| i.emitter == emitter).count()
    }

    /// Live units for one emitter at one level
    pub fn live_count_at(&self, emitter: EmitterId, level: u8) -> usize {
        self.live
            .iter()
            .filter(|i| i.emitter == emitter && i.level == level)
            .count()
    }

    /// Live units across both emitters
    pub fn live_total(&self) -> usize {
        self.live.len()
    }

    /// Retire one live instance matching (emitter, level) through the normal
    /// completion path. Returns false when nothing matched, which means the
    /// caller reported a completion the registry never saw (already
    /// discarded, or double-reported).
    pub fn complete_one(&mut self, emitter: EmitterId, level: u8) -> bool {
        if let Some(pos) = self
            .live
            .iter()
            .position(|i| i.emitter == emitter && i.level == level)
        {
            let _ = self.live.remove(pos);
            true
        } else {
            false
        }
    }

    /// External destruction bypassing the completion path (e.g. a
    /// level-clearing event). The step counters intentionally do NOT move.
    pub fn discard(&mut self, id: u32) -> bool {
        if let Some(pos) = self.live.iter().position(|i| i.id == id) {
            let _ = self.live.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop every tracked instance, returning how many were live
    pub fn clear(&mut self) -> usize {
        let n = self.live.len();
        self.live.clear();
        n
    }

    /// Iterate tracked instances (stable spawn order)
    pub fn iter(&self) -> impl Iterator<Item = &LiveInstance> {
        self.live.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_counts() {
        let mut reg = InstanceRegistry::default();
        reg.register(1, EmitterId::A, 2);
        reg.register(2, EmitterId::A, 2);
        reg.register(3, EmitterId::A, 5);
        reg.register(4, EmitterId::B, 2);

        assert_eq!(reg.live_count(EmitterId::A), 3);
        assert_eq!(reg.live_count_at(EmitterId::A, 2), 2);
        assert_eq!(reg.live_count_at(EmitterId::A, 5), 1);
        assert_eq!(reg.live_count(EmitterId::B), 1);
        assert_eq!(reg.live_total(), 4);
    }

    #[test]
    fn test_complete_one_matches_emitter_and_level() {
        let mut reg = InstanceRegistry::default();
        reg.register(1, EmitterId::A, 2);
        assert!(!reg.complete_one(EmitterId::B, 2));
        assert!(!reg.complete_one(EmitterId::A, 3));
        assert!(reg.complete_one(EmitterId::A, 2));
        assert!(!reg.complete_one(EmitterId::A, 2));
        assert_eq!(reg.live_total(), 0);
    }

    #[test]
    fn test_discard_bypasses_completion() {
        let mut reg = InstanceRegistry::default();
        reg.register(7, EmitterId::B, 6);
        assert!(reg.discard(7));
        assert!(!reg.discard(7));
        assert_eq!(reg.live_count(EmitterId::B), 0);
    }

    #[test]
    fn test_clear_reports_count() {
        let mut reg = InstanceRegistry::default();
        reg.register(1, EmitterId::A, 1);
        reg.register(2, EmitterId::B, 4);
        assert_eq!(reg.clear(), 2);
        assert_eq!(reg.live_total(), 0);
    }
}
