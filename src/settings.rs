//! Session settings and tuning
//!
//! Persisted separately from run state as a JSON dotfile.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{ODD_EVEN_STAGGER_SECS, STALL_WARN_SECS};

/// Scheduler settings/preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Global synchronize toggle: matching enhanced tracks barrier together
    pub sync_enabled: bool,

    // === Track progression ===
    /// Forward tracks wrap 3 -> 1 instead of halting at the terminal level
    pub loop_forward: bool,
    /// Reverse tracks wrap 4 -> 6 instead of halting at the terminal level
    pub loop_reverse: bool,

    // === Timing ===
    /// Delay between the staggered ring spawns of an odd/even set
    pub odd_even_stagger_secs: f32,
    /// Barrier waits past this log a stall warning (0 disables the warning;
    /// the wait itself is always unbounded)
    pub stall_warn_secs: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            loop_forward: true,
            loop_reverse: true,
            odd_even_stagger_secs: ODD_EVEN_STAGGER_SECS,
            stall_warn_secs: STALL_WARN_SECS,
        }
    }
}

impl Settings {
    /// Settings file name
    const FILE_NAME: &'static str = ".twin-orbit-settings.json";

    /// Load settings from the working directory, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(Path::new(Self::FILE_NAME))
    }

    /// Load settings from a specific path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(err) => {
                    log::warn!(
                        "Settings file {} is invalid ({err}), using defaults",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Using default settings");
                Self::default()
            }
        }
    }

    /// Save settings to the working directory
    pub fn save(&self) {
        self.save_to(Path::new(Self::FILE_NAME));
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(err) = fs::write(path, json) {
                    log::warn!("Failed to save settings to {}: {err}", path.display());
                } else {
                    log::info!("Settings saved");
                }
            }
            Err(err) => log::warn!("Failed to serialize settings: {err}"),
        }
    }
}
