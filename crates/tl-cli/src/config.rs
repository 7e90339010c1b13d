//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tl_store::ResortConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the replicated document.
    pub document_path: PathBuf,
    /// Tuning for the repair pass that runs after merges.
    #[serde(default)]
    pub resort: ResortSettings,
}

/// The `[resort]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResortSettings {
    /// Entries examined per transaction.
    pub batch_size: usize,
    /// Quiet period after the last merge before a pass starts.
    pub debounce_ms: u64,
}

impl Default for ResortSettings {
    fn default() -> Self {
        let defaults = ResortConfig::default();
        Self {
            batch_size: defaults.batch_size,
            debounce_ms: u64::try_from(defaults.debounce.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl ResortSettings {
    /// Scheduler configuration for a one-shot process: passes are triggered explicitly.
    pub const fn scheduler_config(&self) -> ResortConfig {
        ResortConfig {
            batch_size: self.batch_size,
            debounce: Duration::from_millis(self.debounce_ms),
            resort_on_start: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            document_path: data_dir.join("timelog.automerge"),
            resort: ResortSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources override earlier ones: defaults, `config.toml` in the
    /// config directory, the given file, then `TL_*` environment variables
    /// (`TL_RESORT__BATCH_SIZE` sets `resort.batch_size`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TL_").split("__"));

        figment.extract()
    }

    /// Lock file guarding load-mutate-save cycles on the document.
    pub fn lock_path(&self) -> PathBuf {
        self.document_path.with_extension("lock")
    }
}

/// Returns the platform-specific config directory for tl.
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tl"))
}

/// Returns the platform-specific data directory for tl.
///
/// On Linux: `~/.local/share/tl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tl"))
}
