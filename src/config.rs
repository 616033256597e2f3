use crate::app_dirs::AppDirs;
use crate::game::Timing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Round durations in milliseconds, loaded from the config file and
/// overridable per run from the CLI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub reaction_timeout_ms: u64,
    pub penalty_duration_ms: u64,
    pub result_duration_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 4000,
            reaction_timeout_ms: 2000,
            penalty_duration_ms: 1500,
            result_duration_ms: 3000,
        }
    }
}

impl Config {
    pub fn timing(&self) -> Timing {
        Timing {
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)),
            reaction_timeout: Duration::from_millis(self.reaction_timeout_ms),
            penalty_duration: Duration::from_millis(self.penalty_duration_ms),
            result_duration: Duration::from_millis(self.result_duration_ms),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("blink_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<Config>(&bytes) {
                return cfg;
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
