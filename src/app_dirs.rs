use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("blink");
            Some(state_dir.join("best.db"))
        } else {
            ProjectDirs::from("", "", "blink")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("best.db"))
        }
    }

    pub fn fallback_store_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("blink");
            Some(state_dir.join("best.json"))
        } else {
            ProjectDirs::from("", "", "blink")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("best.json"))
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "blink").map(|proj_dirs| proj_dirs.config_dir().join("config.json"))
    }
}
