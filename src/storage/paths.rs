//! Application paths for config and persisted router state.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Directory holding the durable state records.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the llm-router application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "llm-router", "llm-router") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            Self {
                config: home.join(".config/llm-router"),
                data: home.join(".local/share/llm-router"),
            }
        }
    }

    /// Paths rooted at an explicit state directory (config stays at the default location).
    #[must_use]
    pub fn with_state_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            data: dir.as_ref().to_path_buf(),
            ..Self::new()
        }
    }

    /// Default config file path.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the persisted `ProviderState` record.
    #[must_use]
    pub fn provider_state_file(&self) -> PathBuf {
        self.data.join("provider-state.json")
    }

    /// Path to the persisted current quota window.
    #[must_use]
    pub fn quota_window_file(&self) -> PathBuf {
        self.data.join("quota-window.json")
    }

    /// Path to the append-only log of archived quota windows.
    #[must_use]
    pub fn quota_archive_file(&self) -> PathBuf {
        self.data.join("quota-archive.jsonl")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_files_live_in_state_dir() {
        let paths = AppPaths::with_state_dir("/tmp/router-state");
        assert_eq!(
            paths.provider_state_file(),
            PathBuf::from("/tmp/router-state/provider-state.json")
        );
        assert!(paths.quota_archive_file().ends_with("quota-archive.jsonl"));
    }
}
