//! Application paths for config and data.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory (audit log, spend history).
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the switchyard application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("com", "steipete", "switchyard") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            // Fallback to home directory
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/switchyard"),
                data: home.join(".local/share/switchyard"),
            }
        }
    }

    /// Path to the main config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the audit chain log.
    #[must_use]
    pub fn audit_log_file(&self) -> PathBuf {
        self.data.join("audit.jsonl")
    }

    /// Path to the spend history database.
    #[must_use]
    pub fn spend_history_file(&self) -> PathBuf {
        self.data.join("spend-history.sqlite")
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
