//! Directory layout for the driver.
//!
//! Provides a single `DriverPaths` struct that resolves the machine store and
//! the driver's own config and log directories:
//!
//! - Store:     `$MACHINE_STORAGE_PATH` or `~/.docker/machine/`
//! - Machines:  `<store>/machines/<name>/`  (record + SSH key pair)
//! - Config:    `~/.config/docker-machine-driver-vcd/`  (XDG-style)
//! - Logs:      `~/.local/share/docker-machine-driver-vcd/logs/`

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

pub const APP_NAME: &str = "docker-machine-driver-vcd";
pub const DEFAULTS_FILE: &str = "defaults.toml";
pub const RECORD_FILE: &str = "config.json";
pub const SSH_KEY_FILE: &str = "id_rsa";

/// All resolved driver directory paths.
#[derive(Debug, Clone)]
pub struct DriverPaths {
    /// Machine store root shared with the orchestrator.
    pub store: PathBuf,
    /// Human-editable driver config.
    pub config: PathBuf,
    /// Driver log files.
    pub logs: PathBuf,
}

impl DriverPaths {
    /// Resolve all paths. `store` overrides the default store root.
    /// Does not create any directories; see [`DriverPaths::ensure_machine_dir`].
    pub fn resolve(store: Option<PathBuf>) -> Option<Self> {
        let home = std::env::var("HOME").ok().map(PathBuf::from)?;
        let store = store.unwrap_or_else(|| home.join(".docker").join("machine"));
        Some(Self {
            store,
            config: resolve_config_dir(&home),
            logs: resolve_log_dir(&home),
        })
    }

    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.store.join("machines").join(name)
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(RECORD_FILE)
    }

    pub fn ssh_key_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(SSH_KEY_FILE)
    }

    pub fn defaults_file(&self) -> PathBuf {
        self.config.join(DEFAULTS_FILE)
    }

    /// Create the machine directory if it doesn't already exist.
    pub fn ensure_machine_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.machine_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;
        debug!("ensured directory: {}", dir.display());
        Ok(dir)
    }

    /// Delete a machine directory and everything in it.
    pub fn remove_machine_dir(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(&dir, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// XDG path resolution
// ---------------------------------------------------------------------------

fn resolve_config_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join(APP_NAME)
    } else {
        home.join(".config").join(APP_NAME)
    }
}

fn resolve_log_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join(APP_NAME).join("logs")
    } else {
        home.join(".local").join("share").join(APP_NAME).join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_produces_valid_paths() {
        let paths = DriverPaths::resolve(None).expect("HOME should be set in tests");
        assert!(paths.store.ends_with(".docker/machine"));
        assert!(paths.config.to_string_lossy().contains(APP_NAME));
        assert!(paths.logs.ends_with("logs"));
        assert!(paths.defaults_file().ends_with(DEFAULTS_FILE));
    }

    #[test]
    fn machine_files_live_under_machine_dir() {
        let paths = DriverPaths::resolve(Some(PathBuf::from("/tmp/store"))).unwrap();
        assert_eq!(
            paths.record_path("web"),
            PathBuf::from("/tmp/store/machines/web/config.json")
        );
        assert_eq!(
            paths.ssh_key_path("web"),
            PathBuf::from("/tmp/store/machines/web/id_rsa")
        );
    }

    #[test]
    fn ensure_and_remove_machine_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = DriverPaths::resolve(Some(tmp.path().to_path_buf())).unwrap();

        let dir = paths.ensure_machine_dir("web").expect("ensure should succeed");
        assert!(dir.is_dir());

        paths.remove_machine_dir("web").unwrap();
        assert!(!dir.exists());
        // Removing again is not an error.
        paths.remove_machine_dir("web").unwrap();
    }
}
