//! Application path management for dev, portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the working directory.
//! - **Portable mode**: a `.portable` marker file next to the executable keeps
//!   config, button data and logs in that directory.
//! - **Installed mode** (default): everything lives under the platform data
//!   directory (`~/.local/share/MIDI Pedal`, `%APPDATA%\MIDI Pedal`).

use crate::config::StorageBackend;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "MIDI Pedal";

/// Application paths for config, button data, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Directory holding button configuration
    pub data_dir: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] Running in DEV mode ({})", cwd.display());
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::portable(&exe_dir);
        }

        let data_root = dirs::data_dir().unwrap_or_else(|| {
            eprintln!("[paths] WARNING: no platform data dir, falling back to exe dir");
            exe_dir.clone()
        });

        let paths = Self::installed(&data_root);
        #[cfg(debug_assertions)]
        eprintln!(
            "[paths] Running in INSTALLED mode (data dir: {})",
            paths.data_dir.display()
        );
        paths
    }

    /// Layout rooted at a single directory
    pub fn portable(root: &Path) -> Self {
        Self {
            config: root.join("config.yaml"),
            data_dir: root.join("data"),
            logs_dir: root.join("logs"),
            is_portable: true,
        }
    }

    /// Layout under the platform data directory
    pub fn installed(data_root: &Path) -> Self {
        let app_data = data_root.join(APP_NAME);
        Self {
            config: app_data.join("config.yaml"),
            data_dir: app_data.join("data"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure data and log directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.data_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Default directory for page assets
    pub fn www_dir(&self) -> PathBuf {
        self.data_dir.join("www")
    }

    /// Default location of the button store for `backend`
    pub fn storage_path(&self, backend: StorageBackend) -> PathBuf {
        match backend {
            StorageBackend::Sled => self.data_dir.join("buttons.sled"),
            StorageBackend::Files | StorageBackend::Memory => self.data_dir.join("buttons"),
        }
    }
}
