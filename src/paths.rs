//! Application directories
//!
//! Three layouts, checked in order:
//!
//! - **Dev** (debug builds): `config.yaml` in the working directory
//! - **Portable**: a `.portable` marker next to the executable keeps config
//!   and logs beside it
//! - **Installed**: the platform data directory (`%APPDATA%\Genesis Link`,
//!   `~/.local/share/Genesis Link`, `~/Library/Application Support/...`)

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

const APP_NAME: &str = "Genesis Link";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config: PathBuf,
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Resolve the layout for this process.
    ///
    /// Runs before logging is initialized.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] dev mode, using {}", cwd.display());
                return Self::in_dir(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            return Self::in_dir(&exe_dir, true);
        }

        let base = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] no platform data directory, falling back to executable dir");
                exe_dir.clone()
            })
            .join(APP_NAME);
        Self::in_dir(&base, false)
    }

    /// Layout rooted at `base`
    pub fn in_dir(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    /// Layout for an explicit `--config` path: logs go next to it
    pub fn for_config(config: &Path) -> Self {
        let base = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config: config.to_path_buf(),
            logs_dir: base.join("logs"),
            is_portable: true,
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Create the log and config directories when missing
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create {}", self.logs_dir.display())
            })?;
        }

        let config_dir = self.base_dir();
        if !config_dir.exists() {
            debug!("Creating config directory: {}", config_dir.display());
            std::fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        }

        Ok(())
    }
}
