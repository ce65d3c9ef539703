use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::error::Error;
use crate::queue;

pub const DEFAULT_RENDERER_COMMAND: &str = "swww";
pub const DEFAULT_CONTROL_SOCKET_NAME: &str = "wallpaper-cycle.sock";
pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Directory and cadence the scheduler rotates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    pub directory: PathBuf,
    interval_secs: u64,
}

impl RotationConfig {
    /// # Errors
    /// Returns [`Error::InvalidInterval`] outside `1..=86400` seconds.
    pub fn new(directory: impl Into<PathBuf>, interval_secs: u64) -> Result<Self, Error> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_secs) {
            return Err(Error::InvalidInterval(interval_secs));
        }
        Ok(Self {
            directory: directory.into(),
            interval_secs,
        })
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Executable name (looked up in `PATH`) or path.
    pub command: String,
    /// Arguments placed before the image path.
    pub args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_RENDERER_COMMAND.to_string(),
            args: ["img", "--transition-type", "fade", "--resize", "crop"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory scanned recursively for wallpapers.
    pub wallpaper_directory: PathBuf,
    /// Time between automatic rotations.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    /// Persisted shuffle queue shared across restarts.
    pub queue_path: PathBuf,
    /// Unix domain socket accepting runtime control commands.
    pub control_socket_path: PathBuf,
    pub renderer: RendererConfig,
    /// Optional deterministic seed for queue shuffles.
    pub shuffle_seed: Option<u64>,
    /// Rotate once as soon as the scheduler starts.
    pub rotate_on_startup: bool,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.wallpaper_directory.as_os_str().is_empty(),
            "wallpaper-directory must not be empty"
        );
        ensure!(
            self.rotation_interval.subsec_nanos() == 0,
            "rotation-interval must be a whole number of seconds"
        );
        let secs = self.rotation_interval.as_secs();
        ensure!(
            (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs),
            "rotation-interval must be between 1s and 24h"
        );
        ensure!(
            self.queue_path.file_name().is_some(),
            "queue-path must include a file name"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        ensure!(
            !self.renderer.command.trim().is_empty(),
            "renderer.command must not be empty"
        );
        Ok(self)
    }

    pub fn rotation(&self) -> Result<RotationConfig, Error> {
        RotationConfig::new(
            self.wallpaper_directory.clone(),
            self.rotation_interval.as_secs(),
        )
    }

    fn default_wallpaper_directory() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join("Pictures")
            .join("wallpapers")
    }

    fn default_control_socket_path() -> PathBuf {
        std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_CONTROL_SOCKET_NAME)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            wallpaper_directory: Self::default_wallpaper_directory(),
            rotation_interval: Duration::from_secs(60),
            queue_path: queue::default_queue_path(),
            control_socket_path: Self::default_control_socket_path(),
            renderer: RendererConfig::default(),
            shuffle_seed: None,
            rotate_on_startup: true,
        }
    }
}

/// Check a directory requested at runtime before it replaces the current one.
///
/// # Errors
/// Returns [`Error::InvalidDirectory`] when the path is missing, not a
/// directory, or holds no wallpapers.
pub fn validate_directory(path: &Path) -> Result<(), Error> {
    let invalid = |reason: &str| Error::InvalidDirectory {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if path.as_os_str().is_empty() {
        return Err(invalid("no directory given"));
    }
    if !path.is_dir() {
        return Err(invalid("directory does not exist"));
    }
    if !crate::scan::has_images(path) {
        return Err(invalid("no .jpg, .jpeg, .png or .webp images found"));
    }
    Ok(())
}
