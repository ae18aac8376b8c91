//! Configuration management for vitrine
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. Every section falls back to its defaults, so an empty
//! file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Size of `sockaddr_un::sun_path`, including the terminating NUL.
const SUN_PATH_MAX: usize = 108;

/// Longest socket file name a session can produce.
const LONGEST_SOCKET_NAME: &str = "vitrine-0123456789abcdef-4294967295.sock";

/// Upper bound for border width and title bar height, in pixels.
const MAX_DECORATION_SIZE: i32 = 4096;

/// Main configuration struct containing all vitrine settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VitrineConfig {
    /// Control socket and registry limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Placement of new windows
    #[serde(default)]
    pub window: WindowConfig,

    /// Decoration sizes used for hit-testing
    #[serde(default)]
    pub decorations: DecorationsConfig,

    /// Per-window event delivery
    #[serde(default)]
    pub events: EventsConfig,

    /// Cursor bounds
    #[serde(default)]
    pub input: InputConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Directory holding the control and event sockets
    pub runtime_dir: PathBuf,

    /// Maximum number of live windows
    pub max_windows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Origin of newly created windows
    pub default_x: i32,
    pub default_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecorationsConfig {
    /// Border thickness (pixels)
    pub border_width: i32,

    /// Title bar height (pixels), also the close button size
    pub title_bar_height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventsConfig {
    /// Events buffered per window before new ones are dropped
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    pub screen_width: i32,
    pub screen_height: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,

    /// Frame loop rate
    pub max_fps: u32,

    /// Delay before launching the client command (milliseconds)
    #[serde(default)]
    pub launch_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from("/tmp"),
            max_windows: 1024,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_x: 0,
            default_y: 0,
        }
    }
}

impl Default for DecorationsConfig {
    fn default() -> Self {
        Self {
            border_width: 5,
            title_bar_height: 20,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_fps: 60,
            launch_delay_ms: 0,
        }
    }
}

impl VitrineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: VitrineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.max_windows == 0 {
            anyhow::bail!("Invalid max_windows: must be at least 1");
        }

        // The runtime dir plus the longest socket name must fit in sun_path
        let dir_len = self.server.runtime_dir.as_os_str().len();
        if dir_len + 1 + LONGEST_SOCKET_NAME.len() >= SUN_PATH_MAX {
            anyhow::bail!(
                "Invalid runtime_dir: {} is too long for a socket address",
                self.server.runtime_dir.display()
            );
        }

        if self.decorations.border_width <= 0 || self.decorations.title_bar_height <= 0 {
            anyhow::bail!("Invalid decorations: border_width and title_bar_height must be positive");
        }
        if self.decorations.border_width > MAX_DECORATION_SIZE
            || self.decorations.title_bar_height > MAX_DECORATION_SIZE
        {
            anyhow::bail!(
                "Invalid decorations: border_width and title_bar_height must not exceed {}",
                MAX_DECORATION_SIZE
            );
        }

        if self.events.queue_capacity == 0 {
            anyhow::bail!("Invalid queue_capacity: must be at least 1");
        }

        if self.input.screen_width <= 0 || self.input.screen_height <= 0 {
            anyhow::bail!(
                "Invalid screen size: {}x{}",
                self.input.screen_width,
                self.input.screen_height
            );
        }

        if self.general.max_fps == 0 {
            anyhow::bail!("Invalid max_fps: must be at least 1");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
