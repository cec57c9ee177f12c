//! Configuration file support for sonixflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SONIXFLASH_*)
//! 3. Local config file (./sonixflash.toml)
//! 4. Global config file (~/.config/sonixflash/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "sonixflash.toml";

/// Device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// VID/PID pair, same syntax as `--vidpid`.
    pub vidpid: Option<String>,
    /// OEM reboot variant (sonix, evision, hfd).
    pub reboot: Option<String>,
}

/// Flash defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Flash offset.
    pub offset: Option<u32>,
    /// Disable the SN32F26x offset safety check.
    #[serde(default)]
    pub no_offset_check: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sonixflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.device.vidpid.is_some() {
            self.device.vidpid = other.device.vidpid;
        }
        if other.device.reboot.is_some() {
            self.device.reboot = other.device.reboot;
        }

        if other.flash.offset.is_some() {
            self.flash.offset = other.flash.offset;
        }
        if other.flash.no_offset_check {
            self.flash.no_offset_check = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.device.vidpid.is_none());
        assert!(config.device.reboot.is_none());
        assert!(config.flash.offset.is_none());
        assert!(!config.flash.no_offset_check);
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_device() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.device.vidpid = Some("0c45/7040".to_string());
        other.device.reboot = Some("hfd".to_string());

        base.merge(other);

        assert_eq!(base.device.vidpid.as_deref(), Some("0c45/7040"));
        assert_eq!(base.device.reboot.as_deref(), Some("hfd"));
    }

    #[test]
    fn test_config_merge_offset() {
        let mut base = Config::default();
        base.flash.offset = Some(0);

        let mut other = Config::default();
        other.flash.offset = Some(0x200);

        base.merge(other);
        assert_eq!(base.flash.offset, Some(0x200));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.device.vidpid = Some("0c45/7010".to_string());
        base.flash.offset = Some(0x200);
        base.flash.no_offset_check = true;

        base.merge(Config::default());

        assert_eq!(base.device.vidpid.as_deref(), Some("0c45/7010"));
        assert_eq!(base.flash.offset, Some(0x200));
        assert!(base.flash.no_offset_check);
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[device]
vidpid = "0c45/7040"
reboot = "sonix"

[flash]
offset = 512
no_offset_check = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.vidpid.as_deref(), Some("0c45/7040"));
        assert_eq!(config.device.reboot.as_deref(), Some("sonix"));
        assert_eq!(config.flash.offset, Some(512));
        assert!(config.flash.no_offset_check);
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: Config = toml::from_str("[flash]\noffset = 0x200\n").unwrap();
        assert!(config.device.vidpid.is_none());
        assert_eq!(config.flash.offset, Some(0x200));
        assert!(!config.flash.no_offset_check);
    }

    // ---- load_from_path ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[device]\nvidpid = \"0c45:7120\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.device.vidpid.as_deref(), Some("0c45:7120"));
    }

    #[test]
    fn test_load_from_path_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[device\nvidpid = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.device.vidpid.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.device.vidpid.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("sonixflash"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
