//! Configuration for the headless host.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Name of the audio/MIDI backend to select
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Data directory for host state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Control surface settings
    #[serde(default)]
    pub control: ControlConfig,

    /// Settings for the `Dummy` backend
    #[serde(default)]
    pub dummy: DummyConfig,
}

/// Control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Listen for remote actions
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Unix socket path for the control surface
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

/// `Dummy` backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DummyConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per process cycle
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// Number of capture and of playback ports
    #[serde(default = "default_hardware_ports")]
    pub hardware_ports: u32,

    /// Maximum number of client ports
    #[serde(default = "default_max_ports")]
    pub max_ports: usize,

    /// Simulate device removal after this many milliseconds
    #[serde(default)]
    pub halt_after_ms: Option<u64>,
}

fn default_backend() -> String {
    "Dummy".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".headless-host")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/headless-host.sock")
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_buffer_size() -> u32 {
    1024
}

fn default_hardware_ports() -> u32 {
    2
}

fn default_max_ports() -> usize {
    256
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            control: ControlConfig::default(),
            dummy: DummyConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: default_socket_path(),
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_size: default_buffer_size(),
            hardware_ports: default_hardware_ports(),
            max_ports: default_max_ports(),
            halt_after_ms: None,
        }
    }
}

impl HostConfig {
    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, std::io::Error> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Location of the user's config file
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.yaml")
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.backend, "Dummy");
        assert!(config.control.enabled);
        assert_eq!(
            config.control.socket_path,
            PathBuf::from("/tmp/headless-host.sock")
        );
        assert_eq!(config.dummy.sample_rate, 48_000);
        assert_eq!(config.dummy.halt_after_ms, None);
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: HostConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.backend, parsed.backend);
        assert_eq!(config.dummy, parsed.dummy);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "backend: Dummy\ndummy:\n  buffer_size: 64\n  halt_after_ms: 250\n";
        let config: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.dummy.buffer_size, 64);
        assert_eq!(config.dummy.sample_rate, 48_000);
        assert_eq!(config.dummy.halt_after_ms, Some(250));
        assert!(config.control.enabled);
    }

    #[test]
    fn test_load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "backend: [unterminated").unwrap();

        let err = HostConfig::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.backend, "Dummy");
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            data_dir: dir.path().join("nested").join("state"),
            ..HostConfig::default()
        };
        config.ensure_dirs().unwrap();
        assert!(config.data_dir.is_dir());
    }
}
