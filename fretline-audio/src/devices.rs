//! Audio device discovery and the persisted device selection.

use std::path::Path;

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::paths;

/// A playback or capture device discovered on the system.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDevice {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub is_default: bool,
}

/// User-selected device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDeviceConfig {
    /// None = system default
    pub output_device: Option<String>,
    /// None = system default
    #[serde(default)]
    pub input_device: Option<String>,
    pub sample_rate: u32,
    pub gain: f32,
}

impl Default for AudioDeviceConfig {
    fn default() -> Self {
        Self { output_device: None, input_device: None, sample_rate: 44100, gain: 1.0 }
    }
}

fn collect(
    devices: impl Iterator<Item = cpal::Device>,
    default_name: Option<String>,
    config_of: impl Fn(&cpal::Device) -> Option<cpal::SupportedStreamConfig>,
) -> Vec<AudioDevice> {
    let mut out = Vec::new();
    for device in devices {
        let name = match device.name() {
            Ok(name) => name,
            Err(_) => continue,
        };
        // Devices whose config cannot be queried are skipped.
        let config = match config_of(&device) {
            Some(config) => config,
            None => continue,
        };
        out.push(AudioDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: config.channels(),
            sample_rate: config.sample_rate().0,
        });
    }
    out
}

/// Enumerate playback devices on the default host.
pub fn enumerate_output_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    match host.output_devices() {
        Ok(devices) => collect(devices, default_name, |d| d.default_output_config().ok()),
        Err(e) => {
            log::warn!(target: "synth", "output device enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// Enumerate capture devices on the default host.
pub fn enumerate_capture_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => collect(devices, default_name, |d| d.default_input_config().ok()),
        Err(e) => {
            log::warn!(target: "synth", "capture device enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// Load the device selection; a missing or unreadable file yields the
/// defaults.
pub fn load_device_config() -> AudioDeviceConfig {
    load_device_config_from(&paths::device_config_file())
}

fn load_device_config_from(path: &Path) -> AudioDeviceConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return AudioDeviceConfig::default(),
    };
    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            log::warn!(target: "synth", "bad device config {}: {}", path.display(), e);
            AudioDeviceConfig::default()
        }
    }
}

pub fn save_device_config(config: &AudioDeviceConfig) -> std::io::Result<()> {
    save_device_config_to(&paths::device_config_file(), config)
}

fn save_device_config_to(path: &Path, config: &AudioDeviceConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_devices.json");

        let config = AudioDeviceConfig {
            output_device: Some("USB Interface".to_string()),
            input_device: Some("USB Interface Mic".to_string()),
            sample_rate: 48000,
            gain: 0.8,
        };
        save_device_config_to(&path, &config).unwrap();
        assert_eq!(load_device_config_from(&path), config);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_device_config_from(&dir.path().join("nope.json"));
        assert_eq!(config, AudioDeviceConfig::default());
    }

    #[test]
    fn config_without_an_input_device_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_devices.json");
        std::fs::write(
            &path,
            br#"{"output_device": "Built-in", "sample_rate": 44100, "gain": 1.0}"#,
        )
        .unwrap();

        let config = load_device_config_from(&path);
        assert_eq!(config.output_device.as_deref(), Some("Built-in"));
        assert_eq!(config.input_device, None);
    }

    #[test]
    fn enumeration_tolerates_hosts_without_devices() {
        // Headless hosts report no devices rather than panicking.
        let _ = enumerate_output_devices();
        let _ = enumerate_capture_devices();
    }

    #[test]
    fn garbage_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_devices.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(load_device_config_from(&path), AudioDeviceConfig::default());
    }
}
