use std::env;
use std::fs;

use audio_backend::BackendConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result, invalid_argument};

pub const CONFIG_PATH_ENV: &str = "SFX_ENGINE_CONFIG";
pub const DEVICE_ENV: &str = "SFX_ENGINE_DEVICE";
pub const MAX_VOICES_ENV: &str = "SFX_ENGINE_MAX_VOICES";

pub const DEFAULT_SPEED_OF_SOUND: f32 = 343.5;

/// Engine settings applied when the device is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output device name to prefer over the host default.
    pub preferred_device: Option<String>,
    pub max_voices: usize,
    pub distance_scale: f32,
    pub doppler_scale: f32,
    pub speed_of_sound: f32,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_device: None,
            max_voices: 128,
            distance_scale: 1.0,
            doppler_scale: 1.0,
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            backend: BackendConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| AudioError::InvalidArgument(format!("engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the JSON file named by `SFX_ENGINE_CONFIG`, then the
    /// `SFX_ENGINE_DEVICE` and `SFX_ENGINE_MAX_VOICES` overrides.
    pub fn from_env() -> Self {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => match fs::read_to_string(&path) {
                Ok(text) => Self::from_json_str(&text).unwrap_or_else(|e| {
                    tracing::warn!(path = %path, error = %e, "ignoring malformed engine config");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "engine config file unreadable");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(name) = env::var(DEVICE_ENV) {
            if !name.trim().is_empty() {
                config.preferred_device = Some(name);
            }
        }
        if let Ok(raw) = env::var(MAX_VOICES_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_voices = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", MAX_VOICES_ENV),
            }
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        check_distance_scale(self.distance_scale)?;
        check_doppler_scale(self.doppler_scale)?;
        check_speed_of_sound(self.speed_of_sound)?;
        if self.max_voices == 0 {
            return Err(invalid_argument("max_voices must be at least 1"));
        }
        Ok(())
    }

    /// Backend options with the engine's voice budget applied.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            max_source_voices: self.max_voices,
            ..self.backend.clone()
        }
    }
}

pub(crate) fn check_distance_scale(value: f32) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(invalid_argument(format!("distance scale must be > 0, got {}", value)));
    }
    Ok(())
}

pub(crate) fn check_doppler_scale(value: f32) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(invalid_argument(format!("doppler scale must be >= 0, got {}", value)));
    }
    Ok(())
}

pub(crate) fn check_speed_of_sound(value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid_argument(format!("speed of sound must be finite and > 0, got {}", value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{ "preferred_device": "USB DAC", "backend": { "buffer_frames": 256 } }"#)
            .unwrap();
        assert_eq!(cfg.preferred_device.as_deref(), Some("USB DAC"));
        assert_eq!(cfg.max_voices, 128);
        assert_eq!(cfg.speed_of_sound, DEFAULT_SPEED_OF_SOUND);
        assert_eq!(cfg.backend.buffer_frames, Some(256));
    }

    #[test]
    fn invalid_scales_rejected() {
        match EngineConfig::from_json_str(r#"{ "distance_scale": 0.0 }"#) {
            Err(AudioError::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
        assert!(EngineConfig::from_json_str(r#"{ "doppler_scale": -0.5 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "speed_of_sound": 0 }"#).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(EngineConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn backend_config_carries_voice_budget() {
        let cfg = EngineConfig { max_voices: 16, ..EngineConfig::default() };
        assert_eq!(cfg.backend_config().max_source_voices, 16);
    }

    #[test]
    fn nan_scales_rejected() {
        assert!(check_distance_scale(f32::NAN).is_err());
        assert!(check_doppler_scale(f32::NAN).is_err());
        assert!(check_speed_of_sound(f32::INFINITY).is_err());
    }
}
