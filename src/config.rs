//! Configuration types for the playback engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the playback engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Remote synthesis service settings.
    pub tts: TtsConfig,
    /// Text segmentation settings.
    pub chunk: ChunkConfig,
    /// Dictation (discrete multi-item) playback settings.
    pub dictation: DictationConfig,
    /// Text recognition proxy settings.
    pub ocr: OcrConfig,
}

/// Audio output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz. Must match what the synthesis service emits.
    pub output_sample_rate: u32,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            output_device: None,
        }
    }
}

/// Remote synthesis service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the synthesis endpoint (None = remote engine not
    /// configured; playback goes straight to the fallback bridge).
    pub api_url: Option<String>,
    /// Voice identifier sent with every request.
    pub voice: String,
    /// Upper bound on one whole segment exchange, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            voice: "zh-CN-standard".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Text segmentation configuration.
///
/// The byte budget and the minimum-boundary ratio are empirically chosen
/// values, kept configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Maximum UTF-8 byte length of one segment.
    pub max_segment_bytes: usize,
    /// A boundary is only accepted if it falls at least this fraction into
    /// the current window; earlier boundaries fall through to the next
    /// lower-priority class.
    pub min_boundary_ratio: f32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_segment_bytes: 300,
            min_boundary_ratio: 0.3,
        }
    }
}

/// Dictation playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    /// Silence between items, in seconds.
    pub interval_secs: u64,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self { interval_secs: 3 }
    }
}

/// Text recognition proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// URL of the OCR proxy endpoint (None = recognition unavailable).
    pub api_url: Option<String>,
    /// Retries after a transient error before giving up.
    pub max_retries: u32,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            max_retries: 2,
            request_timeout_secs: 45,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SpeakError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeakError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from the default path, or built-in defaults when
    /// no file exists there.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_default() -> crate::error::Result<Self> {
        let path = Self::default_config_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `~/.config/tingxie/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("tingxie").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("tingxie")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/tingxie-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = EngineConfig::default();
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.chunk.max_segment_bytes, 300);
        assert!((config.chunk.min_boundary_ratio - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.dictation.interval_secs, 3);
        assert_eq!(config.ocr.max_retries, 2);
        assert!(config.tts.api_url.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = EngineConfig::default();
        config.audio.output_sample_rate = 16_000;
        config.tts.api_url = Some("http://localhost:3001/api/tts".to_string());
        config.chunk.max_segment_bytes = 120;

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.audio.output_sample_rate, 16_000);
        assert_eq!(
            loaded.tts.api_url.as_deref(),
            Some("http://localhost:3001/api/tts")
        );
        assert_eq!(loaded.chunk.max_segment_bytes, 120);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed: EngineConfig = toml::from_str("[tts]\nvoice = \"en-US-a\"\n").unwrap();
        assert_eq!(parsed.tts.voice, "en-US-a");
        assert_eq!(parsed.tts.request_timeout_secs, 30);
        assert_eq!(parsed.audio.output_sample_rate, 24_000);
    }
}
