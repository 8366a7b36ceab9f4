use cam_model::{CaptureOptions, ModelRef, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::targets::{TargetArrangement, TargetOrder};

// =============================================================================
// File config (figment-deserialized from defaults / guess-game.toml / env vars)
// =============================================================================
//
//   guess-game.toml:   [session]
//                      threshold = 0.8
//
//   env var:           GUESS_SESSION__THRESHOLD=0.8   (double underscore = nesting)

/// Config file read from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "guess-game.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub targets: TargetsFileConfig,
}

/// Classifier session knobs (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_capture_size")]
    pub width: u32,
    #[serde(default = "default_capture_size")]
    pub height: u32,
    #[serde(default = "default_flip")]
    pub flip: bool,
    #[serde(default = "default_model_url")]
    pub model_url: String,
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            frame_interval_ms: default_frame_interval_ms(),
            width: default_capture_size(),
            height: default_capture_size(),
            flip: default_flip(),
            model_url: default_model_url(),
            metadata_url: default_metadata_url(),
        }
    }
}

/// Target sequence knobs (lives under `[targets]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetsFileConfig {
    #[serde(default)]
    pub order: TargetOrder,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_threshold() -> f32 {
    cam_model::DEFAULT_THRESHOLD
}
fn default_frame_interval_ms() -> u64 {
    cam_model::DEFAULT_FRAME_INTERVAL.as_millis() as u64
}
fn default_capture_size() -> u32 {
    200
}
fn default_flip() -> bool {
    true
}
fn default_model_url() -> String {
    ModelRef::default().model_url
}
fn default_metadata_url() -> String {
    ModelRef::default().metadata_url
}

/// Build a figment that layers: defaults → config file → GUESS_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `GUESS_SESSION__THRESHOLD=0.8`  →  `session.threshold = 0.8`
///   `GUESS_TARGETS__ORDER=shuffled`  →  `targets.order = "shuffled"`
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("GUESS_").split("__"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),

    #[error("threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f32),

    #[error("frame interval must be at least 1ms")]
    ZeroFrameInterval,
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct GameConfig {
    pub session: SessionConfig,
    pub targets: TargetArrangement,
}

impl GameConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ConfigError> {
        let s = &fc.session;
        if !(0.0..=1.0).contains(&s.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(s.threshold));
        }
        if s.frame_interval_ms == 0 {
            return Err(ConfigError::ZeroFrameInterval);
        }

        Ok(Self {
            session: SessionConfig {
                threshold: s.threshold,
                frame_interval: Duration::from_millis(s.frame_interval_ms),
                capture: CaptureOptions {
                    width: s.width,
                    height: s.height,
                    flip: s.flip,
                },
                model: ModelRef {
                    model_url: s.model_url.clone(),
                    metadata_url: s.metadata_url.clone(),
                },
            },
            targets: TargetArrangement {
                order: fc.targets.order,
                seed: fc.targets.seed,
            },
        })
    }

    /// Extract and validate configuration, reading `config_file` if it exists
    pub fn load(config_file: &Path) -> Result<Self, ConfigError> {
        let fc: FileConfig = load_config(config_file).extract()?;
        debug!("Loaded configuration: {:?}", fc);
        Self::from_file(&fc)
    }
}
