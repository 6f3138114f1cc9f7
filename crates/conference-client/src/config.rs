//! Conference client configuration.
//!
//! Configuration is loaded from environment variables. The engine service
//! URL is redacted in Debug output.

use crate::engine::EngineOptions;
use crate::mode::CaptureSettings;
use crate::model::{Facing, Mode};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default room joined when none is given.
pub const DEFAULT_ROOM_ID: &str = "conference";

/// Default engine host domain.
pub const DEFAULT_ENGINE_DOMAIN: &str = "meet.jitsi";

/// Default multi-user-chat domain.
pub const DEFAULT_ENGINE_MUC_DOMAIN: &str = "muc.meet.jitsi";

/// Default signaling endpoint.
pub const DEFAULT_ENGINE_SERVICE_URL: &str = "wss://localhost/xmpp-websocket";

/// Default capture height in pixels.
pub const DEFAULT_CAPTURE_RESOLUTION: u32 = 720;

/// Default capture frame rate.
pub const DEFAULT_CAPTURE_FRAME_RATE: u32 = 30;

/// Conference client configuration.
#[derive(Clone)]
pub struct Config {
    /// Publisher or viewer.
    pub mode: Mode,

    /// Room to join (default: "conference").
    pub room_id: String,

    /// Engine host domain.
    pub engine_domain: String,

    /// Multi-user-chat domain rooms live under.
    pub engine_muc_domain: String,

    /// Signaling endpoint. May carry credentials in its query string.
    pub engine_service_url: String,

    /// Capture height constraint (default: 720).
    pub capture_resolution: u32,

    /// Capture frame rate (default: 30).
    pub capture_frame_rate: u32,

    /// Initial camera facing (default: user).
    pub capture_facing: Facing,

    /// Ask the engine not to compute audio levels (default: true).
    pub disable_audio_levels: bool,
}

/// Custom Debug implementation that redacts the service URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("room_id", &self.room_id)
            .field("engine_domain", &self.engine_domain)
            .field("engine_muc_domain", &self.engine_muc_domain)
            .field("engine_service_url", &"[REDACTED]")
            .field("capture_resolution", &self.capture_resolution)
            .field("capture_frame_rate", &self.capture_frame_rate)
            .field("capture_facing", &self.capture_facing)
            .field("disable_audio_levels", &self.disable_audio_levels)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mode = vars
            .get("CLIENT_MODE")
            .ok_or_else(|| ConfigError::MissingEnvVar("CLIENT_MODE".to_string()))?
            .parse::<Mode>()
            .map_err(ConfigError::InvalidValue)?;

        let room_id = vars
            .get("CLIENT_ROOM_ID")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());

        let engine_domain = vars
            .get("ENGINE_DOMAIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENGINE_DOMAIN.to_string());

        let engine_muc_domain = vars
            .get("ENGINE_MUC_DOMAIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENGINE_MUC_DOMAIN.to_string());

        let engine_service_url = vars
            .get("ENGINE_SERVICE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENGINE_SERVICE_URL.to_string());

        let capture_resolution = vars
            .get("CAPTURE_RESOLUTION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CAPTURE_RESOLUTION);

        let capture_frame_rate = vars
            .get("CAPTURE_FRAME_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CAPTURE_FRAME_RATE);

        let capture_facing = match vars.get("CAPTURE_FACING") {
            Some(raw) => raw.parse::<Facing>().map_err(ConfigError::InvalidValue)?,
            None => Facing::User,
        };

        let disable_audio_levels = match vars.get("ENGINE_DISABLE_AUDIO_LEVELS") {
            Some(raw) => raw.parse::<bool>().map_err(|e| {
                ConfigError::InvalidValue(format!("ENGINE_DISABLE_AUDIO_LEVELS: {e}"))
            })?,
            None => true,
        };

        Ok(Config {
            mode,
            room_id,
            engine_domain,
            engine_muc_domain,
            engine_service_url,
            capture_resolution,
            capture_frame_rate,
            capture_facing,
            disable_audio_levels,
        })
    }

    /// Engine connection options derived from this config.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            domain: self.engine_domain.clone(),
            muc_domain: self.engine_muc_domain.clone(),
            service_url: self.engine_service_url.clone(),
            disable_audio_levels: self.disable_audio_levels,
        }
    }

    #[must_use]
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            resolution: self.capture_resolution,
            frame_rate: self.capture_frame_rate,
        }
    }
}
