//! Bridge configuration
//!
//! One TOML file with three sections. Every field has a default, so an empty
//! file (or no file at all) gives a working setup.
//!
//! ```toml
//! [input]
//! gamepad = true
//! event_queue = 1000
//!
//! [control]
//! tick_ms = 10
//! translation_deadzone = 10
//! yaw_deadzone = 20
//!
//! [video]
//! listen_addr = "0.0.0.0:11111"
//! keepalive_ms = 100
//!
//! [video.decoder]
//! program = "ffmpeg"
//! ```

use crate::command::VideoBitRate;
use crate::mapping::ControlSettings;
use crate::video::{
    DecoderSettings, FrameGeometry, ReaderSettings, RelaySettings, VideoSettings,
    MAX_FRAME_BYTES,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "telebridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub gamepad: bool,
    pub event_queue: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            gamepad: true,
            event_queue: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_ms: u64,
    pub full_scale_offset: f64,
    pub translation_deadzone: i32,
    pub yaw_deadzone: i32,
    pub command_buffer: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        let settings = ControlSettings::default();
        Self {
            tick_ms: settings.tick.as_millis() as u64,
            full_scale_offset: settings.full_scale_offset,
            translation_deadzone: settings.translation_deadzone,
            yaw_deadzone: settings.yaw_deadzone,
            command_buffer: 256,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    pub listen_addr: SocketAddr,
    pub keepalive_ms: u64,
    pub width: usize,
    pub height: usize,
    pub exposure: Option<i8>,
    pub bitrate: VideoBitRate,
    /// 0 retries forever
    pub max_consecutive_read_failures: u32,
    /// Raw decoded frames are appended here when set
    pub recording_path: Option<PathBuf>,
    pub decoder: DecoderSettings,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let geometry = FrameGeometry::default();
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 11111)),
            keepalive_ms: 100,
            width: geometry.width,
            height: geometry.height,
            exposure: Some(0),
            bitrate: VideoBitRate::Auto,
            max_consecutive_read_failures: ReaderSettings::default().max_consecutive_failures,
            recording_path: None,
            decoder: DecoderSettings::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub input: InputConfig,
    pub control: ControlConfig,
    pub video: VideoConfig,
}

impl BridgeConfig {
    /// `<config dir>/telebridge/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads and validates the configuration
    ///
    /// An explicit path must exist. Without one the default location is used
    /// when present, otherwise built-in defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
                _ => {
                    info!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let config = Self::from_file(&path).await?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content, path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!("Parsed config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let control = &self.control;
        if control.tick_ms == 0 {
            return Err(ConfigError::Invalid("control.tick_ms must be positive".into()));
        }
        if !(control.full_scale_offset.is_finite() && control.full_scale_offset > 0.0) {
            return Err(ConfigError::Invalid(
                "control.full_scale_offset must be positive".into(),
            ));
        }
        if control.translation_deadzone < 0 || control.yaw_deadzone < 0 {
            return Err(ConfigError::Invalid("deadzones must not be negative".into()));
        }

        let video = &self.video;
        if video.keepalive_ms == 0 {
            return Err(ConfigError::Invalid("video.keepalive_ms must be positive".into()));
        }
        let geometry = self.geometry();
        if !geometry.is_supported() {
            return Err(ConfigError::Invalid(format!(
                "video geometry {}x{} is empty or larger than {} bytes per frame",
                video.width, video.height, MAX_FRAME_BYTES
            )));
        }
        if video.decoder.program.trim().is_empty() {
            return Err(ConfigError::Invalid("video.decoder.program is empty".into()));
        }
        if video.decoder.read_frames {
            if let Some(size) = video.decoder.output_size() {
                if size != geometry {
                    return Err(ConfigError::Invalid(format!(
                        "decoder outputs {}x{} but video geometry is {}x{}",
                        size.width, size.height, geometry.width, geometry.height
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.video.width, self.video.height)
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            tick: Duration::from_millis(self.control.tick_ms),
            full_scale_offset: self.control.full_scale_offset,
            translation_deadzone: self.control.translation_deadzone,
            yaw_deadzone: self.control.yaw_deadzone,
        }
    }

    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            relay: RelaySettings {
                keepalive_period: Duration::from_millis(self.video.keepalive_ms),
                bitrate: self.video.bitrate,
                exposure: self.video.exposure,
            },
            reader: ReaderSettings {
                geometry: self.geometry(),
                max_consecutive_failures: self.video.max_consecutive_read_failures,
                ..ReaderSettings::default()
            },
            decoder: self.video.decoder.clone(),
        }
    }
}
