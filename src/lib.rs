pub mod capture;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod transport;

#[cfg(feature = "v4l2-probe")]
pub mod utils;

#[cfg(feature = "gstreamer-pipeline")]
pub mod launch;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use capture::detection::HAZMAT_LABELS;
use capture::{FetchMode, LabelTable};
use serde::{Deserialize, Serialize};
use transport::StreamFormat;

pub use capture::{Frame, PixelFormat};
pub use error::{ConfigError, Error, Result};
pub use pipeline::{StopReason, StreamGroup, StreamRunner, StreamState};

/// Environment prefix for configuration overrides (`FRAMECAST__SINK__HOST=…`).
pub const ENV_PREFIX: &str = "FRAMECAST";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sink: SinkConfig,
    /// Class names for detector streams, indexed by label
    pub labels: Vec<String>,
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Receiver address every stream is sent to
    pub host: String,
    pub encoder: EncoderConfig,
}

/// x264/RTP settings shared by every stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub speed_preset: String,
    pub tune: String,
    pub config_interval: u32,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub port: u16,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub source: SourceConfig,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    /// Burn the measured frame rate into the picture
    #[serde(default)]
    pub show_fps: bool,
    /// Send the camera straight to the network without the Rust bridge
    #[serde(default)]
    pub relay: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    V4l2 {
        device: String,
        #[serde(default)]
        mjpeg: bool,
    },
    Libcamera,
    Depth {
        device: String,
        depth_scale: f32,
    },
    Detector {
        device: String,
        /// JSON-lines detection feed; stdin when unset
        #[serde(default)]
        feed: Option<PathBuf>,
    },
    TestPattern {
        #[serde(default = "default_pattern")]
        pattern: String,
    },
}

fn default_pattern() -> String {
    "smpte".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            labels: HAZMAT_LABELS.iter().map(|s| s.to_string()).collect(),
            streams: Vec::new(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            speed_preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            config_interval: 1,
            bitrate_kbps: None,
        }
    }
}

impl Config {
    /// Load and validate: defaults, then the TOML file at `path` (if any),
    /// then `FRAMECAST__…` environment variables.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let config = Self::layered(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same layering as [`Config::load`] without validation, for callers that
    /// fill in the streams themselves.
    pub fn layered(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn label_table(&self) -> LabelTable {
        LabelTable::new(self.labels.iter().cloned())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sink.host.trim().is_empty() {
            return Err(ConfigError::Invalid("sink host is empty".into()));
        }
        if self.streams.is_empty() {
            return Err(ConfigError::Invalid("no streams configured".into()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for stream in &self.streams {
            stream.validate()?;
            if !names.insert(stream.name.as_str()) {
                return Err(stream.invalid("duplicate stream name"));
            }
            if !ports.insert(stream.port) {
                return Err(stream.invalid(format!("port {} is used twice", stream.port)));
            }
        }
        Ok(())
    }
}

impl StreamConfig {
    /// Caps of the sink this stream publishes into.
    pub fn format(&self) -> StreamFormat {
        StreamFormat::rgb(self.width, self.height, self.fps)
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidStream {
            stream: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(self.invalid("width and height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(self.invalid("fps must be non-zero"));
        }
        if self.port == 0 {
            return Err(self.invalid("port must be non-zero"));
        }

        match &self.source {
            SourceConfig::Depth { depth_scale, .. } if !(depth_scale.is_finite() && *depth_scale > 0.0) => {
                Err(self.invalid("depth_scale must be a positive number"))
            }
            SourceConfig::Depth { .. } | SourceConfig::Detector { .. } if self.relay => {
                Err(self.invalid("depth and detector streams cannot be relayed"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(name: &str, port: u16, source: SourceConfig) -> StreamConfig {
        StreamConfig {
            name: name.to_string(),
            port,
            width: 640,
            height: 480,
            fps: 30,
            source,
            fetch_mode: FetchMode::Blocking,
            show_fps: false,
            relay: false,
        }
    }

    #[test]
    fn defaults_match_the_field_setup() {
        let config = Config::default();
        assert_eq!(config.sink.encoder.speed_preset, "ultrafast");
        assert_eq!(config.sink.encoder.tune, "zerolatency");
        assert_eq!(config.sink.encoder.config_interval, 1);
        assert_eq!(config.label_table().len(), 15);
    }

    #[test]
    fn validation_catches_bad_streams() {
        let mut config = Config::default();
        assert!(config.validate().is_err(), "no streams");

        config.streams.push(stream(
            "color",
            5000,
            SourceConfig::V4l2 {
                device: "/dev/video0".into(),
                mjpeg: false,
            },
        ));
        assert!(config.validate().is_ok());

        config.streams.push(stream(
            "depth",
            5000,
            SourceConfig::Depth {
                device: "/dev/video2".into(),
                depth_scale: 4000.0,
            },
        ));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStream { .. })
        ));

        config.streams[1].port = 5001;
        assert!(config.validate().is_ok());

        config.streams[1].source = SourceConfig::Depth {
            device: "/dev/video2".into(),
            depth_scale: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_streams_from_toml() {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
labels = ["a", "b"]

[sink]
host = "192.168.1.20"

[sink.encoder]
bitrate_kbps = 2000

[[streams]]
name = "color"
port = 5000
width = 1280
height = 720
fps = 30
source = {{ kind = "v4l2", device = "/dev/video4" }}

[[streams]]
name = "depth"
port = 5001
width = 640
height = 480
fps = 30
show_fps = true
source = {{ kind = "depth", device = "/dev/video2", depth_scale = 4000.0 }}
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.sink.host, "192.168.1.20");
        assert_eq!(config.sink.encoder.bitrate_kbps, Some(2000));
        assert_eq!(config.sink.encoder.speed_preset, "ultrafast");
        assert_eq!(config.labels, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[0].format().frame_len(), 1280 * 720 * 3);
        assert_eq!(config.streams[0].fetch_mode, FetchMode::Blocking);
        assert!(config.streams[1].show_fps);
        assert_eq!(
            config.streams[1].source,
            SourceConfig::Depth {
                device: "/dev/video2".into(),
                depth_scale: 4000.0
            }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn detector_streams_cannot_relay() {
        let mut s = stream(
            "oak",
            5000,
            SourceConfig::Detector {
                device: "/dev/video0".into(),
                feed: None,
            },
        );
        s.relay = true;
        assert!(s.validate().is_err());
    }
}
