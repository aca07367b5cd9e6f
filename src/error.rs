//! Error types for framecast

use thiserror::Error;

use crate::capture::PixelFormat;

/// Failures on the sensor side of a stream.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The producer side of the frame or detection queue has gone away.
    #[error("source disconnected")]
    Disconnected,

    #[error("device error: {0}")]
    Device(String),

    #[error("source pipeline error: {0}")]
    Pipeline(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),
}

/// Failures raised by a sink channel implementation.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to allocate {len}-byte sink buffer")]
    Allocation { len: usize },

    #[error("failed to map sink buffer: {0}")]
    Map(String),

    #[error("sink rejected buffer: {0}")]
    Push(String),

    #[error("sink pipeline error: {0}")]
    Pipeline(String),
}

/// Outcome of a failed [`StreamPublisher::publish`](crate::transport::StreamPublisher::publish).
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("rendered buffer is {actual} bytes, sink expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("buffer allocation failed: {0}")]
    Allocation(#[source] SinkError),

    #[error("push failed ({consecutive} in a row): {source}")]
    Push {
        consecutive: u32,
        #[source]
        source: SinkError,
    },

    #[error("sink terminated after {failures} consecutive push failures")]
    SinkTerminated { failures: u32 },
}

impl PublishError {
    /// Whether the sink behind this publisher should be considered dead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::SinkTerminated { .. })
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot render {0:?} frames in this mode")]
    UnsupportedFormat(PixelFormat),

    #[error("frame buffer does not match its {width}x{height} dimensions")]
    BadBuffer { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid stream '{stream}': {reason}")]
    InvalidStream { stream: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for library entry points that touch several layers.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
