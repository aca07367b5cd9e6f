//! Sink channel contract and the publisher that feeds it

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::PixelFormat;
use crate::error::{PublishError, SinkError};

/// Consecutive push failures after which a sink is considered dead.
pub const MAX_CONSECUTIVE_PUSH_FAILURES: u32 = 3;

/// Caps a sink channel was negotiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
}

impl StreamFormat {
    pub fn rgb(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            format: PixelFormat::Rgb24,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.format.frame_len(self.width, self.height)
    }
}

/// One encode/transport channel. Buffers are allocated by the sink, filled by
/// the caller, and handed back on push; a buffer that never reaches `push` is
/// simply dropped.
pub trait SinkChannel: Send {
    type Buffer;

    fn format(&self) -> &StreamFormat;

    /// Bring the channel up. Called once before the first allocation.
    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn allocate(&mut self, len: usize) -> Result<Self::Buffer, SinkError>;

    fn fill(&mut self, buffer: &mut Self::Buffer, data: &[u8]) -> Result<(), SinkError>;

    /// Takes ownership of `buffer` whether or not the push succeeds.
    fn push(&mut self, buffer: Self::Buffer) -> Result<(), SinkError>;

    /// Tear the channel down. Must be safe to call more than once.
    fn close(&mut self);
}

/// Copies rendered frames into sink buffers and tracks push health.
pub struct StreamPublisher<K: SinkChannel> {
    sink: K,
    consecutive_failures: u32,
    published: u64,
}

impl<K: SinkChannel> StreamPublisher<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            consecutive_failures: 0,
            published: 0,
        }
    }

    pub fn format(&self) -> &StreamFormat {
        self.sink.format()
    }

    pub fn start(&mut self) -> Result<(), SinkError> {
        self.sink.start()
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Submit one frame's worth of bytes.
    pub fn publish(&mut self, data: &[u8]) -> Result<(), PublishError> {
        let expected = self.sink.format().frame_len();
        if data.len() != expected {
            return Err(PublishError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut buffer = self.sink.allocate(expected).map_err(PublishError::Allocation)?;
        self.sink
            .fill(&mut buffer, data)
            .map_err(PublishError::Allocation)?;

        match self.sink.push(buffer) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.published += 1;
                Ok(())
            }
            Err(source) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_PUSH_FAILURES {
                    warn!(
                        "Sink failed {} pushes in a row, giving up: {}",
                        self.consecutive_failures, source
                    );
                    Err(PublishError::SinkTerminated {
                        failures: self.consecutive_failures,
                    })
                } else {
                    debug!("Push failed ({} in a row): {}", self.consecutive_failures, source);
                    Err(PublishError::Push {
                        consecutive: self.consecutive_failures,
                        source,
                    })
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.sink.close();
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}
