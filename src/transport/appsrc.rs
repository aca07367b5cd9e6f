//! GStreamer sink channel: appsrc → x264enc → rtph264pay → udpsink

use color_eyre::eyre::eyre;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::transport::description::{appsrc_max_bytes, appsrc_sink_pipeline, APPSRC_NAME};
use crate::transport::{SinkChannel, StreamFormat};
use crate::EncoderConfig;

/// Encode/transport pipeline that accepts frames pushed from Rust
pub struct AppSrcChannel {
    name: String,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    format: StreamFormat,
    frame_duration: gst::ClockTime,
    frames: u64,
    closed: bool,
}

impl AppSrcChannel {
    /// Build the H.264/RTP/UDP pipeline for one stream.
    pub fn udp(
        name: &str,
        format: StreamFormat,
        encoder: &EncoderConfig,
        host: &str,
        port: u16,
    ) -> color_eyre::Result<Self> {
        let description = appsrc_sink_pipeline(&format, encoder, host, port);
        Self::from_description(name, format, &description)
    }

    pub fn from_description(
        name: &str,
        format: StreamFormat,
        description: &str,
    ) -> color_eyre::Result<Self> {
        gst::init().map_err(|e| eyre!("Failed to initialize GStreamer: {}", e))?;

        info!("[{}] Sink pipeline: {}", name, description);

        let pipeline = gst::parse::launch(description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| eyre!("Failed to create pipeline"))?;

        let appsrc = pipeline
            .by_name(APPSRC_NAME)
            .ok_or_else(|| eyre!("Failed to find appsrc"))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| eyre!("Failed to cast to AppSrc"))?;

        appsrc.set_property("is-live", true);
        // Bounded queue: pushes wait instead of buffering without limit
        appsrc.set_property("block", true);
        appsrc.set_property("max-bytes", appsrc_max_bytes(&format));
        appsrc.set_property("format", gst::Format::Time);

        let fps = u64::from(format.fps.max(1));
        Ok(Self {
            name: name.to_string(),
            pipeline,
            appsrc,
            format,
            frame_duration: gst::ClockTime::from_nseconds(1_000_000_000 / fps),
            frames: 0,
            closed: false,
        })
    }
}

impl SinkChannel for AppSrcChannel {
    type Buffer = gst::Buffer;

    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SinkError::Pipeline(format!("Failed to start pipeline: {:?}", e)))?;
        info!(
            "[{}] Sink live at {}x{}@{}",
            self.name, self.format.width, self.format.height, self.format.fps
        );
        Ok(())
    }

    fn allocate(&mut self, len: usize) -> Result<gst::Buffer, SinkError> {
        gst::Buffer::with_size(len).map_err(|_| SinkError::Allocation { len })
    }

    fn fill(&mut self, buffer: &mut gst::Buffer, data: &[u8]) -> Result<(), SinkError> {
        let buffer = buffer
            .get_mut()
            .ok_or_else(|| SinkError::Map("buffer is shared".into()))?;

        buffer
            .copy_from_slice(0, data)
            .map_err(|copied| SinkError::Map(format!("copied {} of {} bytes", copied, data.len())))?;

        buffer.set_pts(self.frame_duration * self.frames);
        buffer.set_duration(self.frame_duration);
        Ok(())
    }

    fn push(&mut self, buffer: gst::Buffer) -> Result<(), SinkError> {
        self.frames += 1;
        self.appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| SinkError::Push(format!("{:?}", e)))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.appsrc.end_of_stream() {
            warn!("[{}] Failed to send EOS: {:?}", self.name, e);
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("[{}] Failed to stop pipeline: {:?}", self.name, e);
        }
        info!("[{}] Sink closed after {} frames", self.name, self.frames);
    }
}

impl Drop for AppSrcChannel {
    fn drop(&mut self) {
        self.close();
    }
}
