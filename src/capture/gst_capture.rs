//! GStreamer-backed frame sources: an `appsink` pipeline feeding the frame queue

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, error, info, warn};

use crate::capture::frame::{pack_rows, Frame, PixelFormat};
use crate::capture::source::{
    frame_queue, FeederSlot, FetchMode, Fetched, FrameFeeder, FrameSource, QueuedSource, SourceKind,
    QUEUE_DEPTH,
};
use crate::capture::DetectionSet;
use crate::error::SourceError;

/// Name the appsink must carry in every source description.
pub const APPSINK_NAME: &str = "sink";

/// Capture pipeline whose appsink pushes every sample into a frame queue
pub struct GstCapture {
    pipeline: gst::Pipeline,
    name: String,
}

impl GstCapture {
    /// Parse `description`, hook its appsink up to `feeder` and start it.
    pub fn start(name: &str, description: &str, feeder: FrameFeeder) -> Result<Self, SourceError> {
        gst::init().map_err(|e| SourceError::Pipeline(format!("Failed to initialize GStreamer: {}", e)))?;

        info!("[{}] Capture pipeline: {}", name, description);

        let pipeline = gst::parse::launch(description)
            .map_err(|e| SourceError::Pipeline(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| SourceError::Pipeline("description is not a pipeline".into()))?;

        let appsink = pipeline
            .by_name(APPSINK_NAME)
            .ok_or_else(|| SourceError::Pipeline(format!("no element named '{}'", APPSINK_NAME)))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| SourceError::Pipeline(format!("'{}' is not an appsink", APPSINK_NAME)))?;

        // Drop old buffers if we can't keep up, never sync to the clock
        appsink.set_property("max-buffers", 2u32);
        appsink.set_property("drop", true);
        appsink.set_property("sync", false);

        // End of stream or a pipeline error closes the slot, waking a blocked fetch
        let slot = FeederSlot::new(feeder);
        let sample_slot = slot.clone();
        let eos_slot = slot.clone();
        let stream_name = name.to_string();
        let mut sequence = 0u64;

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    sequence += 1;
                    match frame_from_sample(&sample, sequence) {
                        Ok(frame) => sample_slot.feed(frame),
                        Err(e) => warn!("[{}] Dropping sample: {}", stream_name, e),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .eos(move |_| {
                    eos_slot.close();
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| SourceError::Pipeline("pipeline has no bus".into()))?;
        let bus_name = name.to_string();
        bus.set_sync_handler(move |_, msg| {
            if let gst::MessageView::Error(err) = msg.view() {
                if slot.close() {
                    error!("[{}] Capture pipeline error: {}", bus_name, err.error());
                }
            }
            // Messages still reach the bus queue for poll_bus
            gst::BusSyncReply::Pass
        });

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SourceError::Device(format!("Failed to start capture: {:?}", e)))?;

        let (state_change, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(5)));
        match state_change {
            Ok(gst::StateChangeSuccess::Success) | Ok(gst::StateChangeSuccess::NoPreroll) => {
                info!("[{}] Capture pipeline started", name);
            }
            Ok(gst::StateChangeSuccess::Async) => {
                info!("[{}] Capture pipeline starting asynchronously", name);
            }
            Err(e) => {
                let _ = pipeline.set_state(gst::State::Null);
                return Err(SourceError::Device(format!("Capture pipeline failed to start: {:?}", e)));
            }
        }

        Ok(Self {
            pipeline,
            name: name.to_string(),
        })
    }

    /// Surface pipeline errors posted since the last call.
    pub fn poll_bus(&self) -> Result<(), SourceError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };

        while let Some(msg) = bus.pop_filtered(&[
            gst::MessageType::Error,
            gst::MessageType::Warning,
            gst::MessageType::Eos,
        ]) {
            use gst::MessageView;

            match msg.view() {
                MessageView::Eos(..) => {
                    // Queued frames still drain; the closed slot ends the source
                    info!("[{}] Capture reached end of stream", self.name);
                }
                MessageView::Error(err) => {
                    return Err(SourceError::Pipeline(format!(
                        "Error from {:?}: {} ({:?})",
                        err.src().map(|s| s.path_string()),
                        err.error(),
                        err.debug()
                    )));
                }
                MessageView::Warning(warning) => {
                    warn!(
                        "[{}] Warning from {:?}: {} ({:?})",
                        self.name,
                        warning.src().map(|s| s.path_string()),
                        warning.error(),
                        warning.debug()
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Stop the capture pipeline
    pub fn stop(&mut self) {
        debug!("[{}] Stopping capture pipeline", self.name);
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("[{}] Failed to stop capture pipeline: {:?}", self.name, e);
        }
    }
}

impl Drop for GstCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_from_sample(sample: &gst::Sample, sequence: u64) -> Result<Frame, SourceError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| SourceError::InvalidFrame("sample contains no buffer".into()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| SourceError::InvalidFrame("sample has no caps".into()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|_| SourceError::InvalidFrame("failed to parse video info from caps".into()))?;

    let format = match info.format() {
        gst_video::VideoFormat::Rgb => PixelFormat::Rgb24,
        gst_video::VideoFormat::Bgr => PixelFormat::Bgr24,
        gst_video::VideoFormat::Gray16Le => PixelFormat::Gray16Le,
        other => return Err(SourceError::UnsupportedFormat(format!("{:?}", other))),
    };

    let map = buffer
        .map_readable()
        .map_err(|_| SourceError::InvalidFrame("failed to map buffer".into()))?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * format.bytes_per_pixel();
    let stride = info.stride()[0].max(0) as usize;

    let packed_len = row_bytes * height as usize;
    let data = if stride == row_bytes && map.len() >= packed_len {
        bytes::Bytes::copy_from_slice(&map.as_slice()[..packed_len])
    } else {
        pack_rows(map.as_slice(), stride, row_bytes, height as usize)
            .ok_or_else(|| SourceError::InvalidFrame("buffer shorter than its stride".into()))?
            .into()
    };

    let device_ts = buffer.pts().map(|pts| Duration::from_nanos(pts.nseconds()));
    Ok(Frame::new(data, width, height, format, sequence)?.with_device_timestamp(device_ts))
}

/// A [`QueuedSource`] that owns the capture pipeline filling it.
pub struct GstFrameSource {
    capture: GstCapture,
    queue: QueuedSource,
}

impl GstFrameSource {
    pub fn color(name: &str, description: &str) -> Result<Self, SourceError> {
        Self::launch(name, description, QueuedSource::color)
    }

    pub fn depth(name: &str, description: &str) -> Result<Self, SourceError> {
        Self::launch(name, description, QueuedSource::depth)
    }

    /// Frames from `description`, detections from `detections`.
    pub fn detector(
        name: &str,
        description: &str,
        detections: flume::Receiver<DetectionSet>,
    ) -> Result<Self, SourceError> {
        Self::launch(name, description, move |frames| {
            QueuedSource::detector(frames, detections)
        })
    }

    fn launch(
        name: &str,
        description: &str,
        make: impl FnOnce(flume::Receiver<Frame>) -> QueuedSource,
    ) -> Result<Self, SourceError> {
        let (feeder, frames) = frame_queue(QUEUE_DEPTH);
        let capture = GstCapture::start(name, description, feeder)?;
        Ok(Self {
            capture,
            queue: make(frames),
        })
    }
}

impl FrameSource for GstFrameSource {
    fn kind(&self) -> SourceKind {
        self.queue.kind()
    }

    fn fetch(&mut self, mode: FetchMode) -> Result<Fetched, SourceError> {
        self.capture.poll_bus()?;
        match self.queue.fetch(mode) {
            // Report the pipeline error that closed the queue, if there was one
            Err(SourceError::Disconnected) => {
                self.capture.poll_bus()?;
                Err(SourceError::Disconnected)
            }
            other => other,
        }
    }
}
