//! GStreamer pipeline descriptions for sources and sinks.

use crate::capture::PixelFormat;
use crate::transport::StreamFormat;
use crate::EncoderConfig;

/// Name of the appsrc element in every bridged sink description.
pub const APPSRC_NAME: &str = "src";

/// Camera front-ends a pipeline can start from.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraInput<'a> {
    /// V4L2 node delivering raw frames
    V4l2 { device: &'a str },
    /// V4L2 node delivering MJPEG, decoded with `decoder`
    V4l2Mjpeg { device: &'a str, decoder: &'a str },
    /// Raspberry Pi camera stack
    Libcamera,
    /// V4L2 depth node delivering Z16 samples
    V4l2Depth { device: &'a str },
    /// Synthetic pattern for bench testing
    TestPattern { pattern: &'a str },
}

/// Caps string for raw video.
pub fn raw_caps(format: Option<PixelFormat>, width: u32, height: u32, fps: u32) -> String {
    match format {
        Some(format) => format!(
            "video/x-raw,format={},width={},height={},framerate={}/1",
            format.caps_name(),
            width,
            height,
            fps
        ),
        None => format!(
            "video/x-raw,width={},height={},framerate={}/1",
            width, height, fps
        ),
    }
}

/// Source element chain up to (not including) any conversion.
fn camera_chain(input: &CameraInput<'_>, width: u32, height: u32, fps: u32) -> String {
    match input {
        CameraInput::V4l2 { device } => {
            format!("v4l2src device={} ! {}", device, raw_caps(None, width, height, fps))
        }
        CameraInput::V4l2Mjpeg { device, decoder } => format!(
            "v4l2src device={} ! image/jpeg,width={},height={},framerate={}/1 ! {}",
            device, width, height, fps, decoder
        ),
        CameraInput::Libcamera => {
            format!("libcamerasrc ! {}", raw_caps(None, width, height, fps))
        }
        CameraInput::V4l2Depth { device } => format!(
            "v4l2src device={} ! {}",
            device,
            raw_caps(Some(PixelFormat::Gray16Le), width, height, fps)
        ),
        CameraInput::TestPattern { pattern } => format!(
            "videotestsrc is-live=true pattern={} ! {}",
            pattern,
            raw_caps(None, width, height, fps)
        ),
    }
}

/// Capture pipeline ending in an appsink named `appsink_name`. Color inputs
/// are converted to RGB; depth keeps its 16-bit samples.
pub fn capture_pipeline(
    input: &CameraInput<'_>,
    width: u32,
    height: u32,
    fps: u32,
    appsink_name: &str,
) -> String {
    let chain = camera_chain(input, width, height, fps);
    match input {
        CameraInput::V4l2Depth { .. } => format!(
            "{} ! queue max-size-buffers=2 leaky=downstream ! appsink name={}",
            chain, appsink_name
        ),
        _ => format!(
            "{} ! queue max-size-buffers=2 leaky=downstream ! videoconvert ! video/x-raw,format=RGB ! appsink name={}",
            chain, appsink_name
        ),
    }
}

/// `videoconvert ! x264enc ! rtph264pay ! udpsink` tail shared by both modes.
fn encode_tail(encoder: &EncoderConfig, host: &str, port: u16) -> String {
    let bitrate = encoder
        .bitrate_kbps
        .map(|kbps| format!(" bitrate={}", kbps))
        .unwrap_or_default();
    format!(
        "videoconvert ! x264enc speed-preset={} tune={}{} ! rtph264pay config-interval={} ! udpsink host={} port={} sync=false",
        encoder.speed_preset, encoder.tune, bitrate, encoder.config_interval, host, port
    )
}

/// Frames the appsrc may hold before a push blocks.
pub const APPSRC_QUEUED_FRAMES: u64 = 2;

/// Byte bound on the appsrc queue for `format`.
pub fn appsrc_max_bytes(format: &StreamFormat) -> u64 {
    format.frame_len() as u64 * APPSRC_QUEUED_FRAMES
}

/// Sink pipeline fed from Rust through an appsrc. A push blocks once the
/// appsrc holds [`APPSRC_QUEUED_FRAMES`] frames.
pub fn appsrc_sink_pipeline(format: &StreamFormat, encoder: &EncoderConfig, host: &str, port: u16) -> String {
    format!(
        "appsrc name={} format=time is-live=true block=true max-bytes={} caps={} ! {}",
        APPSRC_NAME,
        appsrc_max_bytes(format),
        raw_caps(Some(format.format), format.width, format.height, format.fps),
        encode_tail(encoder, host, port)
    )
}

/// Camera straight to the network, no frames cross into Rust.
pub fn relay_pipeline(
    input: &CameraInput<'_>,
    width: u32,
    height: u32,
    fps: u32,
    encoder: &EncoderConfig,
    host: &str,
    port: u16,
) -> String {
    format!(
        "{} ! {}",
        camera_chain(input, width, height, fps),
        encode_tail(encoder, host, port)
    )
}
