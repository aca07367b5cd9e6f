//! Turns a [`Config`] into running streams

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use color_eyre::{eyre::WrapErr, Result};
use gstreamer as gst;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::detection::forward_detection_lines;
use crate::capture::gst_capture::APPSINK_NAME;
use crate::capture::source::QUEUE_DEPTH;
use crate::capture::{DetectionSet, GstFrameSource};
use crate::pipeline::{StreamGroup, StreamRunner};
use crate::render::{FrameRenderer, RenderMode};
use crate::transport::description::{capture_pipeline, relay_pipeline, CameraInput};
use crate::transport::{AppSrcChannel, RelayStream};
use crate::{Config, SourceConfig, StreamConfig};

/// Pick the best available JPEG decoder element.
pub fn detect_jpeg_decoder() -> &'static str {
    let decoders = [
        "nvjpegdec",    // NVIDIA
        "vaapijpegdec", // Intel/AMD VAAPI
        "v4l2jpegdec",  // V4L2 M2M
        "jpegdec",      // Software
    ];

    for decoder in &decoders {
        if gst::ElementFactory::find(decoder).is_some() {
            info!("Using JPEG decoder: {}", decoder);
            return decoder;
        }
    }

    "jpegdec"
}

fn camera_input<'a>(source: &'a SourceConfig, decoder: &'a str) -> CameraInput<'a> {
    match source {
        SourceConfig::V4l2 { device, mjpeg: true } => CameraInput::V4l2Mjpeg { device, decoder },
        SourceConfig::V4l2 { device, .. } | SourceConfig::Detector { device, .. } => {
            CameraInput::V4l2 { device }
        }
        SourceConfig::Libcamera => CameraInput::Libcamera,
        SourceConfig::Depth { device, .. } => CameraInput::V4l2Depth { device },
        SourceConfig::TestPattern { pattern } => CameraInput::TestPattern { pattern },
    }
}

/// Read the JSON-lines detection feed on a background thread. The thread is
/// detached; it ends when the feed does or when the stream drops its queue.
fn spawn_detection_feed(
    name: &str,
    feed: Option<PathBuf>,
) -> Result<flume::Receiver<DetectionSet>> {
    let (tx, rx) = flume::bounded(QUEUE_DEPTH);

    let reader: Box<dyn io::BufRead + Send> = match &feed {
        Some(path) => {
            info!("[{}] Reading detections from {}", name, path.display());
            Box::new(BufReader::new(File::open(path)?))
        }
        None => {
            info!("[{}] Reading detections from stdin", name);
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let stream = name.to_string();
    std::thread::Builder::new()
        .name(format!("detections-{}", name))
        .spawn(move || {
            let forwarded = forward_detection_lines(reader, &tx);
            warn!("[{}] Detection feed closed after {} sets", stream, forwarded);
        })?;

    Ok(rx)
}

fn bridged_stream(
    config: &Config,
    stream: &StreamConfig,
    decoder: &str,
    stop: &CancellationToken,
) -> Result<StreamRunner<GstFrameSource, AppSrcChannel>> {
    let input = camera_input(&stream.source, decoder);
    let capture = capture_pipeline(&input, stream.width, stream.height, stream.fps, APPSINK_NAME);

    let (source, mode) = match &stream.source {
        SourceConfig::Depth { depth_scale, .. } => (
            GstFrameSource::depth(&stream.name, &capture)?,
            RenderMode::depth(*depth_scale),
        ),
        SourceConfig::Detector { feed, .. } => {
            let detections = spawn_detection_feed(&stream.name, feed.clone())?;
            (
                GstFrameSource::detector(&stream.name, &capture, detections)?,
                RenderMode::Annotate(config.label_table()),
            )
        }
        _ => (GstFrameSource::color(&stream.name, &capture)?, RenderMode::Color),
    };

    let renderer =
        FrameRenderer::new(stream.width, stream.height, mode).with_fps_overlay(stream.show_fps);
    let sink = AppSrcChannel::udp(
        &stream.name,
        stream.format(),
        &config.sink.encoder,
        &config.sink.host,
        stream.port,
    )?;

    Ok(StreamRunner::new(&stream.name, source, renderer, sink, stop.clone())
        .with_fetch_mode(stream.fetch_mode))
}

/// Build every configured stream and start it in `group`.
///
/// Streams already spawned keep running if a later one fails to build; the
/// caller decides whether to cancel them.
pub fn spawn_streams(
    config: &Config,
    stop: &CancellationToken,
    group: &mut StreamGroup,
) -> Result<()> {
    let needs_decoder = config
        .streams
        .iter()
        .any(|s| matches!(s.source, SourceConfig::V4l2 { mjpeg: true, .. }));
    let decoder = if needs_decoder {
        detect_jpeg_decoder()
    } else {
        "jpegdec"
    };

    for stream in &config.streams {
        info!(
            "[{}] {}x{}@{} -> {}:{}{}",
            stream.name,
            stream.width,
            stream.height,
            stream.fps,
            config.sink.host,
            stream.port,
            if stream.relay { " (relay)" } else { "" }
        );

        if stream.relay {
            let input = camera_input(&stream.source, decoder);
            let description = relay_pipeline(
                &input,
                stream.width,
                stream.height,
                stream.fps,
                &config.sink.encoder,
                &config.sink.host,
                stream.port,
            );
            let relay = RelayStream::new(&stream.name, &description, stop.clone())?;
            group.spawn(relay)?;
        } else {
            let runner = bridged_stream(config, stream, decoder, stop)
                .wrap_err_with(|| format!("[{}] Failed to build stream", stream.name))?;
            group.spawn(runner)?;
        }
    }

    Ok(())
}
