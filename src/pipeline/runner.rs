//! Per-stream control loop: fetch → render → measure → publish

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::{FetchMode, FrameSource};
use crate::pipeline::group::Stream;
use crate::pipeline::rate::RateMonitor;
use crate::render::FrameRenderer;
use crate::transport::{SinkChannel, StreamPublisher};

/// Lifecycle of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Why a stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The stop signal was observed
    Shutdown,
    /// The sink kept rejecting buffers
    SinkTerminated { failures: u32 },
    /// The source went away or its pipeline failed
    SourceLost(String),
    /// The sink or source could not be brought up
    StartFailed(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        !matches!(self, StopReason::Shutdown)
    }
}

/// State shared between a stream thread and whoever watches it.
#[derive(Clone)]
pub struct StateCell(Arc<AtomicCell<StreamState>>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicCell::new(StreamState::Starting)))
    }

    pub fn get(&self) -> StreamState {
        self.0.load()
    }

    pub fn set(&self, state: StreamState) {
        self.0.store(state);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep between empty non-blocking polls: a tenth of the frame interval,
/// kept within 200µs..5ms.
pub fn idle_backoff(fps: u32) -> Duration {
    let interval = Duration::from_secs(1) / fps.max(1);
    (interval / 10).clamp(Duration::from_micros(200), Duration::from_millis(5))
}

/// One physical stream: owns its source, renderer and sink exclusively.
pub struct StreamRunner<S: FrameSource, K: SinkChannel> {
    name: String,
    source: S,
    renderer: FrameRenderer,
    publisher: StreamPublisher<K>,
    rate: RateMonitor,
    mode: FetchMode,
    stop: CancellationToken,
    state: StateCell,
}

impl<S: FrameSource, K: SinkChannel> StreamRunner<S, K> {
    pub fn new(
        name: impl Into<String>,
        source: S,
        renderer: FrameRenderer,
        sink: K,
        stop: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            renderer,
            publisher: StreamPublisher::new(sink),
            rate: RateMonitor::new(),
            mode: FetchMode::Blocking,
            stop,
            state: StateCell::new(),
        }
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Drive the stream until it is told to stop or it fails.
    #[instrument(skip(self), fields(stream = %self.name))]
    pub fn run(mut self) -> StopReason {
        self.state.set(StreamState::Starting);

        let (width, height) = self.renderer.dimensions();
        let format = *self.publisher.format();
        if (format.width, format.height) != (width, height) {
            return self.finish(StopReason::StartFailed(format!(
                "renderer is {}x{} but sink expects {}x{}",
                width, height, format.width, format.height
            )));
        }

        if let Err(e) = self.publisher.start() {
            error!("Sink failed to start: {}", e);
            return self.finish(StopReason::StartFailed(e.to_string()));
        }

        self.state.set(StreamState::Running);
        info!(
            "Streaming {:?} source at {}x{}@{} ({:?})",
            self.source.kind(),
            width,
            height,
            format.fps,
            self.mode
        );

        let reason = self.run_loop();
        self.finish(reason)
    }

    fn run_loop(&mut self) -> StopReason {
        let idle = idle_backoff(self.publisher.format().fps);
        loop {
            if self.stop.is_cancelled() {
                return StopReason::Shutdown;
            }

            let fetched = match self.source.fetch(self.mode) {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!("Source lost: {}", e);
                    return StopReason::SourceLost(e.to_string());
                }
            };

            let Some(frame) = fetched.frame else {
                std::thread::sleep(idle);
                continue;
            };

            let fps = self.rate.tick();
            metrics::gauge!("framecast_fps", "stream" => self.name.clone()).set(fps as f64);

            let render_start = Instant::now();
            let image = match self.renderer.render(&frame, fetched.detections.as_deref(), fps) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Skipping frame {}: {}", frame.meta.sequence, e);
                    continue;
                }
            };
            metrics::histogram!("framecast_render_time_us", "stream" => self.name.clone())
                .record(render_start.elapsed().as_micros() as f64);

            match self.publisher.publish(image.as_raw()) {
                Ok(()) => {
                    metrics::counter!("framecast_frames_published", "stream" => self.name.clone())
                        .increment(1);
                    let latency = frame.timestamp.elapsed();
                    debug!("Published frame {} after {:?}", frame.meta.sequence, latency);
                }
                Err(e) if e.is_fatal() => {
                    error!("{}", e);
                    metrics::counter!("framecast_publish_failures", "stream" => self.name.clone())
                        .increment(1);
                    return StopReason::SinkTerminated {
                        failures: self.publisher.consecutive_failures(),
                    };
                }
                Err(e) => {
                    warn!("Dropped frame {}: {}", frame.meta.sequence, e);
                    metrics::counter!("framecast_publish_failures", "stream" => self.name.clone())
                        .increment(1);
                }
            }
        }
    }

    fn finish(mut self, reason: StopReason) -> StopReason {
        self.state.set(StreamState::Stopping);
        self.publisher.close();
        // source and sink handles are released here, before Stopped is visible
        drop(self.source);
        drop(self.publisher);
        self.state.set(StreamState::Stopped);

        if reason.is_failure() {
            warn!("[{}] Stopped: {:?}", self.name, reason);
        } else {
            info!("[{}] Stopped", self.name);
        }
        reason
    }
}

impl<S, K> Stream for StreamRunner<S, K>
where
    S: FrameSource + 'static,
    K: SinkChannel + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StateCell {
        self.state_cell()
    }

    fn run(self) -> StopReason {
        StreamRunner::run(self)
    }
}
