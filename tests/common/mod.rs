#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use framecast::capture::{Detection, DetectionSet, FetchMode, Fetched, FrameSource, SourceKind};
use framecast::error::{SinkError, SourceError};
use framecast::pipeline::StateCell;
use framecast::transport::{SinkChannel, StreamFormat};
use framecast::{Frame, PixelFormat, StreamState};
use tokio_util::sync::CancellationToken;

pub fn black_frame(width: u32, height: u32, sequence: u64) -> Frame {
    Frame::new(
        vec![0u8; PixelFormat::Rgb24.frame_len(width, height)],
        width,
        height,
        PixelFormat::Rgb24,
        sequence,
    )
    .unwrap()
}

pub fn single_box(label: u32, xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> DetectionSet {
    DetectionSet::new(vec![Detection {
        label,
        confidence: 0.87,
        xmin,
        ymin,
        xmax,
        ymax,
    }])
}

/// Source that plays back a script, then either idles or keeps producing
/// black frames.
pub struct ScriptedSource {
    kind: SourceKind,
    script: VecDeque<Result<Fetched, SourceError>>,
    endless: Option<(u32, u32)>,
    pace: Option<Duration>,
    /// Cancel this token from inside the given fetch (1-based)
    stop_on: Option<(usize, CancellationToken)>,
    pub fetches: Arc<AtomicUsize>,
    sequence: u64,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            script: VecDeque::new(),
            endless: None,
            pace: None,
            stop_on: None,
            fetches: Arc::new(AtomicUsize::new(0)),
            sequence: 0,
        }
    }

    /// A fresh black frame on every fetch, one per `pace`.
    pub fn endless(width: u32, height: u32, pace: Duration) -> Self {
        let mut source = Self::new(SourceKind::Color);
        source.endless = Some((width, height));
        source.pace = Some(pace);
        source
    }

    pub fn then_frame(mut self, frame: Frame, detections: Option<DetectionSet>) -> Self {
        self.script.push_back(Ok(Fetched {
            frame: Some(frame),
            detections: detections.map(Arc::new),
        }));
        self
    }

    pub fn then_error(mut self, error: SourceError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn stop_on_fetch(mut self, fetch: usize, stop: CancellationToken) -> Self {
        self.stop_on = Some((fetch, stop));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&mut self, _mode: FetchMode) -> Result<Fetched, SourceError> {
        let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, stop)) = &self.stop_on {
            if *at == count {
                stop.cancel();
            }
        }
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }

        if let Some(next) = self.script.pop_front() {
            return next;
        }
        match self.endless {
            Some((width, height)) => {
                self.sequence += 1;
                Ok(Fetched {
                    frame: Some(black_frame(width, height, self.sequence)),
                    detections: None,
                })
            }
            None => Ok(Fetched::empty()),
        }
    }
}

/// What a [`RecordingSink`] saw, shared with the test body.
#[derive(Default)]
pub struct SinkLog {
    pub pushed: Mutex<Vec<Vec<u8>>>,
    pub push_attempts: AtomicUsize,
    pub closed: AtomicBool,
}

impl SinkLog {
    pub fn pushed_count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }
}

/// Sink that keeps every pushed buffer, or rejects every push.
pub struct RecordingSink {
    format: StreamFormat,
    failing: bool,
    pub log: Arc<SinkLog>,
}

impl RecordingSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            format: StreamFormat::rgb(width, height, 30),
            failing: false,
            log: Arc::new(SinkLog::default()),
        }
    }

    pub fn failing(width: u32, height: u32) -> Self {
        Self {
            failing: true,
            ..Self::new(width, height)
        }
    }
}

impl SinkChannel for RecordingSink {
    type Buffer = Vec<u8>;

    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, SinkError> {
        Ok(vec![0; len])
    }

    fn fill(&mut self, buffer: &mut Vec<u8>, data: &[u8]) -> Result<(), SinkError> {
        buffer.copy_from_slice(data);
        Ok(())
    }

    fn push(&mut self, buffer: Vec<u8>) -> Result<(), SinkError> {
        self.log.push_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(SinkError::Push("not linked".into()));
        }
        self.log.pushed.lock().unwrap().push(buffer);
        Ok(())
    }

    fn close(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn wait_for_state(state: &StateCell, wanted: StreamState) -> bool {
    wait_until(Duration::from_secs(5), || state.get() == wanted)
}

/// RGB triple at (x, y) of a packed RGB buffer `width` pixels wide.
pub fn pixel(buffer: &[u8], width: u32, x: u32, y: u32) -> [u8; 3] {
    let i = ((y * width + x) * 3) as usize;
    [buffer[i], buffer[i + 1], buffer[i + 2]]
}
