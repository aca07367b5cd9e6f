//! Frame sources: the sensor side of a stream.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::capture::{DetectionSet, Frame};
use crate::error::SourceError;

/// How a runner pulls from its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Wait for a frame (and its paired detections, if any).
    #[default]
    Blocking,
    /// Take whatever is buffered right now.
    NonBlocking,
}

/// Which kind of sensor a source wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Color,
    Depth,
    Detector,
}

/// Result of one fetch. Either half may be missing.
#[derive(Debug, Default)]
pub struct Fetched {
    pub frame: Option<Frame>,
    pub detections: Option<Arc<DetectionSet>>,
}

impl Fetched {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none() && self.detections.is_none()
    }
}

/// Anything a stream runner can pull frames from.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    /// A transient miss is `Ok(Fetched::empty())`, never an error.
    fn fetch(&mut self, mode: FetchMode) -> Result<Fetched, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn fetch(&mut self, mode: FetchMode) -> Result<Fetched, SourceError> {
        (**self).fetch(mode)
    }
}

/// Depth of the SDK-side output queues.
pub const QUEUE_DEPTH: usize = 4;

/// Producer half of a frame queue. Never blocks: when the queue is full the
/// oldest frame is discarded to make room.
#[derive(Clone)]
pub struct FrameFeeder {
    tx: flume::Sender<Frame>,
    overflow: flume::Receiver<Frame>,
}

impl FrameFeeder {
    pub fn feed(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(flume::TrySendError::Full(back)) => {
                    trace!("Frame queue full, dropping oldest");
                    let _ = self.overflow.try_recv();
                    frame = back;
                }
                Err(flume::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Bounded drop-oldest frame queue.
pub fn frame_queue(depth: usize) -> (FrameFeeder, flume::Receiver<Frame>) {
    let (tx, rx) = flume::bounded(depth.max(1));
    (
        FrameFeeder {
            tx,
            overflow: rx.clone(),
        },
        rx,
    )
}

/// A [`FrameFeeder`] shared by producer callbacks. Closing the slot drops
/// the sender: a blocked fetch drains what is queued, then disconnects.
#[derive(Clone)]
pub struct FeederSlot(Arc<Mutex<Option<FrameFeeder>>>);

impl FeederSlot {
    pub fn new(feeder: FrameFeeder) -> Self {
        Self(Arc::new(Mutex::new(Some(feeder))))
    }

    pub fn feed(&self, frame: Frame) {
        if let Ok(guard) = self.0.lock() {
            if let Some(feeder) = guard.as_ref() {
                feeder.feed(frame);
            }
        }
    }

    /// Returns true if this call closed the slot.
    pub fn close(&self) -> bool {
        match self.0.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(_) => false,
        }
    }
}

/// A source fed by SDK output queues: one for frames and, for detector
/// sensors, one for detection sets.
pub struct QueuedSource {
    kind: SourceKind,
    frames: flume::Receiver<Frame>,
    detections: Option<flume::Receiver<DetectionSet>>,
    latest: Option<Arc<DetectionSet>>,
    /// Set received ahead of its frame, held for the next blocking fetch
    pending: Option<DetectionSet>,
}

impl QueuedSource {
    pub fn color(frames: flume::Receiver<Frame>) -> Self {
        Self::new(SourceKind::Color, frames, None)
    }

    pub fn depth(frames: flume::Receiver<Frame>) -> Self {
        Self::new(SourceKind::Depth, frames, None)
    }

    pub fn detector(
        frames: flume::Receiver<Frame>,
        detections: flume::Receiver<DetectionSet>,
    ) -> Self {
        Self::new(SourceKind::Detector, frames, Some(detections))
    }

    fn new(
        kind: SourceKind,
        frames: flume::Receiver<Frame>,
        detections: Option<flume::Receiver<DetectionSet>>,
    ) -> Self {
        Self {
            kind,
            frames,
            detections,
            latest: None,
            pending: None,
        }
    }

    /// Wait for a frame and, for detectors, the set computed on it. Sets
    /// tagged with a frame sequence are matched by it: whichever side is
    /// older is discarded, so frames dropped on overflow cannot shift the
    /// pairing. Untagged sets pair in arrival order.
    fn fetch_blocking(&mut self) -> Result<Fetched, SourceError> {
        let mut frame = self.frames.recv().map_err(|_| SourceError::Disconnected)?;

        let Some(rx) = &self.detections else {
            return Ok(Fetched {
                frame: Some(frame),
                detections: None,
            });
        };

        loop {
            let set = match self.pending.take() {
                Some(set) => set,
                None => rx.recv().map_err(|_| SourceError::Disconnected)?,
            };

            let sequence = frame.meta.sequence;
            match set.sequence {
                Some(tagged) if tagged < sequence => {
                    trace!("Discarding detections for dropped frame {}", tagged);
                }
                Some(tagged) if tagged > sequence => {
                    trace!("No detections for frame {}, skipping it", sequence);
                    self.pending = Some(set);
                    frame = self.frames.recv().map_err(|_| SourceError::Disconnected)?;
                }
                _ => {
                    let set = Arc::new(set);
                    self.latest = Some(set.clone());
                    return Ok(Fetched {
                        frame: Some(frame),
                        detections: Some(set),
                    });
                }
            }
        }
    }

    fn fetch_now(&mut self) -> Result<Fetched, SourceError> {
        let frame = match self.frames.try_recv() {
            Ok(frame) => Some(frame),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => return Err(SourceError::Disconnected),
        };

        let feed_closed = match &self.detections {
            Some(rx) => match rx.try_recv() {
                Ok(set) => {
                    self.latest = Some(Arc::new(set));
                    false
                }
                Err(flume::TryRecvError::Empty) => false,
                Err(flume::TryRecvError::Disconnected) => true,
            },
            None => false,
        };
        // Frames keep flowing with the last known set
        if feed_closed {
            debug!("Detection queue closed, keeping the last set");
            self.detections = None;
        }

        Ok(Fetched {
            frame,
            detections: self.latest.clone(),
        })
    }
}

impl FrameSource for QueuedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&mut self, mode: FetchMode) -> Result<Fetched, SourceError> {
        match mode {
            FetchMode::Blocking => self.fetch_blocking(),
            FetchMode::NonBlocking => self.fetch_now(),
        }
    }
}
