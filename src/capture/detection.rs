//! Detection records and the JSON-lines feed an inference process writes into.

use std::borrow::Cow;
use std::io::BufRead;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Class names of the hazmat placard detector.
pub const HAZMAT_LABELS: [&str; 15] = [
    "blasting_agents",
    "corrosive",
    "dangerous_when_wet",
    "explosives",
    "flammable_gas",
    "flammable_solid",
    "fuel_oil",
    "inhalation_hazard",
    "non_flammable_gas",
    "organic_peroxide",
    "oxidizer",
    "oxygen",
    "poison",
    "radioactive",
    "spontaneously_combustible",
];

/// One recognized object. Coordinates are normalized to the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: u32,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Detection {
    /// Pixel-space corners `(x1, y1, x2, y2)`, truncated toward zero.
    pub fn pixel_box(&self, width: u32, height: u32) -> (i32, i32, i32, i32) {
        let w = width as f32;
        let h = height as f32;
        (
            (self.xmin * w) as i32,
            (self.ymin * h) as i32,
            (self.xmax * w) as i32,
            (self.ymax * h) as i32,
        )
    }
}

/// Detections produced by one inference cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
    /// Sequence number of the frame these detections were computed on.
    /// Sets that carry one are matched to their frame in blocking mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(skip, default = "Instant::now")]
    pub received: Instant,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            sequence: None,
            received: Instant::now(),
        }
    }

    pub fn for_frame(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }
}

impl Default for DetectionSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Ordered class names indexed by detection label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Class name for `index`, or the index itself when the table is too short.
    pub fn resolve(&self, index: u32) -> Cow<'_, str> {
        match self.labels.get(index as usize) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(index.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(HAZMAT_LABELS)
    }
}

/// Read detection sets line by line and forward them until the reader ends or
/// the receiving side hangs up. Returns the number of sets forwarded.
pub fn forward_detection_lines<R: BufRead>(reader: R, tx: &flume::Sender<DetectionSet>) -> usize {
    let mut forwarded = 0;

    for (lineno, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Detection feed read error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let set = match serde_json::from_str::<DetectionSet>(&line) {
            Ok(set) => set,
            Err(e) => {
                warn!("Skipping malformed detection record on line {}: {}", lineno + 1, e);
                continue;
            }
        };

        debug!("Received {} detections", set.len());
        if tx.send(set).is_err() {
            debug!("Detection queue closed, stopping feed");
            break;
        }
        forwarded += 1;
    }

    info!("Detection feed ended after {} sets", forwarded);
    forwarded
}
