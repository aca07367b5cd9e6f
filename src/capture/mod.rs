pub mod detection;
pub mod frame;
pub mod source;

#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;

pub use detection::{Detection, DetectionSet, LabelTable};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use source::{
    FeederSlot, FetchMode, Fetched, FrameFeeder, FrameSource, QueuedSource, SourceKind,
};

#[cfg(feature = "gstreamer-pipeline")]
pub use gst_capture::{GstCapture, GstFrameSource};
