pub mod description;
pub mod publisher;

#[cfg(feature = "gstreamer-pipeline")]
pub mod appsrc;
#[cfg(feature = "gstreamer-pipeline")]
pub mod relay;

pub use publisher::{SinkChannel, StreamFormat, StreamPublisher, MAX_CONSECUTIVE_PUSH_FAILURES};

#[cfg(feature = "gstreamer-pipeline")]
pub use appsrc::AppSrcChannel;
#[cfg(feature = "gstreamer-pipeline")]
pub use relay::RelayStream;
