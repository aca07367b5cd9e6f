pub mod group;
pub mod rate;
pub mod runner;

pub use group::{Stream, StreamGroup, StreamHandle};
pub use rate::RateMonitor;
pub use runner::{StateCell, StopReason, StreamRunner, StreamState};
