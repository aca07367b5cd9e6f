//! One thread per stream, joined together at shutdown

use std::thread::JoinHandle;

use tracing::{error, info};

use crate::pipeline::runner::{StateCell, StopReason, StreamState};

/// Anything that can be supervised as a stream.
pub trait Stream: Send + 'static {
    fn name(&self) -> &str;

    /// Handle to the stream's observable state.
    fn state(&self) -> StateCell;

    /// Run to completion on the calling thread.
    fn run(self) -> StopReason;
}

/// A spawned stream.
pub struct StreamHandle {
    name: String,
    state: StateCell,
    join: JoinHandle<StopReason>,
}

impl StreamHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the stream thread. A panicked thread reports `SourceLost`.
    pub fn join(self) -> StopReason {
        match self.join.join() {
            Ok(reason) => reason,
            Err(_) => {
                error!("[{}] Stream thread panicked", self.name);
                self.state.set(StreamState::Stopped);
                StopReason::SourceLost("stream thread panicked".into())
            }
        }
    }
}

/// Every stream of the process.
#[derive(Default)]
pub struct StreamGroup {
    handles: Vec<StreamHandle>,
}

impl StreamGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `stream` on its own named thread.
    pub fn spawn<T: Stream>(&mut self, stream: T) -> std::io::Result<()> {
        let name = stream.name().to_string();
        let state = stream.state();

        let join = std::thread::Builder::new()
            .name(format!("stream-{}", name))
            .spawn(move || stream.run())?;

        info!("[{}] Stream thread started", name);
        self.handles.push(StreamHandle { name, state, join });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[StreamHandle] {
        &self.handles
    }

    /// Current state of each stream, in spawn order.
    pub fn states(&self) -> Vec<(String, StreamState)> {
        self.handles
            .iter()
            .map(|h| (h.name.clone(), h.state()))
            .collect()
    }

    /// True once every stream thread has returned.
    pub fn all_finished(&self) -> bool {
        self.handles.iter().all(StreamHandle::is_finished)
    }

    /// Wait for every stream, in spawn order.
    pub fn join_all(self) -> Vec<(String, StopReason)> {
        self.handles
            .into_iter()
            .map(|handle| {
                let name = handle.name.clone();
                let reason = handle.join();
                (name, reason)
            })
            .collect()
    }
}
