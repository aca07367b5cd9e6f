//! Direct relay: one GStreamer pipeline from camera to UDP, supervised like a
//! bridged stream

use color_eyre::{eyre::eyre, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::pipeline::{StateCell, StopReason, Stream, StreamState};

/// How often the bus loop wakes up to look at the stop signal.
const BUS_POLL: gst::ClockTime = gst::ClockTime::from_mseconds(100);

pub struct RelayStream {
    name: String,
    pipeline: gst::Pipeline,
    stop: CancellationToken,
    state: StateCell,
}

impl RelayStream {
    pub fn new(name: &str, description: &str, stop: CancellationToken) -> Result<Self> {
        gst::init().map_err(|e| eyre!("Failed to initialize GStreamer: {}", e))?;

        info!("[{}] Relay pipeline: {}", name, description);

        let pipeline = gst::parse::launch(description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| eyre!("Failed to create pipeline"))?;

        Ok(Self {
            name: name.to_string(),
            pipeline,
            stop,
            state: StateCell::new(),
        })
    }

    /// Pump bus messages until the stop signal, an error, or end of stream.
    fn watch_bus(&self) -> StopReason {
        let Some(bus) = self.pipeline.bus() else {
            return StopReason::StartFailed("pipeline has no bus".into());
        };

        while !self.stop.is_cancelled() {
            let Some(msg) = bus.timed_pop(BUS_POLL) else {
                continue;
            };

            use gst::MessageView;

            match msg.view() {
                MessageView::Eos(..) => {
                    info!("[{}] End of stream", self.name);
                    return StopReason::SourceLost("end of stream".into());
                }
                MessageView::Error(err) => {
                    return StopReason::SourceLost(format!(
                        "Error from {:?}: {} ({:?})",
                        err.src().map(|s| s.path_string()),
                        err.error(),
                        err.debug()
                    ));
                }
                MessageView::Warning(warning) => {
                    warn!(
                        "[{}] Warning from {:?}: {} ({:?})",
                        self.name,
                        warning.src().map(|s| s.path_string()),
                        warning.error(),
                        warning.debug()
                    );
                }
                _ => {}
            }
        }

        StopReason::Shutdown
    }
}

impl Stream for RelayStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StateCell {
        self.state.clone()
    }

    #[instrument(skip(self), fields(stream = %self.name))]
    fn run(self) -> StopReason {
        self.state.set(StreamState::Starting);

        let reason = match self.pipeline.set_state(gst::State::Playing) {
            Ok(_) => {
                self.state.set(StreamState::Running);
                info!("[{}] Relaying", self.name);
                self.watch_bus()
            }
            Err(e) => StopReason::StartFailed(format!("Failed to start pipeline: {:?}", e)),
        };

        self.state.set(StreamState::Stopping);
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("[{}] Failed to stop pipeline: {:?}", self.name, e);
        }
        self.state.set(StreamState::Stopped);

        info!("[{}] Relay stopped: {:?}", self.name, reason);
        reason
    }
}
