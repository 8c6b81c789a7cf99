//! Delivery of progress events to external observers.

use retrace_common::execution::ExecutionProgress;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Fire-and-forget receiver of progress events (WebSocket bridge, log, test harness).
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: &ExecutionProgress);
}

impl ProgressSink for mpsc::UnboundedSender<ExecutionProgress> {
    fn emit(&self, progress: &ExecutionProgress) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(progress.clone());
    }
}

impl ProgressSink for broadcast::Sender<ExecutionProgress> {
    fn emit(&self, progress: &ExecutionProgress) {
        let _ = self.send(progress.clone());
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(&ExecutionProgress) + Send + Sync,
{
    fn emit(&self, progress: &ExecutionProgress) {
        (self.0)(progress)
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Fans events out to the engine's broadcast channel and every registered sink.
#[derive(Clone)]
pub struct ProgressPublisher {
    channel: broadcast::Sender<ExecutionProgress>,
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPublisher {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            channel,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.channel.subscribe()
    }

    pub fn publish(&self, progress: ExecutionProgress) {
        for sink in &self.sinks {
            sink.emit(&progress);
        }
        self.channel.emit(&progress);
    }
}
