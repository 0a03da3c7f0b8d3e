//! Reading history
//!
//! The history buffer records every reading the simulator emits into a
//! bounded, arrival-ordered sequence and republishes it as an immutable
//! snapshot after each change. It is the sensor side of the pipeline:
//! starting or stopping monitoring here drives the simulator.

use crate::config::HistoryConfig;
use crate::simulator::SignalSimulator;
use crate::types::SensorReading;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Immutable, oldest-first view published to readers
pub type Snapshot<T> = Arc<[T]>;

/// Fixed-capacity sequence that drops its oldest entry on overflow
#[derive(Debug, Clone)]
pub struct BoundedSeq<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedSeq<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append `item`, returning the entry evicted to stay within capacity
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Copy the current contents into a shareable snapshot
    pub fn snapshot(&self) -> Snapshot<T> {
        self.items.iter().cloned().collect()
    }
}

/// Bounded history of simulator readings
pub struct HistoryBuffer {
    simulator: Arc<SignalSimulator>,
    readings: watch::Receiver<Snapshot<SensorReading>>,
    recorder: JoinHandle<()>,
}

impl HistoryBuffer {
    /// Subscribe to `simulator` and start recording.
    ///
    /// The recorder lives as long as the buffer; it must be created inside a
    /// tokio runtime.
    pub fn new(simulator: Arc<SignalSimulator>, config: HistoryConfig) -> Self {
        let empty: Snapshot<SensorReading> = Arc::from(Vec::new());
        let (tx, readings) = watch::channel(empty);
        let source = simulator.subscribe();
        let recorder = tokio::spawn(record(source, tx, config.capacity));

        Self {
            simulator,
            readings,
            recorder,
        }
    }

    /// Start the simulator feeding this buffer
    pub fn start_monitoring(&self) {
        self.simulator.start();
    }

    /// Stop the simulator; recorded history is kept
    pub async fn stop_monitoring(&self) {
        self.simulator.stop().await;
    }

    pub fn simulator(&self) -> &Arc<SignalSimulator> {
        &self.simulator
    }

    /// Latest reading emitted by the simulator
    pub fn current_reading(&self) -> Option<SensorReading> {
        self.simulator.latest()
    }

    /// Subscribe to the latest reading
    pub fn subscribe_current(&self) -> watch::Receiver<Option<SensorReading>> {
        self.simulator.subscribe()
    }

    /// Current history, oldest first
    pub fn snapshot(&self) -> Snapshot<SensorReading> {
        self.readings.borrow().clone()
    }

    /// Subscribe to history updates
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<SensorReading>> {
        self.readings.clone()
    }
}

impl Drop for HistoryBuffer {
    fn drop(&mut self) {
        self.recorder.abort();
    }
}

async fn record(
    mut source: watch::Receiver<Option<SensorReading>>,
    history: watch::Sender<Snapshot<SensorReading>>,
    capacity: usize,
) {
    let mut buffer = BoundedSeq::new(capacity);
    debug!(capacity, "History recorder started");

    while source.changed().await.is_ok() {
        let reading = source.borrow_and_update().clone();
        let Some(reading) = reading else {
            continue;
        };

        let evicted = buffer.push(reading);
        trace!(len = buffer.len(), evicted = evicted.is_some(), "Reading recorded");
        history.send_replace(buffer.snapshot());
    }

    debug!("History recorder finished");
}
