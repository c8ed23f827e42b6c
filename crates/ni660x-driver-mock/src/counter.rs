//! Simulated gated edge counter.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ni660x_core::{slice_range, Channel, CounterConfig, ResourceError};
use parking_lot::RwLock;
use tracing::debug;

use crate::board::{normalize_terminal, BoardInner, MockBoard};

/// Counter state reachable from the gate thread.
pub(crate) struct CounterShared {
    gate: String,
    source: String,
    armed: AtomicBool,
    capacity: AtomicUsize,
    buffer: RwLock<Vec<f64>>,
}

impl CounterShared {
    pub(crate) fn gate(&self) -> &str {
        &self.gate
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// Latch one sample. Returns false when disarmed or full.
    ///
    /// `armed` and `capacity` only change under the buffer write lock, so a
    /// pulse is either part of the run it was checked against or dropped.
    pub(crate) fn record(&self, counts: f64) -> bool {
        let mut buffer = self.buffer.write();
        if !self.armed.load(Ordering::Acquire)
            || buffer.len() >= self.capacity.load(Ordering::Acquire)
        {
            return false;
        }
        buffer.push(counts);
        true
    }

    /// Disarm. Returns whether the counter was armed.
    fn disarm(&self) -> bool {
        let _buffer = self.buffer.write();
        self.armed.swap(false, Ordering::AcqRel)
    }
}

/// A counter channel on a [`MockBoard`].
///
/// Each gate pulse routed to its gate terminal appends one sample: the number
/// of source edges seen during the high phase.
pub struct MockCounter {
    name: String,
    channel: String,
    enabled: AtomicBool,
    board: Arc<BoardInner>,
    shared: Arc<CounterShared>,
}

impl MockCounter {
    /// Create a counter from its configuration. Enabled by default.
    pub fn new(board: &MockBoard, config: &CounterConfig) -> Self {
        debug!(
            name = %config.name,
            channel = %config.channel,
            gate = %config.gate,
            source = %config.source,
            "Created mock counter"
        );
        Self {
            name: config.name.clone(),
            channel: config.channel.clone(),
            enabled: AtomicBool::new(true),
            board: board.inner().clone(),
            shared: Arc::new(CounterShared {
                gate: normalize_terminal(&config.gate),
                source: normalize_terminal(&config.source),
                armed: AtomicBool::new(false),
                capacity: AtomicUsize::new(0),
                buffer: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Whether the counter is currently armed.
    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }
}

impl Channel for MockCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, samples: usize) -> Result<(), ResourceError> {
        if samples == 0 {
            return Err(ResourceError::invalid_parameter(
                &self.channel,
                "sample count must be at least 1",
            ));
        }
        self.board.faults.check_start(&self.channel)?;
        self.board.reserve(&self.channel, &self.name)?;

        // The buffer grows per pulse; `samples` only caps it.
        {
            let mut buffer = self.shared.buffer.write();
            buffer.clear();
            self.shared.capacity.store(samples, Ordering::Release);
            self.shared.armed.store(true, Ordering::Release);
        }
        self.board.listen(&self.shared);

        debug!(name = %self.name, samples, "Mock counter armed");
        Ok(())
    }

    fn stop(&self) -> Result<(), ResourceError> {
        let was_armed = self.shared.disarm();
        self.board.unlisten(&self.shared);
        self.board.release(&self.channel, &self.name);
        self.board.faults.check_stop(&self.channel)?;
        if was_armed {
            debug!(name = %self.name, samples = self.sample_readies(), "Mock counter stopped");
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn data(&self) -> Vec<f64> {
        self.shared.buffer.read().clone()
    }

    fn data_slice(&self, start: i64, end: i64) -> Vec<f64> {
        let buffer = self.shared.buffer.read();
        buffer[slice_range(buffer.len(), start, end)].to_vec()
    }

    fn sample_readies(&self) -> usize {
        self.shared.buffer.read().len()
    }
}

impl Drop for MockCounter {
    fn drop(&mut self) {
        self.shared.disarm();
        self.board.unlisten(&self.shared);
        self.board.release(&self.channel, &self.name);
    }
}

impl std::fmt::Debug for MockCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCounter")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("enabled", &self.is_enabled())
            .field("armed", &self.is_armed())
            .field("samples", &self.sample_readies())
            .finish()
    }
}
