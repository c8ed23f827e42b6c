//! Hardware contract consumed by the coordinator.
//!
//! The physical driver is external. These traits describe the minimum the
//! coordinator needs from it:
//!
//! - [`Channel`] - one gated counting resource with a growing sample buffer
//! - [`GateGenerator`] - the periodic timer that gates every channel
//! - [`SignalRouter`] - terminal routing performed once at setup
//! - [`Hardware`] - factory building all of the above from configuration
//!
//! All methods take `&self`. Implementations are driven asynchronously by the
//! device (samples arrive on their own schedule), so state lives behind
//! interior mutability and every reader gets a consistent snapshot.

use crate::config::{CounterConfig, TimerConfig};
use crate::coordinator::slice_range;
use crate::error::ResourceError;

/// One independently counted physical signal source.
pub trait Channel: Send + Sync {
    /// Stable configuration name.
    fn name(&self) -> &str;

    /// Arm the resource to capture up to `samples` gated samples.
    ///
    /// Resets the buffer and readiness count for the new run. Re-arming after
    /// [`stop`](Channel::stop) is allowed.
    fn start(&self, samples: usize) -> Result<(), ResourceError>;

    /// Disarm the resource. Safe to call when not started.
    fn stop(&self) -> Result<(), ResourceError>;

    /// Whether the coordinator should start and read this channel.
    fn is_enabled(&self) -> bool;

    /// Set the enabled flag. Does not touch the hardware.
    fn set_enabled(&self, enabled: bool);

    /// Snapshot of every sample acquired in the current run.
    fn data(&self) -> Vec<f64>;

    /// Snapshot of `[start:end]` with Python slice semantics, resolved
    /// against the buffer length at the time of the read.
    ///
    /// Implementations should override this to resolve and copy under one
    /// lock.
    fn data_slice(&self, start: i64, end: i64) -> Vec<f64> {
        let data = self.data();
        data[slice_range(data.len(), start, end)].to_vec()
    }

    /// Number of samples currently available.
    fn sample_readies(&self) -> usize;
}

/// Shape of one gate pulse train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseTrain {
    /// Number of gate pulses to emit.
    pub samples: usize,
    /// Gate high time in seconds.
    pub high_time: f64,
    /// Gate low time in seconds.
    pub low_time: f64,
    /// Delay before the first pulse in seconds.
    pub initial_delay: f64,
}

impl PulseTrain {
    /// Pulse train with no initial delay.
    pub fn new(samples: usize, high_time: f64, low_time: f64) -> Self {
        Self {
            samples,
            high_time,
            low_time,
            initial_delay: 0.0,
        }
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, initial_delay: f64) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Check the timing parameters against `resource`.
    pub fn validate(&self, resource: &str) -> Result<(), ResourceError> {
        if self.samples == 0 {
            return Err(ResourceError::invalid_parameter(
                resource,
                "sample count must be at least 1",
            ));
        }
        if !self.high_time.is_finite() || self.high_time <= 0.0 {
            return Err(ResourceError::invalid_parameter(
                resource,
                format!("high time must be positive, got {}", self.high_time),
            ));
        }
        if !self.low_time.is_finite() || self.low_time <= 0.0 {
            return Err(ResourceError::invalid_parameter(
                resource,
                format!("low time must be positive, got {}", self.low_time),
            ));
        }
        if !self.initial_delay.is_finite() || self.initial_delay < 0.0 {
            return Err(ResourceError::invalid_parameter(
                resource,
                format!("initial delay must be >= 0, got {}", self.initial_delay),
            ));
        }
        Ok(())
    }
}

/// Periodic timing source gating all channels.
pub trait GateGenerator: Send + Sync {
    /// Physical channel of the timer (e.g. `Dev1/ctr7`).
    fn channel(&self) -> &str;

    /// Arm and start a new pulse train.
    fn start(&self, train: &PulseTrain) -> Result<(), ResourceError>;

    /// Halt pulse emission. Idempotent.
    fn stop(&self) -> Result<(), ResourceError>;

    /// True once the armed pulse count was emitted or after `stop`.
    fn is_done(&self) -> bool;
}

/// Routing of physical signal lines.
pub trait SignalRouter: Send + Sync {
    /// Connect `from` to `to`. Connecting twice is not an error.
    fn connect(&self, from: &str, to: &str) -> Result<(), ResourceError>;

    /// Undo a connection. Disconnecting an absent route is not an error.
    fn disconnect(&self, from: &str, to: &str) -> Result<(), ResourceError>;
}

/// Factory for the hardware resources of one counting application.
pub trait Hardware {
    /// Router for terminal connections.
    fn router(&self) -> Box<dyn SignalRouter>;

    /// Build a counting channel.
    fn counter(&self, config: &CounterConfig) -> Result<Box<dyn Channel>, ResourceError>;

    /// Build the gate generator.
    fn gate_generator(&self, config: &TimerConfig) -> Result<Box<dyn GateGenerator>, ResourceError>;
}
