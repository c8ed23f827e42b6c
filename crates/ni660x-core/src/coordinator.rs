//! Acquisition coordinator.
//!
//! Owns every counting [`Channel`] and the single [`GateGenerator`] of an
//! application, and implements the control operations exposed remotely:
//!
//! ```text
//!   start_channels ──► Armed ──► start_timer ──► Running
//!        ▲                                          │ gate train exhausted
//!        │                                          ▼
//!      Idle ◄──────────────── stop ────────────── Draining
//! ```
//!
//! Channels are always armed before the generator so that no gate pulse is
//! emitted while a channel is not yet listening. Reads never block: callers
//! poll [`get_samples_readies`](AcquisitionCoordinator::get_samples_readies)
//! and [`is_done`](AcquisitionCoordinator::is_done) and fetch data as it
//! grows.

use std::collections::HashMap;
use std::ops::Range;

use tracing::{debug, info, warn};

use crate::error::{CountingError, ResourceError, Result};
use crate::hardware::{Channel, GateGenerator, PulseTrain};

/// Run state derived from the last control operation and the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Nothing armed.
    Idle,
    /// Channels armed, generator not started.
    Armed,
    /// Generator emitting gates.
    Running,
    /// Generator done, channel data may still be read.
    Draining,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Armed => "armed",
            AcquisitionState::Running => "running",
            AcquisitionState::Draining => "draining",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed,
    Running,
}

/// Coordinates a multi-channel gated acquisition.
pub struct AcquisitionCoordinator {
    /// Channels in configuration order.
    channels: Vec<Box<dyn Channel>>,
    /// Name -> position in `channels`.
    index: HashMap<String, usize>,
    gate: Box<dyn GateGenerator>,
    /// Positions of the channels started by the last `start_channels`.
    started: Vec<usize>,
    phase: Phase,
}

impl AcquisitionCoordinator {
    /// Build a coordinator. Channel names must be unique.
    pub fn new(channels: Vec<Box<dyn Channel>>, gate: Box<dyn GateGenerator>) -> Result<Self> {
        let mut index = HashMap::with_capacity(channels.len());
        for (i, channel) in channels.iter().enumerate() {
            if index.insert(channel.name().to_string(), i).is_some() {
                return Err(CountingError::Configuration(format!(
                    "Duplicate channel name: {}",
                    channel.name()
                )));
            }
        }

        debug!(
            channels = channels.len(),
            timer = gate.channel(),
            "Created acquisition coordinator"
        );

        Ok(Self {
            channels,
            index,
            gate,
            started: Vec::new(),
            phase: Phase::Idle,
        })
    }

    fn channel(&self, name: &str) -> Result<&dyn Channel> {
        self.index
            .get(name)
            .map(|&i| self.channels[i].as_ref())
            .ok_or_else(|| CountingError::NotFound(name.to_string()))
    }

    /// Arm every enabled channel for `samples` samples.
    ///
    /// The started set is recomputed from scratch. Disabled channels are
    /// neither started nor stopped. If a channel fails to start, the channels
    /// armed before it stay armed and are reported in
    /// [`CountingError::ChannelStart`]; call [`stop`](Self::stop) to clean up.
    pub fn start_channels(&mut self, samples: usize) -> Result<Vec<String>> {
        self.started.clear();
        self.phase = Phase::Idle;

        for (i, channel) in self.channels.iter().enumerate() {
            if !channel.is_enabled() {
                debug!(channel = channel.name(), "Skipping disabled channel");
                continue;
            }
            if let Err(source) = channel.start(samples) {
                let started = self.started_names();
                if !started.is_empty() {
                    self.phase = Phase::Armed;
                }
                warn!(
                    channel = channel.name(),
                    started = started.len(),
                    error = %source,
                    "Channel failed to start"
                );
                return Err(CountingError::ChannelStart {
                    channel: channel.name().to_string(),
                    started,
                    source,
                });
            }
            if channel.is_enabled() {
                self.started.push(i);
            }
        }

        self.phase = Phase::Armed;
        let started = self.started_names();
        info!(samples, started = ?started, "Channels armed");
        Ok(started)
    }

    /// Start the gate generator. No coordination beyond pass-through.
    pub fn start_timer(
        &mut self,
        samples: usize,
        high_time: f64,
        low_time: f64,
        initial_delay: f64,
    ) -> Result<()> {
        let train = PulseTrain::new(samples, high_time, low_time).with_initial_delay(initial_delay);
        self.gate.start(&train)?;
        self.phase = Phase::Running;
        info!(
            samples,
            high_time, low_time, initial_delay, "Gate generator started"
        );
        Ok(())
    }

    /// Arm the channels, then start the generator.
    ///
    /// The generator is never started if arming the channels fails.
    pub fn start_all(
        &mut self,
        samples: usize,
        high_time: f64,
        low_time: f64,
        initial_delay: f64,
    ) -> Result<()> {
        self.start_channels(samples)?;
        self.start_timer(samples, high_time, low_time, initial_delay)
    }

    /// Stop the generator, then every configured channel.
    ///
    /// Every resource is stopped even if an earlier one fails; failures are
    /// logged and the first one is returned afterwards. The started set is
    /// kept so the last run's data stays readable.
    pub fn stop(&mut self) -> Result<()> {
        let mut first_error: Option<ResourceError> = None;

        if let Err(e) = self.gate.stop() {
            warn!(timer = self.gate.channel(), error = %e, "Failed to stop gate generator");
            first_error.get_or_insert(e);
        }
        for channel in &self.channels {
            if let Err(e) = channel.stop() {
                warn!(channel = channel.name(), error = %e, "Failed to stop channel");
                first_error.get_or_insert(e);
            }
        }

        self.phase = Phase::Idle;
        debug!("Acquisition stopped");

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Full buffer of every channel started in the current run, keyed by
    /// name in configuration order.
    pub fn get_all_data(&self) -> Vec<(String, Vec<f64>)> {
        self.started
            .iter()
            .map(|&i| {
                let channel = &self.channels[i];
                (channel.name().to_string(), channel.data())
            })
            .collect()
    }

    /// All configured channel names, in configuration order.
    pub fn get_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Slice of a channel's buffer with Python slice semantics.
    ///
    /// Negative indices count from the end, so `end = -1` excludes the last
    /// sample. Out-of-range indices are clamped.
    pub fn get_channel_data(&self, name: &str, start: i64, end: i64) -> Result<Vec<f64>> {
        Ok(self.channel(name)?.data_slice(start, end))
    }

    /// Set the enabled flag on `names`, or on every channel when empty.
    ///
    /// Unknown names are rejected before any flag changes.
    pub fn set_channels_enabled(&mut self, names: &[String], enabled: bool) -> Result<()> {
        let targets: Vec<usize> = if names.is_empty() {
            (0..self.channels.len()).collect()
        } else {
            names
                .iter()
                .map(|name| {
                    self.index
                        .get(name)
                        .copied()
                        .ok_or_else(|| CountingError::NotFound(name.clone()))
                })
                .collect::<Result<_>>()?
        };

        for i in targets {
            self.channels[i].set_enabled(enabled);
            debug!(channel = self.channels[i].name(), enabled, "Channel enabled flag set");
        }
        Ok(())
    }

    /// Enabled flag of every configured channel, in configuration order.
    pub fn get_channels_enabled(&self) -> Vec<(String, bool)> {
        self.channels
            .iter()
            .map(|c| (c.name().to_string(), c.is_enabled()))
            .collect()
    }

    /// Samples readable on every started channel: the minimum readiness.
    ///
    /// Zero when no channel is started.
    pub fn get_samples_readies(&self) -> usize {
        self.started
            .iter()
            .map(|&i| self.channels[i].sample_readies())
            .min()
            .unwrap_or(0)
    }

    /// True once the gate train is exhausted or stopped.
    pub fn is_done(&self) -> bool {
        self.gate.is_done()
    }

    /// Names started by the last `start_channels`, in configuration order.
    pub fn started_names(&self) -> Vec<String> {
        self.started
            .iter()
            .map(|&i| self.channels[i].name().to_string())
            .collect()
    }

    /// Current run state.
    pub fn state(&self) -> AcquisitionState {
        match self.phase {
            Phase::Idle => AcquisitionState::Idle,
            Phase::Armed => AcquisitionState::Armed,
            Phase::Running if self.gate.is_done() => AcquisitionState::Draining,
            Phase::Running => AcquisitionState::Running,
        }
    }
}

impl std::fmt::Debug for AcquisitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionCoordinator")
            .field("channels", &self.get_names())
            .field("timer", &self.gate.channel())
            .field("started", &self.started_names())
            .field("phase", &self.phase)
            .finish()
    }
}

/// Resolve Python-style `[start:end]` indices against `len`.
pub fn slice_range(len: usize, start: i64, end: i64) -> Range<usize> {
    let len = len as i64;
    let resolve = |i: i64| -> usize {
        if i < 0 {
            (len + i).max(0) as usize
        } else {
            i.min(len) as usize
        }
    };
    let start = resolve(start);
    let end = resolve(end);
    start..end.max(start)
}
