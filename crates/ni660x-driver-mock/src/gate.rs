//! Simulated gate generator.
//!
//! A finite pulse train runs on a dedicated thread:
//!
//! ```text
//!   initial_delay │ high │ low │ high │ low │ ... │ high │ done
//!                 └─ pulse 1 ┘  └─ pulse 2 ┘        └─ pulse N
//! ```
//!
//! Each pulse is delivered to the board at its falling edge, where every
//! routed, armed counter latches one sample.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ni660x_core::{GateGenerator, PulseTrain, ResourceError, ResourceErrorKind};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::board::{internal_output_terminal, normalize_terminal, BoardInner, MockBoard};

const TIMER_OWNER: &str = "gate-generator";

struct GateState {
    done: AtomicBool,
    pulses: AtomicUsize,
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl GateState {
    /// Sleep for `seconds` unless cancelled. Returns false if cancelled.
    fn sleep(&self, seconds: f64) -> bool {
        // Unrepresentable durations wait until cancelled.
        let deadline = Duration::try_from_secs_f64(seconds)
            .ok()
            .and_then(|d| Instant::now().checked_add(d));
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut cancelled, deadline).timed_out() {
                        return !*cancelled;
                    }
                }
                None => self.wake.wait(&mut cancelled),
            }
        }
        false
    }
}

/// A gate generator on a [`MockBoard`].
pub struct MockGate {
    channel: String,
    output: String,
    board: Arc<BoardInner>,
    state: Arc<GateState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockGate {
    /// Create a generator on `channel` (e.g. `Dev1/ctr7`).
    pub fn new(board: &MockBoard, channel: &str) -> Result<Self, ResourceError> {
        let output = internal_output_terminal(channel)?;
        debug!(channel, output = %output, "Created mock gate generator");
        Ok(Self {
            channel: channel.to_string(),
            output: normalize_terminal(&output),
            board: board.inner().clone(),
            state: Arc::new(GateState {
                done: AtomicBool::new(true),
                pulses: AtomicUsize::new(0),
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Pulses emitted in the current run.
    pub fn pulses_emitted(&self) -> usize {
        self.state.pulses.load(Ordering::Acquire)
    }

    /// Cancel and join the running train, if any.
    fn halt(&self) -> Result<(), ResourceError> {
        *self.state.cancelled.lock() = true;
        self.state.wake.notify_all();

        let handle = self.worker.lock().take();
        let joined = match handle {
            Some(handle) => handle.join().map_err(|_| {
                ResourceError::new(
                    &self.channel,
                    ResourceErrorKind::Hardware,
                    "pulse train thread panicked",
                )
            }),
            None => Ok(()),
        };
        self.state.done.store(true, Ordering::Release);
        joined
    }
}

impl GateGenerator for MockGate {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn start(&self, train: &PulseTrain) -> Result<(), ResourceError> {
        train.validate(&self.channel)?;
        self.board.faults.check_start(&self.channel)?;
        self.halt()?;
        self.board.reserve(&self.channel, TIMER_OWNER)?;

        *self.state.cancelled.lock() = false;
        self.state.pulses.store(0, Ordering::Release);
        self.state.done.store(false, Ordering::Release);

        let train = *train;
        let state = self.state.clone();
        let board = self.board.clone();
        let output = self.output.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("gate-{}", self.channel.replace('/', "-")))
            .spawn(move || {
                run_train(&train, &state, &board, &output);
                state.done.store(true, Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!(
                    channel = %self.channel,
                    samples = train.samples,
                    high_time = train.high_time,
                    low_time = train.low_time,
                    initial_delay = train.initial_delay,
                    "Pulse train started"
                );
                Ok(())
            }
            Err(e) => {
                self.state.done.store(true, Ordering::Release);
                self.board.release(&self.channel, TIMER_OWNER);
                Err(ResourceError::new(
                    &self.channel,
                    ResourceErrorKind::Hardware,
                    format!("failed to spawn pulse train: {}", e),
                ))
            }
        }
    }

    fn stop(&self) -> Result<(), ResourceError> {
        let result = self.halt();
        self.board.release(&self.channel, TIMER_OWNER);
        self.board.faults.check_stop(&self.channel)?;
        debug!(channel = %self.channel, pulses = self.pulses_emitted(), "Pulse train stopped");
        result
    }

    fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }
}

fn run_train(train: &PulseTrain, state: &GateState, board: &BoardInner, output: &str) {
    if train.initial_delay > 0.0 && !state.sleep(train.initial_delay) {
        return;
    }
    for pulse in 0..train.samples {
        if !state.sleep(train.high_time) {
            return;
        }
        board.deliver_pulse(output, train.high_time);
        state.pulses.fetch_add(1, Ordering::AcqRel);

        let last = pulse + 1 == train.samples;
        if !last && !state.sleep(train.low_time) {
            return;
        }
    }
}

impl Drop for MockGate {
    fn drop(&mut self) {
        if let Err(e) = self.halt() {
            warn!(channel = %self.channel, error = %e, "Error halting gate generator on drop");
        }
        self.board.release(&self.channel, TIMER_OWNER);
    }
}

impl std::fmt::Debug for MockGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGate")
            .field("channel", &self.channel)
            .field("output", &self.output)
            .field("done", &self.is_done())
            .field("pulses", &self.pulses_emitted())
            .finish()
    }
}
