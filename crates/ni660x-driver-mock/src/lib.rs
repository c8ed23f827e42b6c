//! Simulated counter board for ni660x.
//!
//! Implements the `ni660x-core` hardware traits without any physical device,
//! so the coordinator, the remote façade and the binary can run on any
//! machine.
//!
//! # Model
//!
//! - [`MockBoard`]: routing table, channel reservations, source rates
//! - [`MockGate`]: finite pulse train on a dedicated thread
//! - [`MockCounter`]: gated edge counter latching one sample per gate pulse
//! - [`FaultPlan`]: injected start, stop and routing failures
//!
//! A counter with source rate `r` Hz latches `round(r * high_time)` counts for
//! every gate pulse it receives, up to the sample count it was armed with.
//!
//! ```rust,ignore
//! use ni660x_core::{AppConfig, CountingApp};
//! use ni660x_driver_mock::{MockBoard, SimulationConfig};
//!
//! let board = MockBoard::with_simulation(
//!     SimulationConfig::default().with_source("/Dev1/PFI39", 1_000.0),
//! );
//! let mut app = CountingApp::open(config, &board)?;
//! app.start_all(10, 0.01, 0.01, 0.0)?;
//! ```

mod board;
mod counter;
mod faults;
mod gate;

pub use board::{internal_output_terminal, normalize_terminal, MockBoard, SimulationConfig};
pub use counter::MockCounter;
pub use faults::{FaultPlan, FaultScenario};
pub use gate::MockGate;
