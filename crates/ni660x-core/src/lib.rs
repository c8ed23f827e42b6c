//! `ni660x-core`
//!
//! Coordination of a timed, gated pulse-counting acquisition across several
//! independent counter channels and one periodic gate generator.
//!
//! ## Architecture
//!
//! - [`hardware`]: traits the device driver must implement ([`Channel`],
//!   [`GateGenerator`], [`SignalRouter`], [`Hardware`])
//! - [`coordinator`]: [`AcquisitionCoordinator`], start ordering, started-set
//!   tracking, cross-channel readiness and data slicing
//! - [`app`]: [`CountingApp`], routing setup/teardown around a coordinator
//! - [`config`]: [`AppConfig`] loaded with Figment (TOML/YAML + env)
//! - [`error`]: [`CountingError`] and [`ResourceError`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use ni660x_core::{AppConfig, CountingApp};
//!
//! let config = AppConfig::load("config/ni660x.toml".as_ref())?;
//! let mut app = CountingApp::open(config, &hardware)?;
//!
//! app.start_all(100, 0.01, 0.01, 0.0)?;
//! while !app.is_done() {
//!     let ready = app.get_samples_readies();
//!     // read up to `ready` samples from each started channel
//! }
//! app.stop()?;
//! app.close();
//! ```

pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hardware;

pub use app::CountingApp;
pub use config::{AppConfig, ConnectionsConfig, CounterConfig, TimerConfig};
pub use coordinator::{slice_range, AcquisitionCoordinator, AcquisitionState};
pub use error::{CountingError, ResourceError, ResourceErrorKind, Result};
pub use hardware::{Channel, GateGenerator, Hardware, PulseTrain, SignalRouter};
