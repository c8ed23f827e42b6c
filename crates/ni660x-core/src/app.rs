//! Application lifecycle: terminal routing plus the coordinator.
//!
//! [`CountingApp::open`] establishes every configured route, builds the
//! channels and gate generator, and hands them to an
//! [`AcquisitionCoordinator`]. [`CountingApp::close`] stops the acquisition and
//! undoes the routes exactly once. Dropping an open app closes it.
//!
//! Read operations reach the coordinator through `Deref`. Starts go through
//! the app and fail with [`CountingError::Closed`] once it is closed.

use std::ops::Deref;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::coordinator::AcquisitionCoordinator;
use crate::error::{CountingError, Result};
use crate::hardware::{Hardware, SignalRouter};

/// Established terminal routes, torn down once.
struct Routes {
    router: Box<dyn SignalRouter>,
    established: Vec<(String, String)>,
}

impl Routes {
    /// Connect every pair, undoing the ones already made on failure.
    fn establish(router: Box<dyn SignalRouter>, config: &AppConfig) -> Result<Self> {
        let mut routes = Self {
            router,
            established: Vec::new(),
        };
        for (from, to) in config.connections.pairs() {
            if let Err(e) = routes.router.connect(from, to) {
                routes.teardown();
                return Err(e.into());
            }
            info!(from, to, "Connected terminals");
            routes.established.push((from.to_string(), to.to_string()));
        }
        Ok(routes)
    }

    fn teardown(&mut self) {
        for (from, to) in self.established.drain(..).rev() {
            match self.router.disconnect(&from, &to) {
                Ok(()) => info!(from = %from, to = %to, "Disconnected terminals"),
                Err(e) => warn!(from = %from, to = %to, error = %e, "Failed to disconnect terminals"),
            }
        }
    }
}

/// A configured counting application.
pub struct CountingApp {
    config: AppConfig,
    coordinator: AcquisitionCoordinator,
    routes: Routes,
    closed: bool,
}

impl CountingApp {
    /// Validate `config`, route terminals and build every resource.
    pub fn open(config: AppConfig, hardware: &dyn Hardware) -> Result<Self> {
        config.validate()?;

        let mut routes = Routes::establish(hardware.router(), &config)?;

        let built = Self::build_coordinator(&config, hardware);
        let coordinator = match built {
            Ok(coordinator) => coordinator,
            Err(e) => {
                routes.teardown();
                return Err(e);
            }
        };

        info!(
            counters = config.counters.len(),
            timer = %config.timer.channel,
            "Counting application opened"
        );

        Ok(Self {
            config,
            coordinator,
            routes,
            closed: false,
        })
    }

    fn build_coordinator(
        config: &AppConfig,
        hardware: &dyn Hardware,
    ) -> Result<AcquisitionCoordinator> {
        let gate = hardware.gate_generator(&config.timer)?;
        let channels = config
            .counters
            .iter()
            .map(|counter| hardware.counter(counter).map_err(CountingError::from))
            .collect::<Result<Vec<_>>>()?;
        AcquisitionCoordinator::new(channels, gate)
    }

    /// Configuration the app was opened with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// True after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the acquisition and disconnect every route.
    ///
    /// Best effort: failures are logged. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.coordinator.stop() {
            warn!(error = %e, "Error stopping acquisition during close");
        }
        self.routes.teardown();
        info!("Counting application closed");
    }

    fn open_coordinator(&mut self) -> Result<&mut AcquisitionCoordinator> {
        if self.closed {
            return Err(CountingError::Closed);
        }
        Ok(&mut self.coordinator)
    }

    /// See [`AcquisitionCoordinator::start_channels`].
    pub fn start_channels(&mut self, samples: usize) -> Result<Vec<String>> {
        self.open_coordinator()?.start_channels(samples)
    }

    /// See [`AcquisitionCoordinator::start_timer`].
    pub fn start_timer(
        &mut self,
        samples: usize,
        high_time: f64,
        low_time: f64,
        initial_delay: f64,
    ) -> Result<()> {
        self.open_coordinator()?
            .start_timer(samples, high_time, low_time, initial_delay)
    }

    /// See [`AcquisitionCoordinator::start_all`].
    pub fn start_all(
        &mut self,
        samples: usize,
        high_time: f64,
        low_time: f64,
        initial_delay: f64,
    ) -> Result<()> {
        self.open_coordinator()?
            .start_all(samples, high_time, low_time, initial_delay)
    }

    /// See [`AcquisitionCoordinator::stop`]. Allowed after close.
    pub fn stop(&mut self) -> Result<()> {
        self.coordinator.stop()
    }

    /// See [`AcquisitionCoordinator::set_channels_enabled`]. Flags only, so
    /// allowed after close.
    pub fn set_channels_enabled(&mut self, names: &[String], enabled: bool) -> Result<()> {
        self.coordinator.set_channels_enabled(names, enabled)
    }
}

impl Deref for CountingApp {
    type Target = AcquisitionCoordinator;

    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}

impl Drop for CountingApp {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CountingApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingApp")
            .field("coordinator", &self.coordinator)
            .field("routes", &self.routes.established)
            .field("closed", &self.closed)
            .finish()
    }
}
