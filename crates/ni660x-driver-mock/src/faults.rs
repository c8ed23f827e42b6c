//! Fault injection for the simulated board.
//!
//! Lets tests exercise partial-start and routing failure paths. Faults are
//! keyed by normalized physical channel or terminal name.

use std::collections::HashMap;

use ni660x_core::{ResourceError, ResourceErrorKind};
use parking_lot::Mutex;

use crate::board::normalize_terminal;

/// Failure scenario for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultScenario {
    /// Fail the next `count` start calls on a physical channel.
    FailStart {
        /// Number of failing starts.
        count: u32,
    },
    /// Fail every connect call targeting a terminal.
    FailConnect,
    /// Fail every stop call on a physical channel.
    FailStop,
}

/// Pending faults, shared by every resource of a board.
#[derive(Debug, Default)]
pub struct FaultPlan {
    scenarios: Mutex<HashMap<String, FaultScenario>>,
}

impl FaultPlan {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Register a scenario for `resource`, replacing any previous one.
    pub fn inject(&self, resource: &str, scenario: FaultScenario) {
        self.scenarios
            .lock()
            .insert(normalize_terminal(resource), scenario);
    }

    /// Remove every scenario.
    pub fn clear(&self) {
        self.scenarios.lock().clear();
    }

    pub(crate) fn check_start(&self, resource: &str) -> Result<(), ResourceError> {
        let key = normalize_terminal(resource);
        let mut scenarios = self.scenarios.lock();
        if let Some(FaultScenario::FailStart { count }) = scenarios.get_mut(&key) {
            if *count <= 1 {
                scenarios.remove(&key);
            } else {
                *count -= 1;
            }
            return Err(ResourceError::new(
                resource,
                ResourceErrorKind::Hardware,
                "Injected start failure",
            ));
        }
        Ok(())
    }

    pub(crate) fn check_stop(&self, resource: &str) -> Result<(), ResourceError> {
        match self.scenarios.lock().get(&normalize_terminal(resource)) {
            Some(FaultScenario::FailStop) => Err(ResourceError::new(
                resource,
                ResourceErrorKind::Hardware,
                "Injected stop failure",
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_connect(&self, to: &str) -> Result<(), ResourceError> {
        match self.scenarios.lock().get(&normalize_terminal(to)) {
            Some(FaultScenario::FailConnect) => Err(ResourceError::new(
                to,
                ResourceErrorKind::Routing,
                "Injected routing failure",
            )),
            _ => Ok(()),
        }
    }
}
