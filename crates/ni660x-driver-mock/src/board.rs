//! Simulated counter board.
//!
//! [`MockBoard`] stands in for one counter/timer card. It keeps:
//!
//! - the routing table built through [`SignalRouter`]
//! - physical channel reservations (one owner per counter)
//! - the set of armed counters listening for gate pulses
//! - the simulated pulse rate on every source terminal
//!
//! Gate generators deliver each pulse to the board, which fans it out to
//! every armed counter whose gate terminal is the generator output or is
//! routed from it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ni660x_core::{
    Channel, CounterConfig, GateGenerator, Hardware, ResourceError, ResourceErrorKind,
    SignalRouter, TimerConfig,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::counter::{CounterShared, MockCounter};
use crate::faults::FaultPlan;
use crate::gate::MockGate;

/// Normalize a terminal or channel name for comparison.
///
/// `/Dev1/PFI38`, `Dev1/pfi38` and ` dev1/PFI38 ` are the same terminal.
pub fn normalize_terminal(name: &str) -> String {
    name.trim().trim_start_matches('/').to_ascii_lowercase()
}

/// Output terminal of a counter used as gate generator.
///
/// `Dev1/ctr7` drives `/Dev1/Ctr7InternalOutput`.
pub fn internal_output_terminal(channel: &str) -> Result<String, ResourceError> {
    let trimmed = channel.trim().trim_start_matches('/');
    let invalid = || {
        ResourceError::invalid_parameter(
            channel,
            "expected a counter channel of the form <device>/ctr<N>",
        )
    };
    let (device, counter) = trimmed.rsplit_once('/').ok_or_else(invalid)?;
    let index = counter
        .strip_prefix("ctr")
        .or_else(|| counter.strip_prefix("Ctr"))
        .or_else(|| counter.strip_prefix("CTR"))
        .ok_or_else(invalid)?;
    if device.is_empty() || index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    Ok(format!("/{}/Ctr{}InternalOutput", device, index))
}

fn default_rate_hz() -> f64 {
    100_000.0
}

/// Simulated signal sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Rate used for sources not listed in `sources`.
    #[serde(default = "default_rate_hz")]
    pub default_rate_hz: f64,
    /// Pulse rate per source terminal, in Hz.
    #[serde(default)]
    pub sources: HashMap<String, f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_rate_hz: default_rate_hz(),
            sources: HashMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Set the rate of one source terminal.
    pub fn with_source(mut self, terminal: &str, rate_hz: f64) -> Self {
        self.sources.insert(terminal.to_string(), rate_hz);
        self
    }
}

/// State shared between the board and the resources it creates.
pub(crate) struct BoardInner {
    routes: RwLock<HashSet<(String, String)>>,
    /// Normalized physical channel -> owner label.
    reservations: Mutex<HashMap<String, String>>,
    listeners: RwLock<Vec<Arc<CounterShared>>>,
    default_rate_hz: f64,
    /// Normalized source terminal -> rate.
    rates: HashMap<String, f64>,
    pub(crate) faults: FaultPlan,
}

impl BoardInner {
    pub(crate) fn reserve(&self, channel: &str, owner: &str) -> Result<(), ResourceError> {
        let mut reservations = self.reservations.lock();
        let key = normalize_terminal(channel);
        match reservations.get(&key) {
            Some(current) if current != owner => Err(ResourceError::busy(
                channel,
                format!("reserved by '{}'", current),
            )),
            _ => {
                reservations.insert(key, owner.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn release(&self, channel: &str, owner: &str) {
        let mut reservations = self.reservations.lock();
        let key = normalize_terminal(channel);
        if reservations.get(&key).is_some_and(|current| current == owner) {
            reservations.remove(&key);
        }
    }

    pub(crate) fn listen(&self, counter: &Arc<CounterShared>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, counter)) {
            listeners.push(counter.clone());
        }
    }

    pub(crate) fn unlisten(&self, counter: &Arc<CounterShared>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, counter));
    }

    fn rate_for(&self, source: &str) -> f64 {
        self.rates
            .get(source)
            .copied()
            .unwrap_or(self.default_rate_hz)
    }

    fn is_routed(&self, output: &str, gate: &str) -> bool {
        output == gate
            || self
                .routes
                .read()
                .contains(&(output.to_string(), gate.to_string()))
    }

    /// Deliver one gate pulse of `high_time` seconds driven by `output`.
    pub(crate) fn deliver_pulse(&self, output: &str, high_time: f64) -> usize {
        let listeners = self.listeners.read();
        let mut delivered = 0;
        for counter in listeners.iter() {
            if !self.is_routed(output, counter.gate()) {
                continue;
            }
            let counts = (self.rate_for(counter.source()) * high_time).round();
            if counter.record(counts) {
                delivered += 1;
            }
        }
        trace!(output, delivered, "Gate pulse delivered");
        delivered
    }
}

/// A simulated counter/timer card.
///
/// Cheap to clone: clones share the same board.
#[derive(Clone)]
pub struct MockBoard {
    inner: Arc<BoardInner>,
}

impl MockBoard {
    /// Board with default simulation settings.
    pub fn new() -> Self {
        Self::with_simulation(SimulationConfig::default())
    }

    /// Board with explicit source rates.
    pub fn with_simulation(config: SimulationConfig) -> Self {
        let rates = config
            .sources
            .iter()
            .map(|(terminal, rate)| (normalize_terminal(terminal), *rate))
            .collect();
        Self {
            inner: Arc::new(BoardInner {
                routes: RwLock::new(HashSet::new()),
                reservations: Mutex::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                default_rate_hz: config.default_rate_hz,
                rates,
                faults: FaultPlan::none(),
            }),
        }
    }

    /// Fault injection plan shared by every resource of this board.
    pub fn faults(&self) -> &FaultPlan {
        &self.inner.faults
    }

    /// Currently established routes, normalized and sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<_> = self.inner.routes.read().iter().cloned().collect();
        routes.sort();
        routes
    }

    /// Whether a physical channel is reserved.
    pub fn is_reserved(&self, channel: &str) -> bool {
        self.inner
            .reservations
            .lock()
            .contains_key(&normalize_terminal(channel))
    }

    /// Number of counters currently armed.
    pub fn armed_counters(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub(crate) fn inner(&self) -> &Arc<BoardInner> {
        &self.inner
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBoard")
            .field("routes", &self.routes())
            .field("armed_counters", &self.armed_counters())
            .finish()
    }
}

impl SignalRouter for MockBoard {
    fn connect(&self, from: &str, to: &str) -> Result<(), ResourceError> {
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(ResourceError::new(
                format!("{} -> {}", from, to),
                ResourceErrorKind::Routing,
                "terminal names must not be empty",
            ));
        }
        self.inner.faults.check_connect(to)?;
        let inserted = self
            .inner
            .routes
            .write()
            .insert((normalize_terminal(from), normalize_terminal(to)));
        debug!(from, to, inserted, "Route connected");
        Ok(())
    }

    fn disconnect(&self, from: &str, to: &str) -> Result<(), ResourceError> {
        let removed = self
            .inner
            .routes
            .write()
            .remove(&(normalize_terminal(from), normalize_terminal(to)));
        debug!(from, to, removed, "Route disconnected");
        Ok(())
    }
}

impl Hardware for MockBoard {
    fn router(&self) -> Box<dyn SignalRouter> {
        Box::new(self.clone())
    }

    fn counter(&self, config: &CounterConfig) -> Result<Box<dyn Channel>, ResourceError> {
        Ok(Box::new(MockCounter::new(self, config)))
    }

    fn gate_generator(&self, config: &TimerConfig) -> Result<Box<dyn GateGenerator>, ResourceError> {
        Ok(Box::new(MockGate::new(self, &config.channel)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_terminal() {
        assert_eq!(normalize_terminal("/Dev1/PFI38"), "dev1/pfi38");
        assert_eq!(normalize_terminal(" dev1/pfi38 "), "dev1/pfi38");
    }

    #[test]
    fn test_internal_output_terminal() {
        assert_eq!(
            internal_output_terminal("Dev1/ctr7").unwrap(),
            "/Dev1/Ctr7InternalOutput"
        );
        assert_eq!(
            internal_output_terminal("/PXI1Slot2/ctr0").unwrap(),
            "/PXI1Slot2/Ctr0InternalOutput"
        );
        assert!(internal_output_terminal("Dev1/ai0").is_err());
        assert!(internal_output_terminal("ctr0").is_err());
        assert!(internal_output_terminal("Dev1/ctr").is_err());
    }

    #[test]
    fn test_routes_idempotent() {
        let board = MockBoard::new();
        board.connect("/Dev1/Ctr7InternalOutput", "/Dev1/PFI38").unwrap();
        board.connect("/Dev1/Ctr7InternalOutput", "/Dev1/PFI38").unwrap();
        assert_eq!(board.routes().len(), 1);

        board.disconnect("/Dev1/Ctr7InternalOutput", "/Dev1/PFI38").unwrap();
        board.disconnect("/Dev1/Ctr7InternalOutput", "/Dev1/PFI38").unwrap();
        assert!(board.routes().is_empty());
    }

    #[test]
    fn test_reservation_ownership() {
        let board = MockBoard::new();
        let inner = board.inner();
        inner.reserve("Dev1/ctr0", "ct1").unwrap();
        inner.reserve("dev1/CTR0", "ct1").unwrap();
        let err = inner.reserve("Dev1/ctr0", "timer").unwrap_err();
        assert_eq!(err.kind, ResourceErrorKind::Busy);

        inner.release("Dev1/ctr0", "timer");
        assert!(board.is_reserved("Dev1/ctr0"));
        inner.release("Dev1/ctr0", "ct1");
        assert!(!board.is_reserved("Dev1/ctr0"));
    }

    #[test]
    fn test_simulation_config_defaults() {
        let config = SimulationConfig::default().with_source("/Dev1/PFI39", 1000.0);
        let board = MockBoard::with_simulation(config);
        assert_eq!(board.inner().rate_for("dev1/pfi39"), 1000.0);
        assert_eq!(board.inner().rate_for("dev1/pfi35"), 100_000.0);
    }
}
