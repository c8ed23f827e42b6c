//! End-to-end acquisitions on the simulated board.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ni660x_core::{
    AcquisitionState, AppConfig, Channel, ConnectionsConfig, CounterConfig, CountingApp,
    CountingError, GateGenerator, Hardware, ResourceError, SignalRouter, TimerConfig,
};
use ni660x_driver_mock::{FaultScenario, MockBoard, SimulationConfig};

fn config() -> AppConfig {
    AppConfig {
        connections: ConnectionsConfig {
            from: "/Dev1/Ctr7InternalOutput".to_string(),
            to: vec!["/Dev1/PFI38".to_string(), "/Dev1/PFI34".to_string()],
        },
        timer: TimerConfig {
            channel: "Dev1/ctr7".to_string(),
        },
        counters: vec![
            CounterConfig {
                name: "a".to_string(),
                channel: "Dev1/ctr0".to_string(),
                gate: "/Dev1/PFI38".to_string(),
                source: "/Dev1/PFI39".to_string(),
            },
            CounterConfig {
                name: "b".to_string(),
                channel: "Dev1/ctr1".to_string(),
                gate: "/Dev1/PFI34".to_string(),
                source: "/Dev1/PFI35".to_string(),
            },
        ],
    }
}

fn board() -> MockBoard {
    MockBoard::with_simulation(
        SimulationConfig::default()
            .with_source("/Dev1/PFI39", 1_000.0)
            .with_source("/Dev1/PFI35", 2_000.0),
    )
}

fn data_of(app: &CountingApp, name: &str) -> Vec<f64> {
    app.get_all_data()
        .into_iter()
        .find(|(channel, _)| channel == name)
        .map(|(_, data)| data)
        .unwrap_or_default()
}

fn wait_done(app: &CountingApp) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if app.is_done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_disabled_channel_excluded_from_run() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    assert_eq!(board.routes().len(), 2);

    app.set_channels_enabled(&["b".to_string()], false)?;
    app.start_all(10, 0.01, 0.01, 0.0)?;
    assert_eq!(app.started_names(), vec!["a"]);
    assert!(!board.is_reserved("Dev1/ctr1"));

    assert!(wait_done(&app), "pulse train never finished");
    assert_eq!(app.state(), AcquisitionState::Draining);
    assert_eq!(app.get_samples_readies(), 10);

    let data = app.get_all_data();
    assert_eq!(data, vec![("a".to_string(), vec![10.0; 10])]);

    assert_eq!(app.get_channel_data("a", 0, -1)?.len(), 9);
    assert_eq!(app.get_channel_data("a", -3, 100)?, vec![10.0; 3]);
    assert!(app.get_channel_data("b", 0, -1)?.is_empty());

    app.stop()?;
    assert_eq!(app.state(), AcquisitionState::Idle);
    assert_eq!(data_of(&app, "a").len(), 10);
    Ok(())
}

#[test]
fn test_all_channels_receive_routed_gate() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;

    app.start_all(4, 0.005, 0.005, 0.01)?;
    assert!(wait_done(&app));

    assert_eq!(data_of(&app, "a"), vec![5.0; 4]);
    assert_eq!(data_of(&app, "b"), vec![10.0; 4]);
    assert_eq!(app.get_samples_readies(), 4);
    Ok(())
}

#[test]
fn test_is_done_transitions() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    assert!(app.is_done());

    app.start_channels(100)?;
    assert_eq!(app.state(), AcquisitionState::Armed);
    assert!(app.is_done());

    app.start_timer(100, 0.05, 0.05, 0.0)?;
    assert!(!app.is_done());
    assert_eq!(app.state(), AcquisitionState::Running);

    app.stop()?;
    assert!(app.is_done());
    assert!(app.get_samples_readies() < 100);
    Ok(())
}

#[test]
fn test_done_stays_true_until_next_start() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;

    app.start_all(3, 0.005, 0.005, 0.0)?;
    assert!(wait_done(&app));
    for _ in 0..5 {
        std::thread::sleep(Duration::from_millis(10));
        assert!(app.is_done());
        assert_eq!(app.get_samples_readies(), 3);
    }

    app.start_timer(50, 0.05, 0.05, 0.0)?;
    assert!(!app.is_done());
    app.stop()?;
    assert!(app.is_done());
    Ok(())
}

#[test]
fn test_reads_while_running_see_monotonic_buffers() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    app.start_all(40, 0.002, 0.003, 0.0)?;

    let mut previous: Vec<f64> = Vec::new();
    let mut last_ready = 0;
    let mut reads_while_running = 0;
    while !app.is_done() {
        let ready = app.get_samples_readies();
        assert!(ready >= last_ready);
        last_ready = ready;

        for name in ["a", "b"] {
            let window = app.get_channel_data(name, 0, ready as i64)?;
            assert_eq!(window.len(), ready);
        }

        let current = app.get_channel_data("a", 0, i64::MAX)?;
        assert!(current.len() >= ready);
        assert!(current.len() >= previous.len());
        assert_eq!(&current[..previous.len()], previous.as_slice());
        previous = current;
        reads_while_running += 1;
        std::thread::sleep(Duration::from_millis(1));
    }

    assert!(reads_while_running > 0);
    assert_eq!(app.get_samples_readies(), 40);
    assert_eq!(data_of(&app, "a").len(), 40);
    Ok(())
}

#[test]
fn test_starts_rejected_after_close() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    app.close();

    assert!(app.start_channels(5).unwrap_err().is_closed());
    assert!(app.start_timer(5, 0.01, 0.01, 0.0).unwrap_err().is_closed());
    assert!(app.start_all(5, 0.01, 0.01, 0.0).unwrap_err().is_closed());
    assert_eq!(board.armed_counters(), 0);
    assert!(!board.is_reserved("Dev1/ctr7"));

    app.stop()?;
    app.set_channels_enabled(&["a".to_string()], false)?;
    assert_eq!(app.get_names(), vec!["a", "b"]);
    Ok(())
}

#[test]
fn test_partial_start_failure_then_stop() -> anyhow::Result<()> {
    let board = board();
    board
        .faults()
        .inject("Dev1/ctr1", FaultScenario::FailStart { count: 1 });
    let mut app = CountingApp::open(config(), &board)?;

    let err = app.start_all(5, 0.01, 0.01, 0.0).unwrap_err();
    match &err {
        CountingError::ChannelStart {
            channel, started, ..
        } => {
            assert_eq!(channel, "b");
            assert_eq!(started, &vec!["a".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_resource());
    assert_eq!(board.armed_counters(), 1);
    assert!(app.is_done(), "generator must not start after a failed arm");

    app.stop()?;
    assert_eq!(board.armed_counters(), 0);
    assert!(!board.is_reserved("Dev1/ctr0"));

    app.start_all(2, 0.005, 0.005, 0.0)?;
    assert_eq!(app.started_names(), vec!["a", "b"]);
    Ok(())
}

#[test]
fn test_double_stop_is_harmless() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    app.stop()?;
    app.start_all(3, 0.005, 0.005, 0.0)?;
    app.stop()?;
    app.stop()?;
    assert_eq!(board.armed_counters(), 0);
    Ok(())
}

#[test]
fn test_stop_failure_still_stops_everything() -> anyhow::Result<()> {
    let board = board();
    let mut app = CountingApp::open(config(), &board)?;
    app.start_all(100, 0.05, 0.05, 0.0)?;

    board.faults().inject("Dev1/ctr7", FaultScenario::FailStop);
    assert!(app.stop().is_err());
    assert!(app.is_done());
    assert_eq!(board.armed_counters(), 0);

    board.faults().clear();
    app.stop()?;
    Ok(())
}

#[test]
fn test_connect_failure_rolls_back_routes() {
    let board = board();
    board.faults().inject("/Dev1/PFI34", FaultScenario::FailConnect);

    let err = CountingApp::open(config(), &board).unwrap_err();
    assert!(err.is_resource());
    assert!(board.routes().is_empty());
}

#[test]
fn test_invalid_timer_channel_rolls_back_routes() {
    let board = board();
    let mut config = config();
    config.timer.channel = "Dev1/port0".to_string();

    assert!(CountingApp::open(config, &board).is_err());
    assert!(board.routes().is_empty());
}

#[test]
fn test_drop_closes_app() -> anyhow::Result<()> {
    let board = board();
    {
        let mut app = CountingApp::open(config(), &board)?;
        app.start_all(100, 0.05, 0.05, 0.0)?;
        assert!(board.is_reserved("Dev1/ctr7"));
    }
    assert!(board.routes().is_empty());
    assert_eq!(board.armed_counters(), 0);
    assert!(!board.is_reserved("Dev1/ctr0"));
    assert!(!board.is_reserved("Dev1/ctr7"));
    Ok(())
}

/// Router wrapper counting disconnect calls.
struct CountingRouter {
    inner: MockBoard,
    disconnects: Arc<AtomicUsize>,
}

impl SignalRouter for CountingRouter {
    fn connect(&self, from: &str, to: &str) -> Result<(), ResourceError> {
        self.inner.connect(from, to)
    }

    fn disconnect(&self, from: &str, to: &str) -> Result<(), ResourceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.inner.disconnect(from, to)
    }
}

struct CountingHardware {
    board: MockBoard,
    disconnects: Arc<AtomicUsize>,
}

impl Hardware for CountingHardware {
    fn router(&self) -> Box<dyn SignalRouter> {
        Box::new(CountingRouter {
            inner: self.board.clone(),
            disconnects: self.disconnects.clone(),
        })
    }

    fn counter(&self, config: &CounterConfig) -> Result<Box<dyn Channel>, ResourceError> {
        self.board.counter(config)
    }

    fn gate_generator(
        &self,
        config: &TimerConfig,
    ) -> Result<Box<dyn GateGenerator>, ResourceError> {
        self.board.gate_generator(config)
    }
}

#[test]
fn test_routes_torn_down_exactly_once() -> anyhow::Result<()> {
    let hardware = CountingHardware {
        board: board(),
        disconnects: Arc::new(AtomicUsize::new(0)),
    };

    let mut app = CountingApp::open(config(), &hardware)?;
    app.close();
    assert!(app.is_closed());
    assert_eq!(hardware.disconnects.load(Ordering::SeqCst), 2);

    app.close();
    drop(app);
    assert_eq!(hardware.disconnects.load(Ordering::SeqCst), 2);
    assert!(hardware.board.routes().is_empty());
    Ok(())
}
