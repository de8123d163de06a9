//! tests/common/harness.rs
use kestrel_periodic::{LocalReactor, PeriodicTimer};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kestrel_periodic=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A timer on a fresh [`LocalReactor`] whose handler records when it ran.
pub struct TimerHarness {
    pub reactor: LocalReactor,
    pub timer: Rc<PeriodicTimer<LocalReactor>>,
    started: Instant,
    firings: Rc<RefCell<Vec<Duration>>>,
}

impl TimerHarness {
    /// Creates a stopped timer with the given period.
    pub fn new(period: Duration) -> Self {
        init_tracing();
        let reactor = LocalReactor::new();
        let timer = Rc::new(PeriodicTimer::new(reactor.clone()));
        timer.set_period(period);

        let started = Instant::now();
        let firings = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&firings);
        timer.set_handler(move || log.borrow_mut().push(started.elapsed()));

        Self {
            reactor,
            timer,
            started,
            firings,
        }
    }

    /// Time elapsed since the harness was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time of every handler invocation so far.
    pub fn firings(&self) -> Vec<Duration> {
        self.firings.borrow().clone()
    }

    /// Handle used by custom handlers to record an invocation.
    pub fn recorder(&self) -> impl Fn() + 'static {
        let (started, log) = (self.started, Rc::clone(&self.firings));
        move || log.borrow_mut().push(started.elapsed())
    }
}

/// Asserts that `actual` is within `[expected, expected + tolerance)`.
pub fn assert_near(actual: Duration, expected: Duration, tolerance: Duration) {
    assert!(
        actual >= expected && actual < expected + tolerance,
        "expected {expected:?} (+{tolerance:?}), got {actual:?}"
    );
}
