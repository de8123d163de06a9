//! 周期定时器在 tokio 时钟上的集成测试
//! Periodic timer integration tests on the tokio clock

pub mod common;

use common::harness::{TimerHarness, assert_near, init_tracing};
use kestrel_periodic::{Error, LocalReactor, PeriodicTimer, TimerState};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::{LocalSet, yield_now};
use tokio::time::sleep;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn test_fires_every_period() {
    let harness = TimerHarness::new(ms(50));
    harness.timer.start();

    harness.reactor.run_for(ms(175)).await.unwrap();

    let firings = harness.firings();
    assert_eq!(firings.len(), 3, "firings: {firings:?}");
    assert_near(firings[0], ms(50), ms(2));
    for pair in firings.windows(2) {
        // 固定延迟：间隔不小于周期
        assert_near(pair[1] - pair[0], ms(50), ms(2));
    }
    assert_eq!(harness.timer.state(), TimerState::Running);
    assert_eq!(harness.reactor.outstanding(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fast_forward_runs_on_next_dispatch() {
    let harness = TimerHarness::new(ms(10_000));
    harness.timer.start();
    harness.timer.fast_forward();
    assert!(harness.firings().is_empty());

    harness.reactor.run_for(ms(1)).await.unwrap();

    let firings = harness.firings();
    assert_eq!(firings.len(), 1);
    assert!(firings[0] < ms(1));
    assert_eq!(harness.timer.state(), TimerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_another_task() {
    let harness = TimerHarness::new(ms(50));
    harness.timer.start();

    let local = LocalSet::new();
    local
        .run_until(async {
            let driver = harness.reactor.clone();
            let dispatch = tokio::task::spawn_local(async move { driver.run().await });

            sleep(ms(125)).await;
            harness.timer.stop();
            assert_eq!(harness.timer.state(), TimerState::CancelingToStop);

            sleep(ms(200)).await;
            harness.reactor.shutdown();
            dispatch.await.unwrap().unwrap();
        })
        .await;

    assert_eq!(harness.firings().len(), 2);
    assert_eq!(harness.timer.state(), TimerState::Stopped);
    assert_eq!(harness.reactor.outstanding(), 0);
    assert!(harness.elapsed() >= ms(325));
}

#[tokio::test(start_paused = true)]
async fn test_handler_stops_timer_after_three_firings() {
    let harness = TimerHarness::new(ms(20));
    let record = harness.recorder();
    let (weak, count) = (Rc::downgrade(&harness.timer), Rc::new(Cell::new(0u32)));
    harness.timer.set_handler(move || {
        record();
        count.set(count.get() + 1);
        if count.get() == 3 {
            if let Some(timer) = weak.upgrade() {
                timer.stop();
            }
        }
    });

    harness.timer.start();
    harness.reactor.run_until_idle().await.unwrap();

    assert_eq!(harness.firings().len(), 3);
    assert_eq!(harness.timer.state(), TimerState::Stopped);
    assert_near(harness.elapsed(), ms(60), ms(4));
}

#[tokio::test(start_paused = true)]
async fn test_handler_destroys_timer() {
    init_tracing();
    let reactor = LocalReactor::new();
    let slot: Rc<RefCell<Option<PeriodicTimer<LocalReactor>>>> = Rc::new(RefCell::new(None));
    let calls = Rc::new(Cell::new(0u32));

    let timer = PeriodicTimer::new(reactor.clone());
    timer.set_period(ms(30));
    let (weak_slot, count) = (Rc::downgrade(&slot), Rc::clone(&calls));
    timer.set_handler(move || {
        count.set(count.get() + 1);
        if let Some(slot) = weak_slot.upgrade() {
            if let Some(timer) = slot.borrow().as_ref() {
                timer.start();
            }
            slot.borrow_mut().take();
        }
    });
    timer.start();
    *slot.borrow_mut() = Some(timer);

    reactor.run_until_idle().await.unwrap();

    assert_eq!(calls.get(), 1);
    assert!(slot.borrow().is_none());
    assert_eq!(reactor.outstanding(), 0);
    assert_eq!(reactor.stats().canceled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_from_handler() {
    let harness = TimerHarness::new(ms(10));
    let record = harness.recorder();
    let reactor = harness.reactor.clone();
    harness.timer.set_handler(move || {
        record();
        reactor.shutdown();
    });

    harness.timer.start();
    harness.reactor.run().await.unwrap();

    assert_eq!(harness.firings().len(), 1);
    assert!(harness.reactor.is_shutdown());
    // 处理函数返回后定时器已经重新调度
    assert_eq!(harness.timer.state(), TimerState::Running);
    assert_eq!(
        harness.reactor.run_for(ms(100)).await,
        Err(Error::ReactorShutdown)
    );
}

#[tokio::test]
async fn test_zero_period_run_for_returns() {
    let harness = TimerHarness::new(Duration::ZERO);
    harness.timer.start();

    harness.reactor.run_for(ms(10)).await.unwrap();

    assert!(!harness.firings().is_empty());
    assert!(harness.elapsed() >= ms(10));
    assert_eq!(harness.timer.state(), TimerState::Running);
    assert_eq!(harness.reactor.outstanding(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_period_shutdown_from_another_task() {
    let harness = TimerHarness::new(Duration::ZERO);
    let record = harness.recorder();
    let calls = Rc::new(Cell::new(0u32));
    let count = Rc::clone(&calls);
    harness.timer.set_handler(move || {
        record();
        count.set(count.get() + 1);
    });
    harness.timer.start();

    let local = LocalSet::new();
    local
        .run_until(async {
            let stopper = harness.reactor.clone();
            let watched = Rc::clone(&calls);
            let stop = tokio::task::spawn_local(async move {
                while watched.get() < 50 {
                    yield_now().await;
                }
                stopper.shutdown();
            });

            harness.reactor.run().await.unwrap();
            stop.await.unwrap();
        })
        .await;

    assert!(harness.reactor.is_shutdown());
    assert!(calls.get() >= 50);
    assert_eq!(harness.reactor.outstanding(), 1);
}
