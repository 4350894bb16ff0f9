use ekz_tesla::error::{EkzError, Result};
use ekz_tesla::scheduler::{AutostartAction, TariffScheduler, parse_cron, run_cron};
use ekz_tesla::tariff::TariffSchedule;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingAction {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingAction {
    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AutostartAction for CountingAction {
    async fn run(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EkzError::api("charging backend unavailable"));
        }
        Ok(())
    }
}

fn always_low() -> TariffSchedule {
    TariffSchedule::new(Vec::new(), None)
}

fn always_high() -> TariffSchedule {
    TariffSchedule::new(
        vec!["00:00-12:00".parse().unwrap(), "12:00-00:00".parse().unwrap()],
        None,
    )
}

#[tokio::test]
async fn second_start_fails_while_running() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action, always_low());
    let parent = CancellationToken::new();

    scheduler.start(&parent).unwrap();
    let err = scheduler.start(&parent).unwrap_err();
    assert!(matches!(err, EkzError::Scheduler { .. }));
    assert!(scheduler.is_running());

    scheduler.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_synchronous() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action, always_low());

    // never started
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    scheduler.start(&CancellationToken::new()).unwrap();
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    scheduler.stop().await;

    // can be started again after a stop
    scheduler.start(&CancellationToken::new()).unwrap();
    assert!(scheduler.is_running());
    scheduler.stop().await;
}

#[tokio::test]
async fn first_tick_runs_immediately() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action.clone(), always_low())
        .with_interval(Duration::from_secs(3600));

    scheduler.start(&CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop().await;

    assert_eq!(action.calls(), 1);
}

#[tokio::test]
async fn failing_action_does_not_stop_the_loop() {
    let action = Arc::new(CountingAction::failing());
    let scheduler = TariffScheduler::new(action.clone(), always_low())
        .with_interval(Duration::from_millis(10));

    scheduler.start(&CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(scheduler.is_running());
    scheduler.stop().await;

    assert!(action.calls() >= 3, "only {} calls", action.calls());
}

#[tokio::test]
async fn high_tariff_skips_the_action() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action.clone(), always_high())
        .with_interval(Duration::from_millis(10));

    scheduler.start(&CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    scheduler.stop().await;

    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn parent_cancellation_ends_the_loop() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action, always_low());
    let parent = CancellationToken::new();

    scheduler.start(&parent).unwrap();
    parent.cancel();
    tokio::time::timeout(Duration::from_secs(1), scheduler.wait())
        .await
        .unwrap();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let action = Arc::new(CountingAction::default());
    let scheduler = TariffScheduler::new(action, always_low()).with_interval(Duration::ZERO);
    assert!(scheduler.start(&CancellationToken::new()).is_err());
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn cron_loop_returns_on_cancellation() {
    let action = CountingAction::default();
    let schedule = parse_cron("0 0 1 1 *").unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    tokio::time::timeout(
        Duration::from_secs(1),
        run_cron(&schedule, None, &action, &cancel),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn cron_loop_runs_the_action() {
    let action = CountingAction::failing();
    // every second
    let schedule = parse_cron("* * * * * *").unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    run_cron(&schedule, None, &action, &cancel).await.unwrap();
    assert!(action.calls() >= 1);
}
