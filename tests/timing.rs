//! Virtual time, timeouts, and ticker schedule behavior.

use std::time::{Duration, Instant};
use weft::{timeout, ClockMode, Outcome, Runtime, RuntimeConfig, Time, TimedRecv};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn virtual_clock_jumps_over_sleeps() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        assert_eq!(cx.now(), Time::ZERO);
        cx.sleep(Duration::from_millis(250)).await?;
        assert_eq!(cx.now(), Time::from_millis(250));
        cx.sleep_until(Time::from_millis(400)).await?;
        assert_eq!(cx.now(), Time::from_millis(400));
        // A deadline already in the past resolves immediately.
        cx.sleep_until(Time::from_millis(100)).await?;
        assert_eq!(cx.now(), Time::from_millis(400));
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn timeout_completes_or_expires() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let inner = timeout(&cx, Duration::from_millis(50), cx.sleep(Duration::from_millis(10)))
            .await?;
        assert!(matches!(inner, Some(Ok(()))));
        assert_eq!(cx.now().as_millis(), 10);

        let inner = timeout(&cx, Duration::from_millis(10), cx.sleep(Duration::from_millis(50)))
            .await?;
        assert!(inner.is_none());
        assert_eq!(cx.now().as_millis(), 20);
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn ticker_fires_on_the_grid() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let ticker = cx
            .scope()
            .ticker(Duration::from_millis(100), Duration::ZERO)?;

        let first = ticker.recv(&cx).await?.unwrap();
        assert_eq!(first.scheduled, Time::ZERO);
        let second = ticker.recv(&cx).await?.unwrap();
        assert_eq!(second.scheduled.as_millis(), 100);

        // Right after consuming a tick, a 50ms probe comes up empty.
        let probe = ticker.recv_timeout(&cx, Duration::from_millis(50)).await?;
        assert!(probe.timed_out());
        // The next grid point lands inside a second 60ms probe.
        let probe = ticker.recv_timeout(&cx, Duration::from_millis(60)).await?;
        match probe {
            TimedRecv::Value(tick) => assert_eq!(tick.scheduled.as_millis(), 200),
            other => panic!("expected a tick, got {other:?}"),
        }

        ticker.cancel();
        while ticker.recv(&cx).await?.is_some() {}
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn lagging_consumer_gets_one_late_tick_then_the_grid() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let ticker = cx
            .scope()
            .ticker(Duration::from_millis(100), Duration::ZERO)?;

        let first = ticker.recv(&cx).await?.unwrap();
        assert_eq!(first.scheduled, Time::ZERO);

        // Lag for three and a half periods. Only one tick is retained;
        // the ones scheduled at 200 and 300 are dropped.
        cx.sleep(Duration::from_millis(350)).await?;
        let late = ticker.recv(&cx).await?.unwrap();
        assert_eq!(late.scheduled.as_millis(), 100);

        let next = ticker.recv(&cx).await?.unwrap();
        assert_eq!(next.scheduled.as_millis(), 400);

        ticker.cancel();
        while ticker.recv(&cx).await?.is_some() {}
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn ticker_initial_delay_offsets_the_grid() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let ticker = cx
            .scope()
            .ticker(Duration::from_millis(100), Duration::from_millis(30))?;

        let first = ticker.recv(&cx).await?.unwrap();
        assert_eq!(first.scheduled.as_millis(), 30);
        let second = ticker.recv(&cx).await?.unwrap();
        assert_eq!(second.scheduled.as_millis(), 130);

        ticker.cancel();
        while ticker.recv(&cx).await?.is_some() {}
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn steady_clock_takes_real_time() {
    init_tracing();
    let config = RuntimeConfig {
        clock: ClockMode::Steady,
        max_steps: None,
    };
    let started = Instant::now();
    let outcome: Outcome<()> = Runtime::with_config(config).run(|cx| async move {
        cx.sleep(Duration::from_millis(20)).await?;
        Ok(())
    });
    assert!(outcome.is_ok());
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn step_limit_aborts_runaway_workloads() {
    init_tracing();
    let config = RuntimeConfig {
        clock: ClockMode::Virtual,
        max_steps: Some(100),
    };
    let outcome: Outcome<()> = Runtime::with_config(config).run(|cx| async move {
        loop {
            cx.yield_now().await?;
        }
    });
    match outcome {
        Outcome::Failed(err) => assert_eq!(err.kind(), weft::ErrorKind::Stalled),
        other => panic!("expected stall, got {other:?}"),
    }
}
