//! Scope-tree semantics: completion, failure propagation, cancellation,
//! and shielded cleanup.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft::{CancelKind, CancelReason, Error, ErrorKind, Outcome, Runtime};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn run_waits_for_every_spawned_task() {
    init_tracing();
    let finished = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&finished);

    let outcome: Outcome<()> = Runtime::new().run(move |cx| async move {
        for i in 0..5u64 {
            let counter = Arc::clone(&counter);
            cx.scope().spawn(move |cx| async move {
                cx.sleep(Duration::from_millis((i + 1) * 10)).await?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
        }
        // The root body returns before any worker does; the runtime still
        // drains them all.
        Ok(())
    });

    assert!(outcome.is_ok());
    assert_eq!(finished.load(Ordering::SeqCst), 5);
}

#[test]
fn join_returns_the_value() {
    init_tracing();
    let outcome = Runtime::new().run(|cx| async move {
        let handle = cx.scope().spawn(|cx| async move {
            cx.sleep(Duration::from_millis(10)).await?;
            Ok(42u32)
        })?;
        let value = handle.join(&cx).await?;
        Ok(value)
    });
    assert_eq!(outcome.ok(), Some(42));
}

#[test]
fn failure_cancels_siblings_and_reports_first() {
    init_tracing();
    let seen = Arc::new(Mutex::new(None));
    let sibling_saw = Arc::clone(&seen);

    let outcome: Outcome<()> = Runtime::new().run(move |cx| async move {
        let scope = cx.scope();
        scope.spawn(move |cx| async move {
            match cx.sleep(Duration::from_secs(3600)).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    *sibling_saw.lock() = err.cancel_reason().map(CancelReason::kind);
                    Err(err)
                }
            }
        })?;
        scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(10)).await?;
            Err::<(), _>(Error::task_failed("worker exploded"))
        })?;
        Ok(())
    });

    match outcome {
        Outcome::Failed(err) => {
            assert_eq!(err.kind(), ErrorKind::TaskFailed);
            assert_eq!(err.message(), Some("worker exploded"));
            assert!(err.origin().is_some());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(*seen.lock(), Some(CancelKind::SiblingFailed));
}

#[test]
fn later_failures_are_dropped() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let scope = cx.scope();
        scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(10)).await?;
            Err::<(), _>(Error::task_failed("first"))
        })?;
        scope.spawn(|cx| async move {
            // Fails whether it runs to its deadline or is cancel-woken
            // by the first failure.
            let _ = cx.sleep(Duration::from_millis(20)).await;
            Err::<(), _>(Error::task_failed("second"))
        })?;
        Ok(())
    });

    match outcome {
        Outcome::Failed(err) => assert_eq!(err.message(), Some("first")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn cancelling_a_scope_reaches_descendants() {
    init_tracing();
    let seen = Arc::new(Mutex::new(None));
    let grandchild_saw = Arc::clone(&seen);

    let outcome: Outcome<()> = Runtime::new().run(move |cx| async move {
        let child = cx.scope().child()?;
        let grandchild = child.child()?;
        grandchild.spawn(move |cx| async move {
            match cx.sleep(Duration::from_secs(3600)).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    *grandchild_saw.lock() = err.cancel_reason().map(CancelReason::kind);
                    Err(err)
                }
            }
        })?;

        cx.sleep(Duration::from_millis(5)).await?;
        child.cancel(CancelReason::user("tearing down"));
        Ok(())
    });

    assert!(outcome.is_ok());
    assert_eq!(*seen.lock(), Some(CancelKind::ParentCancelled));
}

#[test]
fn child_scope_stays_open_while_its_creator_runs() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let child = cx.scope().child()?;
        let quick = cx.scope().spawn(|_cx| async { Ok(()) })?;
        quick.join(&cx).await?;

        // The sibling finishing must not have closed the idle child.
        let worker = child.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(5)).await?;
            Ok(7u32)
        })?;
        assert_eq!(worker.join(&cx).await?, 7);
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn spawn_after_cancel_is_refused() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let scope = cx.scope().child()?;
        scope.cancel(CancelReason::user("done"));
        assert!(scope.is_cancelled());

        let err = scope.spawn(|_cx| async { Ok(()) }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScopeClosed);
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn cancelled_task_reports_cancelled_on_join() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let worker = cx.scope().spawn(|cx| async move {
            cx.sleep(Duration::from_secs(3600)).await?;
            Ok(())
        })?;
        cx.sleep(Duration::from_millis(5)).await?;
        worker.cancel(CancelReason::user("stop"));

        let err = worker.join(&cx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(
            err.cancel_reason().map(CancelReason::kind),
            Some(CancelKind::User)
        );

        // The joiner itself was not cancelled.
        cx.checkpoint()?;
        Ok(())
    });
    assert!(outcome.is_ok());
}

#[test]
fn shield_lets_cleanup_finish() {
    init_tracing();
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cleaned);

    let outcome: Outcome<()> = Runtime::new().run(move |cx| async move {
        let worker = cx.scope().spawn(move |cx| async move {
            match cx.sleep(Duration::from_secs(3600)).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    // Cleanup must survive the pending cancellation.
                    cx.shield(cx.sleep(Duration::from_millis(100))).await?;
                    flag.store(true, Ordering::SeqCst);
                    Err(err)
                }
            }
        })?;

        cx.sleep(Duration::from_millis(5)).await?;
        worker.cancel(CancelReason::user("stop"));
        let err = worker.join(&cx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        Ok(())
    });

    assert!(outcome.is_ok());
    assert!(cleaned.load(Ordering::SeqCst));
}

#[test]
fn stalls_are_reported_not_hung() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let chan = weft::channel::<u32>(1);
        // Nobody will ever send.
        chan.recv(&cx).await?;
        Ok(())
    });

    match outcome {
        Outcome::Failed(err) => assert_eq!(err.kind(), ErrorKind::Stalled),
        other => panic!("expected stall, got {other:?}"),
    }
}

#[test]
fn cancellation_outcome_carries_strongest_reason() {
    init_tracing();
    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let worker = cx.scope().spawn(|cx| async move {
            cx.sleep(Duration::from_secs(3600)).await?;
            Ok(())
        })?;
        cx.sleep(Duration::from_millis(1)).await?;
        worker.cancel(CancelReason::user("first"));
        worker.cancel(CancelReason::shutdown());

        let err = worker.join(&cx).await.unwrap_err();
        assert_eq!(
            err.cancel_reason().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );
        Ok(())
    });
    assert!(outcome.is_ok());
}
