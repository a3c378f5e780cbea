//! Failure propagation: one worker fails, its sibling is cancelled and
//! runs shielded cleanup before unwinding.

use std::time::Duration;
use weft::{Error, Outcome, Runtime};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let scope = cx.scope();

        scope.spawn_named("steady", |cx| async move {
            match cx.sleep(Duration::from_secs(60)).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    println!("[{}] steady worker cancelled: {err}", cx.now());
                    cx.shield(cx.sleep(Duration::from_millis(100))).await?;
                    println!("[{}] cleanup finished", cx.now());
                    Err(err)
                }
            }
        })?;

        scope.spawn_named("flaky", |cx| async move {
            cx.sleep(Duration::from_millis(10)).await?;
            println!("[{}] flaky worker failing", cx.now());
            Err::<(), _>(Error::task_failed("flaky worker exploded"))
        })?;

        Ok(())
    });
    println!("done: {outcome:?}");
}
