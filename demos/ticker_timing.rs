//! Fixed-period ticker: zero initial delay, deadline-bounded probes, and
//! recovery onto the grid after a consumer pause.

use std::time::Duration;
use weft::{Outcome, Runtime};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let ticker = cx
            .scope()
            .ticker(Duration::from_millis(100), Duration::ZERO)?;

        let first = ticker.recv(&cx).await?;
        println!("[{}] first tick: {first:?}", cx.now());

        let probe = ticker.recv_timeout(&cx, Duration::from_millis(50)).await?;
        println!("[{}] 50ms probe: {probe:?}", cx.now());

        let probe = ticker.recv_timeout(&cx, Duration::from_millis(60)).await?;
        println!("[{}] 60ms probe: {probe:?}", cx.now());

        println!("[{}] pausing for 150ms", cx.now());
        cx.sleep(Duration::from_millis(150)).await?;
        let next = ticker.recv(&cx).await?;
        println!("[{}] tick after pause: {next:?}", cx.now());

        ticker.cancel();
        while ticker.recv(&cx).await?.is_some() {}
        Ok(())
    });
    println!("done: {outcome:?}");
}
