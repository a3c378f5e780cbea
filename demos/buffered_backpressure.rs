//! Backpressure on a bounded channel: the sender races ahead until the
//! buffer fills, then waits for the slow consumer.

use std::time::Duration;
use weft::{channel, Error, Outcome, Runtime};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let chan = channel::<u32>(4);
        let tx = chan.clone();
        let sender = cx.scope().spawn_named("sender", move |cx| async move {
            for v in 0..10 {
                println!("[{}] sending {v}", cx.now());
                tx.send(&cx, v).await.map_err(Error::from)?;
            }
            tx.close();
            Ok(())
        })?;

        cx.sleep(Duration::from_millis(5000)).await?;
        println!("[{}] draining", cx.now());
        while let Some(v) = chan.recv(&cx).await? {
            println!("[{}] received {v}", cx.now());
        }
        sender.join(&cx).await?;
        Ok(())
    });
    println!("done: {outcome:?}");
}
