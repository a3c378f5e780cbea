//! Fan-out: one producer, five workers sharing a rendezvous channel.
//! Every value is processed by exactly one worker.

use std::time::Duration;
use weft::{channel, CancelReason, Channel, Cx, Error, Outcome, Runtime};

async fn produce(cx: Cx, out: Channel<u32>) -> Result<(), Error> {
    let mut x = 1u32;
    loop {
        out.send(&cx, x).await?;
        x += 1;
        cx.sleep(Duration::from_millis(100)).await?;
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let chan = channel::<u32>(0);
        let scope = cx.scope();

        let tx = chan.clone();
        let producer = scope.spawn_named("producer", move |cx| produce(cx, tx))?;

        for id in 0..5u32 {
            let rx = chan.clone();
            scope.spawn_named(format!("worker-{id}"), move |cx| async move {
                while let Some(v) = rx.recv(&cx).await? {
                    println!("[{}] worker {id} got {v}", cx.now());
                }
                Ok(())
            })?;
        }

        cx.sleep(Duration::from_millis(950)).await?;
        producer.cancel(CancelReason::user("enough values"));
        chan.close();
        Ok(())
    });
    println!("done: {outcome:?}");
}
