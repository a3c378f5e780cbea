//! Prime sieve as a pipeline: a number source plus one filter stage per
//! discovered prime, all torn down by cancelling their scope.

use weft::{channel, CancelReason, Channel, Cx, Error, Outcome, Runtime};

async fn numbers(cx: Cx, out: Channel<u32>) -> Result<(), Error> {
    let mut x = 2u32;
    loop {
        out.send(&cx, x).await?;
        x += 1;
    }
}

async fn filter(cx: Cx, input: Channel<u32>, out: Channel<u32>, prime: u32) -> Result<(), Error> {
    while let Some(v) = input.recv(&cx).await? {
        if v % prime != 0 {
            out.send(&cx, v).await?;
        }
    }
    out.close();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let outcome: Outcome<()> = Runtime::new().run(|cx| async move {
        let pipeline = cx.scope().child()?;
        let mut cur = channel::<u32>(0);

        let tx = cur.clone();
        pipeline.spawn_named("numbers", move |cx| numbers(cx, tx))?;

        for _ in 0..10 {
            let prime = cur.recv(&cx).await?.ok_or_else(Error::channel_closed)?;
            println!("{prime}");

            let next = channel::<u32>(0);
            let (input, out) = (cur.clone(), next.clone());
            pipeline.spawn_named(format!("filter-{prime}"), move |cx| {
                filter(cx, input, out, prime)
            })?;
            cur = next;
        }

        pipeline.cancel(CancelReason::user("got ten primes"));
        Ok(())
    });
    println!("done: {outcome:?}");
}
