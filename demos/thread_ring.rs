//! The thread-ring benchmark: a ring of actors forwards a decrementing
//! token until it expires.
//!
//!     cargo run --release --example thread_ring

use std::time::Instant;

use futures::future::Either;
use lapis::prelude::*;

const RING_SIZE: u64 = 1_000_000;
const HOPS: u64 = 1_000_000;

struct RingActor {
    key: u64,
}

impl Actor for RingActor {
    type Key = u64;

    fn activate(key: &u64) -> Self {
        Self {
            key: *key,
        }
    }
}

impl RingActor {
    fn ping(&mut self, n: u64) -> impl std::future::Future<Output = lapis::Result<()>> + 'static {
        if n > 1 {
            let next = lapis::get::<RingActor>((self.key + 1) % RING_SIZE);
            Either::Left(next.tell(ring::ping, (n - 1,)))
        } else {
            Either::Right(std::future::ready(Ok(())))
        }
    }
}

messages! {
    impl RingActor as pub mod ring {
        fn ping(&mut self, n: u64) -> future ();
    }
}

fn main() -> lapis::Result<()> {
    tracing_subscriber::fmt::init();

    // Two shards minimum: the ring leans on cross-shard hops to keep the
    // eager local dispatch chain shallow.
    let shards = RuntimeOptions::default().shards.max(2);
    Runtime::new(RuntimeOptions {
        shards,
    })
    .block_on(|| async {
        use ring::Tell as _;

        let started = Instant::now();
        lapis::get::<RingActor>(0).ping(HOPS).await?;
        let elapsed = started.elapsed();

        println!(
            "{HOPS} hops across a ring of {RING_SIZE} actors on {shards} shards in {elapsed:?} \
             ({:.0} hops/s)",
            HOPS as f64 / elapsed.as_secs_f64()
        );
        Ok(())
    })
}
