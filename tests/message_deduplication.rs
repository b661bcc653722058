//! Batch coalescing: invocation counts, ordering, failure semantics, and
//! the bounded in-flight buffer.

use lapis::batch::{deduplicate, with_buffer};
use lapis::prelude::*;

struct Accumulator {
    invocations: u64,
    total: u64,
}

impl Actor for Accumulator {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        Self {
            invocations: 0,
            total: 0,
        }
    }
}

impl Accumulator {
    fn double(&mut self, n: u64) -> u64 {
        self.invocations += 1;
        n * 2
    }

    fn checked_double(&mut self, n: u64) -> impl std::future::Future<Output = Result<u64>> + 'static {
        self.invocations += 1;
        std::future::ready(if n == 5 {
            Err(Error::Other("five is right out"))
        } else {
            Ok(n * 2)
        })
    }

    fn bump(&mut self) {
        self.invocations += 1;
    }

    fn add(&mut self, n: u64) {
        self.invocations += 1;
        self.total += n;
    }

    fn invocations(&self) -> u64 {
        self.invocations
    }

    fn total(&self) -> u64 {
        self.total
    }
}

messages! {
    impl Accumulator as pub mod accumulator {
        fn double(&mut self, n: u64) -> u64;
        fn checked_double(&mut self, n: u64) -> future u64;
        fn bump(&mut self);
        fn add(&mut self, n: u64);
        fn invocations(&self) -> u64;
        fn total(&self) -> u64;
    }
}

fn runtime() -> Runtime {
    Runtime::new(RuntimeOptions {
        shards: 4,
    })
}

/// `n` pushes mean exactly `n` invocations, and the result vector comes
/// back in push order.
#[test]
fn batch_preserves_count_and_order() {
    runtime().block_on(|| async {
        use accumulator::Tell as _;

        let actor = lapis::get::<Accumulator>(1);
        let doubled = deduplicate(&actor, accumulator::double, |b| {
            for n in 0..100u64 {
                b.push((n,));
            }
        })
        .await?;

        assert_eq!(doubled, (0..100u64).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(actor.invocations().await?, 100);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// A handler without arguments coalesces into a bare invocation count.
#[test]
fn zero_argument_batches_carry_a_count() {
    runtime().block_on(|| async {
        use accumulator::Tell as _;

        let actor = lapis::get::<Accumulator>(2);
        let results = deduplicate(&actor, accumulator::bump, |b| {
            for _ in 0..64 {
                b.push(());
            }
        })
        .await?;

        assert_eq!(results.len(), 64);
        assert_eq!(actor.invocations().await?, 64);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// The first failing element fails the whole batch; elements after it are
/// not invoked and prior results are discarded.
#[test]
fn batch_failure_aborts_the_remainder() {
    runtime().block_on(|| async {
        use accumulator::Tell as _;

        let actor = lapis::get::<Accumulator>(3);
        let outcome = deduplicate(&actor, accumulator::checked_double, |b| {
            for n in 0..10u64 {
                b.push((n,));
            }
        })
        .await;

        match outcome {
            Err(Error::Other(msg)) => assert_eq!(msg, "five is right out"),
            other => panic!("expected the element failure, got {other:?}"),
        }
        // Elements 0..=5 ran, 6..10 never did.
        assert_eq!(actor.invocations().await?, 6);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// An empty builder is a no-op round trip.
#[test]
fn empty_batches_are_legal() {
    runtime().block_on(|| async {
        use accumulator::Tell as _;

        let actor = lapis::get::<Accumulator>(4);
        let results = deduplicate(&actor, accumulator::double, |_| {}).await?;
        assert!(results.is_empty());
        assert_eq!(actor.invocations().await?, 0);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// The buffer bounds in-flight messages without losing any.
#[test]
fn buffered_production_delivers_everything() {
    runtime().block_on(|| async {
        use accumulator::Tell as _;

        let actor = lapis::get::<Accumulator>(5);
        with_buffer(16, |buf| async move {
            for n in 1..=1000u64 {
                buf.push(actor.add(n)).await?;
            }
            Ok(())
        })
        .await?;

        assert_eq!(actor.invocations().await?, 1000);
        assert_eq!(actor.total().await?, 500_500);
        Ok::<_, Error>(())
    })
    .unwrap();
}
