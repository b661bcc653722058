//! The shard engine itself: identity, submission ordering, and fan-out.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

use lapis::prelude::*;

fn runtime(shards: u32) -> Runtime {
    Runtime::new(RuntimeOptions {
        shards,
    })
}

#[test]
fn the_main_future_runs_on_shard_zero() {
    runtime(3).block_on(|| async {
        assert_eq!(current_shard(), ShardId(0));
        assert_eq!(shard_count(), 3);
    });
}

#[test]
fn submissions_run_on_their_target_shard() {
    runtime(4).block_on(|| async {
        for shard in 0..4 {
            let observed = submit_to(ShardId(shard), || async { current_shard() }).await;
            assert_eq!(observed, ShardId(shard));
        }
    });
}

#[test]
fn submissions_from_one_shard_stay_ordered() {
    thread_local! {
        static SEEN: Cell<u64> = const { Cell::new(0) };
    }

    runtime(2).block_on(|| async {
        // Each submission's synchronous part asserts it is observed in
        // submission order on the target shard.
        let submissions: Vec<_> = (0..1000u64)
            .map(|n| {
                submit_to(ShardId(1), move || {
                    SEEN.with(|seen| {
                        assert_eq!(seen.get(), n, "submission ran out of order");
                        seen.set(n + 1);
                    });
                    std::future::ready(())
                })
            })
            .collect();
        futures::future::join_all(submissions).await;

        let total = submit_to(ShardId(1), || std::future::ready(SEEN.with(Cell::get))).await;
        assert_eq!(total, 1000);
    });
}

#[test]
fn invoke_on_all_reaches_every_shard() {
    static TOUCHED: AtomicU32 = AtomicU32::new(0);

    runtime(4).block_on(|| async {
        invoke_on_all(|| async {
            TOUCHED.fetch_add(1 << current_shard().0, Ordering::SeqCst);
        })
        .await;
    });

    assert_eq!(TOUCHED.load(Ordering::SeqCst), 0b1111);
}

#[test]
fn block_on_returns_the_main_future_output() {
    let out = runtime(1).block_on(|| async { 6 * 7 });
    assert_eq!(out, 42);
}
