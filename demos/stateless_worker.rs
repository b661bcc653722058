//! A `Local`-kind worker pool: one key, activations bounded to a few
//! shards, references round-robining work across them.
//!
//!     cargo run --example stateless_worker

use std::collections::BTreeMap;

use lapis::prelude::*;

struct Worker;

impl Actor for Worker {
    type Key = u64;
    const KIND: ActorKind = ActorKind::Local;
    const MAX_ACTIVATIONS: usize = 4;

    fn activate(_key: &u64) -> Self {
        Self
    }
}

impl Worker {
    /// A stand-in for CPU work: sums a small range and reports the shard
    /// that did it.
    fn simulate(&self, n: u64) -> (u32, u64) {
        let result = (0..n).fold(0u64, |acc, i| acc.wrapping_add(i * i));
        (current_shard().0, result)
    }
}

messages! {
    impl Worker as pub mod worker {
        fn simulate(&self, n: u64) -> (u32, u64);
    }
}

fn main() -> lapis::Result<()> {
    tracing_subscriber::fmt::init();

    Runtime::new(RuntimeOptions::default()).block_on(|| async {
        use worker::Tell as _;

        let pool = lapis::get::<Worker>(0);
        let jobs: Vec<_> = (0..64).map(|_| pool.simulate(100_000)).collect();
        let outcomes = futures::future::try_join_all(jobs).await?;

        let mut per_shard = BTreeMap::new();
        for (shard, _) in &outcomes {
            *per_shard.entry(*shard).or_insert(0u32) += 1;
        }
        for (shard, jobs) in per_shard {
            println!("shard {shard}: {jobs} jobs");
        }
        Ok(())
    })
}
