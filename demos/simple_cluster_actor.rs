//! A clustered counter: start a few of these on one machine and watch keys
//! spread across the nodes.
//!
//!     cargo run --example simple_cluster_actor --features cluster -- 127.0.0.1:4000
//!     cargo run --example simple_cluster_actor --features cluster -- 127.0.0.1:4001 127.0.0.1:4000
//!
//! The first argument is the local endpoint; any further arguments are
//! seed nodes to join through.

use std::time::Duration;

use lapis::cluster::{with_cluster, NodeDesc};
use lapis::prelude::*;

struct Counter {
    count: u64,
}

impl Actor for Counter {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        Self {
            count: 0,
        }
    }
}

impl Counter {
    fn add(&mut self, n: u64) -> u64 {
        self.count += n;
        self.count
    }

    fn home(&self) -> String {
        lapis::cluster::local_node().map_or_else(|| "unclustered".to_owned(), |n| n.to_string())
    }
}

messages! {
    remote impl Counter as pub mod counter {
        fn add(&mut self, n: u64) -> u64;
        fn home(&self) -> String;
    }
}

fn main() -> lapis::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let local: NodeDesc = args
        .next()
        .expect("usage: simple_cluster_actor <local addr> [seed...]")
        .parse()
        .expect("local address must be ipv4:port");
    let seeds: Vec<NodeDesc> = args.map(|s| s.parse().expect("seeds must be ipv4:port")).collect();
    let min_peers = usize::from(!seeds.is_empty());

    counter::register();

    Runtime::new(RuntimeOptions::default()).block_on(|| async move {
        with_cluster(local, seeds, min_peers, || async {
            use counter::Tell as _;

            for round in 1..=10u64 {
                for key in 0..8u64 {
                    let counter = lapis::get::<Counter>(key);
                    let total = counter.add(1).await?;
                    let home = counter.home().await?;
                    println!("key {key} -> {home} (count {total})");
                }
                println!("--- round {round} done; members: {:?}", lapis::cluster::members());
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Ok(())
        })
        .await
    })
}
