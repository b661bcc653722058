//! Message passing against a single activation: same-core and cross-core
//! dispatch, move-only payloads, ordering, and reference semantics.

use lapis::prelude::*;

/// A payload that can only be moved, never copied or cloned. Local and
/// collocated dispatch must pass it through without marshalling.
#[derive(Debug, Default)]
struct NoCopyMessage {
    hops: u32,
}

struct CounterActor {
    key: u64,
    counter: u64,
    seen: Vec<u64>,
}

impl Actor for CounterActor {
    type Key = u64;

    fn activate(key: &u64) -> Self {
        Self {
            key: *key,
            counter: 0,
            seen: Vec::new(),
        }
    }
}

impl CounterActor {
    fn increase_counter(&mut self) {
        self.counter += 1;
    }

    fn get_counter(&self) -> u64 {
        self.counter
    }

    fn get_key(&self) -> u64 {
        self.key
    }

    fn get_execution_shard(&self) -> u32 {
        current_shard().0
    }

    fn observe(&mut self, n: u64) {
        self.seen.push(n);
    }

    fn observed(&self) -> Vec<u64> {
        self.seen.clone()
    }

    fn move_arg_message(&mut self, arg: NoCopyMessage) -> u32 {
        arg.hops
    }

    fn move_return_value_message(&self) -> NoCopyMessage {
        NoCopyMessage {
            hops: 1,
        }
    }
}

messages! {
    impl CounterActor as pub mod counter {
        fn increase_counter(&mut self);
        fn get_counter(&self) -> u64;
        fn get_key(&self) -> u64;
        fn get_execution_shard(&self) -> u32;
        fn observe(&mut self, n: u64);
        fn observed(&self) -> Vec<u64>;
        fn move_arg_message(&mut self, arg: NoCopyMessage) -> u32;
        fn move_return_value_message(&self) -> NoCopyMessage;
    }
}

const SHARDS: u32 = 4;

fn runtime() -> Runtime {
    Runtime::new(RuntimeOptions {
        shards: SHARDS,
    })
}

/// A key whose singleton activation lives on the given shard.
fn key_on_shard(shard: u32) -> u64 {
    (0..).find(|k| actor_id(k).0 % u64::from(SHARDS) == u64::from(shard)).unwrap()
}

#[test]
fn placement_pins_the_activation() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let local = lapis::get::<CounterActor>(key_on_shard(0));
        assert_eq!(local.get_execution_shard().await?, 0);

        let collocated = lapis::get::<CounterActor>(key_on_shard(2));
        assert_eq!(collocated.get_execution_shard().await?, 2);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn same_core_mutating_message_passing() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let actor = lapis::get::<CounterActor>(key_on_shard(0));
        let initial = actor.get_counter().await?;
        actor.increase_counter().await?;
        assert_eq!(actor.get_counter().await?, initial + 1);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn collocated_mutating_message_passing() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let actor = lapis::get::<CounterActor>(key_on_shard(3));
        let initial = actor.get_counter().await?;
        actor.increase_counter().await?;
        assert_eq!(actor.get_counter().await?, initial + 1);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn same_core_nocopy_messages() {
    runtime().block_on(|| async {
        let actor = lapis::get::<CounterActor>(key_on_shard(0));
        let hops = actor
            .tell(counter::move_arg_message, (NoCopyMessage { hops: 7 },))
            .await?;
        assert_eq!(hops, 7);

        let back = actor.tell(counter::move_return_value_message, ()).await?;
        assert_eq!(back.hops, 1);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn collocated_nocopy_messages() {
    runtime().block_on(|| async {
        let actor = lapis::get::<CounterActor>(key_on_shard(1));
        let hops = actor
            .tell(counter::move_arg_message, (NoCopyMessage { hops: 3 },))
            .await?;
        assert_eq!(hops, 3);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// The key round-trips through the activation unchanged.
#[test]
fn key_round_trip() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        for key in [0u64, 1, 42, u64::MAX] {
            assert_eq!(lapis::get::<CounterActor>(key).get_key().await?, key);
        }
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// References are plain values: copying one neither contacts the runtime
/// nor materializes the activation; both copies name the same activation.
#[test]
fn references_are_cheap_values() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let one = lapis::get::<CounterActor>(key_on_shard(1));
        let two = one;
        let three = one;
        assert_eq!(one.id(), two.id());

        two.increase_counter().await?;
        three.increase_counter().await?;
        assert_eq!(one.get_counter().await?, 2);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// Program-order tells from one shard to one activation on another shard
/// are observed in the same order.
#[test]
fn fifo_per_shard_pair() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let actor = lapis::get::<CounterActor>(key_on_shard(2));
        let sends: Vec<_> = (0..500).map(|n| actor.observe(n)).collect();
        for send in sends {
            send.await?;
        }

        let seen = actor.observed().await?;
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// A reference constructed on one shard stays valid when its future runs on
/// another: the routing variant is re-derived at dispatch time.
#[test]
fn references_travel_across_shards() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let key = key_on_shard(2);
        let actor = lapis::get::<CounterActor>(key);
        let shard_seen = submit_to(ShardId(2), move || async move {
            // On shard 2 the same reference now takes the local path.
            lapis::get::<CounterActor>(key).get_execution_shard().await
        })
        .await?;
        assert_eq!(shard_seen, 2);
        assert_eq!(actor.get_execution_shard().await?, 2);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn clear_directory_resets_state() {
    runtime().block_on(|| async {
        use counter::Tell as _;

        let actor = lapis::get::<CounterActor>(key_on_shard(1));
        actor.increase_counter().await?;
        assert_eq!(actor.get_counter().await?, 1);

        CounterActor::clear_directory().await;

        // The next message re-materializes a fresh activation.
        assert_eq!(actor.get_counter().await?, 0);
        Ok::<_, Error>(())
    })
    .unwrap();
}
