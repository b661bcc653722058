//! Key types, key hashing, placement overrides, and singleton uniqueness.

use std::sync::atomic::{AtomicUsize, Ordering};

use lapis::prelude::*;

struct NamedActor {
    name: String,
}

impl Actor for NamedActor {
    type Key = String;

    fn activate(key: &String) -> Self {
        Self {
            name: key.clone(),
        }
    }
}

impl NamedActor {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execution_shard(&self) -> u32 {
        current_shard().0
    }
}

messages! {
    impl NamedActor as pub mod named {
        fn name(&self) -> String;
        fn execution_shard(&self) -> u32;
    }
}

/// Counts its own activations; used only by the uniqueness test so the
/// count cannot be polluted by tests running in parallel.
static TRACKED_ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

struct TrackedActor;

impl Actor for TrackedActor {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        TRACKED_ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl TrackedActor {
    fn execution_shard(&self) -> u32 {
        current_shard().0
    }
}

messages! {
    impl TrackedActor as pub mod tracked {
        fn execution_shard(&self) -> u32;
    }
}

/// Everything lands on shard 0, whatever the key hashes to.
struct PinnedActor;

impl Actor for PinnedActor {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        Self
    }

    fn placement(_id: ActorId, _shards: u32) -> ShardId {
        ShardId(0)
    }
}

impl PinnedActor {
    fn execution_shard(&self) -> u32 {
        current_shard().0
    }
}

messages! {
    impl PinnedActor as pub mod pinned {
        fn execution_shard(&self) -> u32;
    }
}

const SHARDS: u32 = 4;

fn runtime() -> Runtime {
    Runtime::new(RuntimeOptions {
        shards: SHARDS,
    })
}

#[test]
fn string_keys_identify_activations() {
    runtime().block_on(|| async {
        use named::Tell as _;

        let alice = lapis::get::<NamedActor>("alice".to_owned());
        let bob = lapis::get::<NamedActor>("bob".to_owned());
        assert_ne!(alice.id(), bob.id());

        assert_eq!(alice.name().await?, "alice");
        assert_eq!(bob.name().await?, "bob");
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// Hashing a key is deterministic: the same key always names the same
/// activation id, on any shard.
#[test]
fn key_hashing_is_deterministic() {
    let direct = actor_id(&"carol".to_owned());
    runtime().block_on(|| async {
        let re = lapis::get::<NamedActor>("carol".to_owned());
        assert_eq!(re.id(), direct);

        let from_elsewhere =
            submit_to(ShardId(1), || async { lapis::get::<NamedActor>("carol".to_owned()).id() })
                .await;
        assert_eq!(from_elsewhere, direct);
    });
}

/// A singleton key has exactly one activation, on its placement shard,
/// no matter how many shards send to it.
#[test]
fn singleton_activation_is_unique() {
    runtime().block_on(|| async {
        use tracked::Tell as _;

        let key = 77u64;
        let actor = lapis::get::<TrackedActor>(key);
        // Obtaining (and copying) a reference materializes nothing.
        let _copy = actor;
        assert_eq!(TRACKED_ACTIVATIONS.load(Ordering::SeqCst), 0);

        let home = actor.execution_shard().await?;

        let mut observed = Vec::new();
        for shard in 0..SHARDS {
            let seen = submit_to(ShardId(shard), move || async move {
                lapis::get::<TrackedActor>(key).execution_shard().await
            })
            .await?;
            observed.push(seen);
        }
        assert!(observed.iter().all(|shard| *shard == home));
        assert_eq!(TRACKED_ACTIVATIONS.load(Ordering::SeqCst), 1);
        Ok::<_, Error>(())
    })
    .unwrap();
}

#[test]
fn placement_strategy_override_is_honored() {
    runtime().block_on(|| async {
        use pinned::Tell as _;

        for key in 0..32 {
            let shard = lapis::get::<PinnedActor>(key).execution_shard().await?;
            assert_eq!(shard, 0);
        }
        Ok::<_, Error>(())
    })
    .unwrap();
}
