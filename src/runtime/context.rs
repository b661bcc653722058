//! The thread-local state owned by a single shard.
//!
//! Everything in here is reached only from the shard's own thread; the
//! borrow discipline is to clone what is needed out of the context and
//! release it before running any user code.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use super::{ShardId, TaskSender};

pub(crate) struct ShardContext {
    pub shard: ShardId,
    pub shards: u32,
    pub senders: Arc<Vec<TaskSender>>,
    /// Per-type singletons owned by this shard, keyed by their concrete
    /// type: activation directories live here.
    slots: HashMap<TypeId, Rc<dyn Any>>,
    /// Per-type round-robin counters used when constructing references to
    /// `Local`-kind actors.
    counters: HashMap<TypeId, usize>,
    /// This shard's replica of the cluster state, when a cluster has been
    /// started.
    #[cfg(feature = "cluster")]
    pub cluster: Option<Rc<RefCell<crate::cluster::ShardClusterState>>>,
}

impl ShardContext {
    fn new(shard: ShardId, shards: u32, senders: Arc<Vec<TaskSender>>) -> Self {
        Self {
            shard,
            shards,
            senders,
            slots: HashMap::new(),
            counters: HashMap::new(),
            #[cfg(feature = "cluster")]
            cluster: None,
        }
    }

    /// Returns the shard-local singleton of type `T`, creating it on first
    /// use.
    pub fn slot<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        let any = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Rc::new(init()) as Rc<dyn Any>);
        Rc::clone(any).downcast::<T>().unwrap_or_else(|_| panic!("shard slot type confusion"))
    }

    /// Advances the round-robin counter for `type_id` and returns the shard
    /// the next reference should target, seeded by the current shard so
    /// distinct callers start offset from each other.
    pub fn round_robin_next(&mut self, type_id: TypeId, modulus: usize) -> ShardId {
        let counter = self.counters.entry(type_id).or_insert(0);
        let next = (*counter + self.shard.0 as usize) % modulus;
        *counter = counter.wrapping_add(1);
        ShardId(next as u32)
    }
}

thread_local! {
    static CONTEXT: RefCell<Option<ShardContext>> = const { RefCell::new(None) };
}

/// Enters the runtime on the current thread, returning a guard that leaves
/// it again on drop.
pub(crate) fn install(shard: ShardId, shards: u32, senders: Arc<Vec<TaskSender>>) -> ContextGuard {
    CONTEXT.with(|cx| {
        let mut cx = cx.borrow_mut();
        assert!(cx.is_none(), "this thread is already running inside a lapis runtime");
        *cx = Some(ShardContext::new(shard, shards, senders));
    });
    ContextGuard {
        _priv: (),
    }
}

pub(crate) struct ContextGuard {
    _priv: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT.with(|cx| cx.borrow_mut().take());
    }
}

/// Runs `f` with the current shard's context.
///
/// # Panics
///
/// Panics when the calling thread is not a shard. `f` must not re-enter
/// `with` and must not run user code while the context is borrowed.
pub(crate) fn with<R>(f: impl FnOnce(&mut ShardContext) -> R) -> R {
    CONTEXT.with(|cx| {
        let mut cx = cx.borrow_mut();
        let cx = cx
            .as_mut()
            .expect("not running on a lapis shard; enter the runtime via Runtime::block_on");
        f(cx)
    })
}
