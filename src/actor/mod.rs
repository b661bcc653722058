//! The virtual-actor type model.
//!
//! User state is modelled as *virtual actors*: addressable, on-demand
//! activated objects identified by a typed key. An actor type declares its
//! key type, kind, reentrancy and placement by implementing [`Actor`], and
//! declares its message handlers with the [`messages!`] macro, which
//! generates one zero-size [`Handler`] tag per method. Callers never touch
//! an activation directly; they obtain an [`ActorRef`] with [`get`] and
//! `tell` it messages.
//!
//! [`messages!`]: crate::messages

pub(crate) mod directory;
mod message;
mod reference;

use std::cell::RefCell;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub use self::message::MessageId;
pub use self::reference::{get, ActorRef};

use crate::internal::prelude::*;
use crate::runtime::ShardId;

/// An activation is identified within its type by the hash of its key.
///
/// The hash is computed with a deterministic, fixed-seed hasher so that
/// every shard — and, in a cluster, every node running the same build —
/// derives the same id for the same key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Hashes an actor key into its [`ActorId`].
#[must_use]
pub fn actor_id<K: Hash + ?Sized>(key: &K) -> ActorId {
    let mut hasher = fxhash::FxHasher::default();
    key.hash(&mut hasher);
    ActorId(hasher.finish())
}

/// The possible kinds of an actor type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActorKind {
    /// At most one activation per key across the process, pinned to the
    /// shard selected by the type's placement.
    Singleton,
    /// Activations of the same key may exist on several shards at once, up
    /// to [`Actor::MAX_ACTIVATIONS`]; references round-robin across them.
    Local,
}

/// A user-declared virtual actor type.
///
/// Implementors declare their configuration through the associated items;
/// everything has a default except the key type and the activation
/// constructor. Handlers are declared separately with the
/// [`messages!`](crate::messages) macro.
///
/// # Examples
///
/// ```rust,no_run
/// use lapis::{Actor, ActorKind};
///
/// struct Counter {
///     count: u64,
/// }
///
/// impl Actor for Counter {
///     type Key = u64;
///
///     fn activate(_key: &u64) -> Self {
///         Self { count: 0 }
///     }
/// }
/// ```
pub trait Actor: Sized + 'static {
    /// The value type identifying an activation within this actor type.
    type Key: Hash + Eq + Clone + Send + 'static;

    /// Whether the type is a process-wide singleton per key or a per-shard
    /// local actor.
    const KIND: ActorKind = ActorKind::Singleton;

    /// Non-reentrant actors serialize handler execution per activation: at
    /// most one handler of a given activation is in flight at any time.
    const REENTRANT: bool = true;

    /// For [`ActorKind::Local`] types, the upper bound on the number of
    /// shards carrying an activation of a given key.
    const MAX_ACTIVATIONS: usize = usize::MAX;

    /// Materializes the activation for `key`. Called on the owning shard
    /// the first time a message needs the activation.
    fn activate(key: &Self::Key) -> Self;

    /// Maps a hashed key to the owning shard. Must be deterministic, pure,
    /// and stable for the process lifetime.
    #[must_use]
    fn placement(id: ActorId, shards: u32) -> ShardId {
        ShardId((id.0 % u64::from(shards)) as u32)
    }

    /// Drops every activation of this type on every shard.
    ///
    /// Handlers already in flight keep their activation alive until they
    /// resolve; the activation is merely unlinked from the directory.
    fn clear_directory() -> impl Future<Output = ()> {
        directory::clear::<Self>()
    }
}

/// A zero-size tag naming one declared handler of an actor type.
///
/// Tags are generated by the [`messages!`](crate::messages) macro; the tag
/// type carries the handler's argument tuple and output type, so a
/// [`tell`](ActorRef::tell) with mismatched arguments fails to compile. The
/// [`ID`](Self::ID) is derived from the actor-qualified handler name and is
/// identical on every node running the same declaration.
pub trait Handler<A: Actor>: Copy + 'static {
    /// The handler's argument tuple.
    type Args: Send + 'static;
    /// The handler's logical output.
    type Output: Send + 'static;
    /// The normalized dispatch future.
    type Fut: Future<Output = Result<Self::Output>> + 'static;

    /// Stable wire identifier of this handler.
    const ID: MessageId;
    /// The actor-qualified handler name, for diagnostics.
    const NAME: &'static str;

    /// Runs the handler's synchronous body against the activation and
    /// returns the normalized future.
    ///
    /// The activation borrow is held only for the synchronous body, never
    /// across a suspension point; reentrancy policy is applied by the
    /// dispatcher to the returned future.
    fn invoke(state: &Rc<RefCell<A>>, args: Self::Args) -> Self::Fut;

    /// Dispatches this handler against a remote node.
    ///
    /// The default implementation fails: only handlers declared through
    /// `remote impl` blocks of the [`messages!`](crate::messages) macro are
    /// wire-capable.
    #[cfg(feature = "cluster")]
    fn remote(
        node: crate::cluster::NodeDesc,
        key: &A::Key,
        args: Self::Args,
    ) -> futures::future::LocalBoxFuture<'static, Result<Self::Output>> {
        let _ = (node, key, args);
        Box::pin(std::future::ready(Err(Error::Cluster(
            crate::cluster::ClusterError::NotRemoteCapable(Self::NAME),
        ))))
    }

    /// Dispatches a packed batch of this handler against a remote node.
    #[cfg(feature = "cluster")]
    fn remote_packed(
        node: crate::cluster::NodeDesc,
        key: &A::Key,
        batch: Vec<Self::Args>,
    ) -> futures::future::LocalBoxFuture<'static, Result<Vec<Self::Output>>> {
        let _ = (node, key, batch);
        Box::pin(std::future::ready(Err(Error::Cluster(
            crate::cluster::ClusterError::NotRemoteCapable(Self::NAME),
        ))))
    }
}
