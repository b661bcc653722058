//! Clustering: peer membership, the consistent hash ring, and wire
//! dispatch of `tell` across the network.
//!
//! A cluster is a set of peer nodes discovered transitively through
//! handshakes — there is no periodic gossip and no consensus; the
//! membership view is eventually consistent. Placement across nodes uses a
//! consistent hash ring, so divergent views at worst mis-route a message
//! transiently: a node services any `tell` it receives regardless of its
//! own view, and never forwards.
//!
//! The entry point is [`with_cluster`], which scopes a node's cluster
//! presence around a body future:
//!
//! ```rust,no_run
//! # async fn run() -> lapis::Result<()> {
//! use lapis::cluster::{with_cluster, NodeDesc};
//!
//! let local: NodeDesc = "127.0.0.1:4000".parse().unwrap();
//! let seeds = vec!["127.0.0.1:4001".parse().unwrap()];
//! with_cluster(local, seeds, 1, || async {
//!     // `get` now consults the ring; remote activations are reached
//!     // over the wire.
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod events;
mod handshake;
mod membership;
mod node;
#[doc(hidden)]
pub mod registry;
mod ring;
mod rpc;
mod wire;

use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::membership::NodeState;
pub(crate) use self::membership::ShardClusterState;
pub use self::node::NodeDesc;
pub use self::ring::HashRing;

use self::rpc::PeerClient;
use crate::actor::{Actor, ActorId, Handler};
use crate::internal::prelude::*;
use crate::runtime::{context, current_shard, ShardId};

/// An error from the cluster module.
#[derive(Debug)]
#[non_exhaustive]
pub enum ClusterError {
    /// A message for a remote activation used a handler that was not
    /// declared in a `remote impl` block.
    NotRemoteCapable(&'static str),
    /// The owning node is known but this shard has no client for it.
    NoRoute(NodeDesc),
    /// The connection to a peer went away with calls outstanding.
    Disconnected(NodeDesc),
    /// A seed stayed unreachable through every backoff attempt.
    Handshake {
        peer: NodeDesc,
        attempts: u32,
    },
    /// Fewer peers than required were admitted during a join.
    Join {
        wanted: usize,
        connected: usize,
    },
    /// A wire payload failed to decode.
    Codec(&'static str),
}

impl std::fmt::Display for ClusterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRemoteCapable(name) => {
                write!(f, "handler {name} is not declared for remote dispatch")
            },
            Self::NoRoute(node) => write!(f, "no client connected to {node} on this shard"),
            Self::Disconnected(node) => write!(f, "connection to {node} closed"),
            Self::Handshake {
                peer,
                attempts,
            } => write!(f, "handshake with {peer} failed after {attempts} attempts"),
            Self::Join {
                wanted,
                connected,
            } => write!(f, "joined {connected} peers where at least {wanted} were required"),
            Self::Codec(what) => write!(f, "malformed wire payload: {what}"),
        }
    }
}

impl std::error::Error for ClusterError {}

/// Runs `body` with this process joined to a cluster.
///
/// Starts the membership service on `local` (the server socket is bound
/// and wire handlers are serving before any outbound handshake), dials the
/// seeds, and fails with [`ClusterError::Join`] if fewer than `min_peers`
/// peers could be admitted. The cluster presence is torn down when the body
/// future resolves, whatever its outcome.
///
/// Wire trampolines (the `register()` functions generated by `remote impl`
/// blocks of [`messages!`](crate::messages)) must be registered before
/// calling this.
///
/// # Panics
///
/// Panics when called from a shard other than shard 0.
pub async fn with_cluster<F, Fut, T>(
    local: NodeDesc,
    seeds: Vec<NodeDesc>,
    min_peers: usize,
    body: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    assert_eq!(current_shard(), ShardId(0), "with_cluster must run on shard 0");

    let controller = membership::start(local).await?;
    if let Err(why) = membership::join(&controller, &seeds, min_peers).await {
        membership::stop(controller).await;
        return Err(why);
    }

    let output = body().await;
    membership::stop(controller).await;
    output
}

/// The local node's descriptor, when a cluster is running.
#[must_use]
pub fn local_node() -> Option<NodeDesc> {
    context::with(|cx| cx.cluster.as_ref().map(|state| state.borrow().local))
}

/// The local node's lifecycle state, when a cluster is running.
#[must_use]
pub fn node_state() -> Option<NodeState> {
    context::with(|cx| cx.cluster.as_ref().map(|state| state.borrow().state))
}

/// This shard's view of the ring: every node currently owning a slice of
/// the key space, the local node included.
#[must_use]
pub fn members() -> Vec<NodeDesc> {
    context::with(|cx| {
        cx.cluster
            .as_ref()
            .map(|state| state.borrow().ring.nodes().copied().collect())
            .unwrap_or_default()
    })
}

/// Ring lookup on the `get` path: the owning peer of `id`, or `None` when
/// the activation is local to this process (or no cluster is running).
pub(crate) fn route_to_peer(id: ActorId) -> Option<NodeDesc> {
    context::with(|cx| {
        let state = cx.cluster.as_ref()?.borrow();
        let owner = state.ring.lookup(id)?;
        (owner != state.local).then_some(owner)
    })
}

fn client_for(node: NodeDesc) -> Result<Rc<PeerClient>> {
    context::with(|cx| {
        let Some(state) = cx.cluster.as_ref() else {
            return Err(ClusterError::NoRoute(node).into());
        };
        state
            .borrow()
            .peers
            .get(&node)
            .cloned()
            .ok_or_else(|| ClusterError::NoRoute(node).into())
    })
}

/// Client side of a remote `tell`: marshal `(key, args)` and invoke the
/// handler's wire id on the owning node.
pub fn remote_call<A, H>(
    node: NodeDesc,
    key: &A::Key,
    args: H::Args,
) -> LocalBoxFuture<'static, Result<H::Output>>
where
    A: Actor,
    H: Handler<A>,
    A::Key: Serialize,
    H::Args: Serialize,
    H::Output: DeserializeOwned,
{
    let payload = serde_json::to_vec(&(key, &args));
    Box::pin(async move {
        let reply = client_for(node)?.call(H::ID.get(), payload?).await?;
        Ok(serde_json::from_slice(&reply)?)
    })
}

/// Client side of a coalesced remote batch, dispatched under the packed
/// companion id.
pub fn remote_call_packed<A, H>(
    node: NodeDesc,
    key: &A::Key,
    batch: Vec<H::Args>,
) -> LocalBoxFuture<'static, Result<Vec<H::Output>>>
where
    A: Actor,
    H: Handler<A>,
    A::Key: Serialize,
    H::Args: Serialize,
    H::Output: DeserializeOwned,
{
    let payload = serde_json::to_vec(&(key, &batch));
    Box::pin(async move {
        let reply = client_for(node)?.call(H::ID.packed().get(), payload?).await?;
        Ok(serde_json::from_slice(&reply)?)
    })
}
