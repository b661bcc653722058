//! Actor references and the message dispatch path.
//!
//! An [`ActorRef`] is a small, copyable value naming one activation. It is
//! cheap to construct — obtaining a reference never materializes the
//! activation — and is valid on any shard: the routing variant is
//! re-derived from the current shard whenever the reference is used, so a
//! reference can freely travel inside cross-shard closures.

use std::any::TypeId;
use std::future::Future;

use futures::future::Either;

use super::directory;
use super::{actor_id, Actor, ActorId, ActorKind, Handler};
use crate::internal::prelude::*;
use crate::runtime::{context, current_shard, shard_count, submit_to, ShardId};

#[cfg(feature = "cluster")]
use crate::cluster::NodeDesc;

/// Where a reference points.
///
/// `Shard` pins singleton activations to their placement shard;
/// `RoundRobin` is the `Local`-kind form, which re-picks a shard on every
/// dispatch; `Node` carries the resolved peer for activations owned by
/// another node.
#[derive(Clone, Copy, Debug)]
enum Route {
    Shard(ShardId),
    RoundRobin,
    #[cfg(feature = "cluster")]
    Node(NodeDesc),
}

/// The routing decision for a single dispatch.
enum Target {
    Local,
    Shard(ShardId),
    #[cfg(feature = "cluster")]
    Node(NodeDesc),
}

/// A reference to a virtual actor.
///
/// References are obtained with [`get`] and carry the key, its precomputed
/// [`ActorId`] and a routing discriminant. They are cheap to clone (and
/// `Copy` when the key is), cheap to send across shards, and never hold the
/// activation itself.
pub struct ActorRef<A: Actor> {
    key: A::Key,
    id: ActorId,
    route: Route,
}

/// Obtains a reference to the activation of `A` identified by `key`.
///
/// The activation is *not* created by this call; it is materialized on its
/// owning shard by the first message that needs it.
///
/// # Panics
///
/// Panics when called from outside a runtime.
#[must_use]
pub fn get<A: Actor>(key: A::Key) -> ActorRef<A> {
    let id = actor_id(&key);

    ActorRef {
        route: resolve::<A>(id),
        key,
        id,
    }
}

fn resolve<A: Actor>(id: ActorId) -> Route {
    #[cfg(feature = "cluster")]
    if let Some(node) = crate::cluster::route_to_peer(id) {
        return Route::Node(node);
    }

    resolve_in_process::<A>(id)
}

fn resolve_in_process<A: Actor>(id: ActorId) -> Route {
    match A::KIND {
        ActorKind::Local => Route::RoundRobin,
        ActorKind::Singleton => Route::Shard(A::placement(id, shard_count())),
    }
}

/// Picks the next shard for a `Local`-kind reference.
///
/// The modulus is `min(shard_count, MAX_ACTIVATIONS)`, so activations only
/// ever live on the first shards of that range; the per-shard counter is
/// offset by the caller's shard id so distinct callers spread their load.
fn round_robin<A: Actor>() -> ShardId {
    let modulus = (shard_count() as usize).min(A::MAX_ACTIVATIONS).max(1);
    context::with(|cx| cx.round_robin_next(TypeId::of::<A>(), modulus))
}

impl<A: Actor> ActorRef<A> {
    /// Builds a reference that is resolved within the local process only,
    /// bypassing the cluster ring. Incoming wire dispatches use this: a
    /// node services any message it receives regardless of its own ring
    /// view, and never forwards.
    #[cfg(feature = "cluster")]
    pub(crate) fn local_to_process(key: A::Key) -> Self {
        let id = actor_id(&key);

        Self {
            route: resolve_in_process::<A>(id),
            key,
            id,
        }
    }

    /// The key this reference was constructed from.
    #[must_use]
    pub fn key(&self) -> &A::Key {
        &self.key
    }

    /// The hashed activation id.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Sends a message to the activation, returning a future of the
    /// handler's result.
    ///
    /// The tag names the handler and statically checks `args` against the
    /// handler's signature. Dispatch is at-most-once: the returned future
    /// resolves exactly once with the handler's success or failure, and the
    /// runtime never retries. Dropping the future discards the result but
    /// does not cancel a handler already in flight.
    ///
    /// On the local path the handler's synchronous body has already run
    /// when this returns; collocated dispatch moves the arguments into a
    /// closure submitted to the owning shard, and remote dispatch marshals
    /// `(key, args)` over the wire.
    pub fn tell<H: Handler<A>>(
        &self,
        tag: H,
        args: H::Args,
    ) -> impl Future<Output = Result<H::Output>> + 'static {
        let _ = tag;
        self.send::<H>(args)
    }

    /// Sends a coalesced batch to the activation as a single cross-shard
    /// (or cross-node) task. The handler runs once per element, in order;
    /// results come back in the same order.
    pub fn tell_packed<H: Handler<A>>(
        &self,
        tag: H,
        batch: Vec<H::Args>,
    ) -> impl Future<Output = Result<Vec<H::Output>>> + 'static {
        let _ = tag;
        self.send_packed::<H>(batch)
    }

    fn target(&self) -> Target {
        match self.route {
            #[cfg(feature = "cluster")]
            Route::Node(node) => Target::Node(node),
            Route::Shard(shard) if shard == current_shard() => Target::Local,
            Route::Shard(shard) => Target::Shard(shard),
            Route::RoundRobin => {
                let shard = round_robin::<A>();
                if shard == current_shard() {
                    Target::Local
                } else {
                    Target::Shard(shard)
                }
            },
        }
    }

    #[cfg(not(feature = "cluster"))]
    pub(crate) fn send<H: Handler<A>>(
        &self,
        args: H::Args,
    ) -> impl Future<Output = Result<H::Output>> + 'static {
        match self.target() {
            Target::Local => Either::Left(directory::dispatch_local::<A, H>(&self.key, self.id, args)),
            Target::Shard(shard) => {
                let key = self.key.clone();
                let id = self.id;
                Either::Right(submit_to(shard, move || {
                    directory::dispatch_local::<A, H>(&key, id, args)
                }))
            },
        }
    }

    #[cfg(feature = "cluster")]
    pub(crate) fn send<H: Handler<A>>(
        &self,
        args: H::Args,
    ) -> impl Future<Output = Result<H::Output>> + 'static {
        match self.target() {
            Target::Local => {
                Either::Left(directory::dispatch_local::<A, H>(&self.key, self.id, args))
            },
            Target::Shard(shard) => {
                let key = self.key.clone();
                let id = self.id;
                Either::Right(Either::Left(submit_to(shard, move || {
                    directory::dispatch_local::<A, H>(&key, id, args)
                })))
            },
            Target::Node(node) => Either::Right(Either::Right(H::remote(node, &self.key, args))),
        }
    }

    #[cfg(not(feature = "cluster"))]
    pub(crate) fn send_packed<H: Handler<A>>(
        &self,
        batch: Vec<H::Args>,
    ) -> impl Future<Output = Result<Vec<H::Output>>> + 'static {
        let key = self.key.clone();
        let id = self.id;
        match self.target() {
            Target::Local => Either::Left(directory::dispatch_packed::<A, H>(key, id, batch)),
            Target::Shard(shard) => Either::Right(submit_to(shard, move || {
                directory::dispatch_packed::<A, H>(key, id, batch)
            })),
        }
    }

    #[cfg(feature = "cluster")]
    pub(crate) fn send_packed<H: Handler<A>>(
        &self,
        batch: Vec<H::Args>,
    ) -> impl Future<Output = Result<Vec<H::Output>>> + 'static {
        let key = self.key.clone();
        let id = self.id;
        match self.target() {
            Target::Local => Either::Left(directory::dispatch_packed::<A, H>(key, id, batch)),
            Target::Shard(shard) => Either::Right(Either::Left(submit_to(shard, move || {
                directory::dispatch_packed::<A, H>(key, id, batch)
            }))),
            Target::Node(node) => {
                Either::Right(Either::Right(H::remote_packed(node, &self.key, batch)))
            },
        }
    }
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            id: self.id,
            route: self.route,
        }
    }
}

impl<A: Actor> Copy for ActorRef<A> where A::Key: Copy {}

impl<A: Actor> std::fmt::Debug for ActorRef<A>
where
    A::Key: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("route", &self.route)
            .finish()
    }
}
