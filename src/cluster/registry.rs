//! The process-global wire handler registry.
//!
//! Every remote-capable handler registers two trampolines at program
//! start, keyed by its [`MessageId`](crate::MessageId): one decoding a
//! single `(key, args)`
//! dispatch, and a packed-batch companion under `id | 0x1` decoding
//! `(key, Vec<args>)`. Registration is idempotent and must complete before
//! the cluster is started; servers look trampolines up when frames arrive.
//!
//! A trampoline dispatches strictly within the local process: a node
//! services any `tell` it receives, whatever its own ring view says, and
//! never forwards.

use std::collections::HashMap;

use futures::future::LocalBoxFuture;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::actor::{Actor, ActorRef, Handler};
use crate::internal::prelude::*;

type Trampoline = fn(Vec<u8>) -> LocalBoxFuture<'static, Result<Vec<u8>>>;

static REGISTRY: RwLock<Option<HashMap<u32, Trampoline>>> = RwLock::new(None);

/// Registers the trampolines for one handler. Idempotent.
pub fn register<A, H>()
where
    A: Actor,
    H: Handler<A>,
    A::Key: Serialize + DeserializeOwned,
    H::Args: Serialize + DeserializeOwned,
    H::Output: Serialize + DeserializeOwned,
{
    let mut registry = REGISTRY.write();
    let registry = registry.get_or_insert_with(HashMap::new);
    registry.entry(H::ID.get()).or_insert(unary::<A, H>);
    registry.entry(H::ID.packed().get()).or_insert(packed::<A, H>);
}

/// Looks up the trampoline for a wire handler id.
pub(crate) fn lookup(id: u32) -> Option<Trampoline> {
    REGISTRY.read().as_ref()?.get(&id).copied()
}

pub(crate) fn registered_count() -> usize {
    REGISTRY.read().as_ref().map_or(0, HashMap::len)
}

fn unary<A, H>(payload: Vec<u8>) -> LocalBoxFuture<'static, Result<Vec<u8>>>
where
    A: Actor,
    H: Handler<A>,
    A::Key: Serialize + DeserializeOwned,
    H::Args: Serialize + DeserializeOwned,
    H::Output: Serialize + DeserializeOwned,
{
    Box::pin(async move {
        let (key, args): (A::Key, H::Args) = serde_json::from_slice(&payload)?;
        let output = ActorRef::<A>::local_to_process(key).send::<H>(args).await?;
        Ok(serde_json::to_vec(&output)?)
    })
}

fn packed<A, H>(payload: Vec<u8>) -> LocalBoxFuture<'static, Result<Vec<u8>>>
where
    A: Actor,
    H: Handler<A>,
    A::Key: Serialize + DeserializeOwned,
    H::Args: Serialize + DeserializeOwned,
    H::Output: Serialize + DeserializeOwned,
{
    Box::pin(async move {
        let (key, batch): (A::Key, Vec<H::Args>) = serde_json::from_slice(&payload)?;
        let outputs = ActorRef::<A>::local_to_process(key).send_packed::<H>(batch).await?;
        Ok(serde_json::to_vec(&outputs)?)
    })
}
