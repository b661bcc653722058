//! The per-shard activation directory.
//!
//! Each shard owns, per actor type, a map from [`ActorId`] to the live
//! activation. Activations are materialized lazily by [`hold`] and exist
//! until the directory is explicitly cleared; message traffic never
//! destroys one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::Either;
use tokio::sync::Semaphore;

use super::{Actor, ActorId, Handler};
use crate::constants::REENTRANCY_TIMEOUT;
use crate::internal::prelude::*;
use crate::runtime::{context, invoke_on_all};

/// A live instance of an actor on its owning shard.
///
/// Cloning an activation clones handles, not state: in-flight handlers keep
/// the state alive even if the directory entry is cleared underneath them.
pub(crate) struct Activation<A> {
    state: Rc<RefCell<A>>,
    /// Present only for non-reentrant actor types.
    semaphore: Option<Arc<Semaphore>>,
}

impl<A: Actor> Activation<A> {
    fn new(state: A) -> Self {
        let semaphore = (!A::REENTRANT).then(|| Arc::new(Semaphore::new(1)));

        Self {
            state: Rc::new(RefCell::new(state)),
            semaphore,
        }
    }
}

impl<A> Clone for Activation<A> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            semaphore: self.semaphore.clone(),
        }
    }
}

/// The per-shard, per-type activation map. Lives in the shard context and
/// is only ever touched by its owning shard.
pub(crate) struct Directory<A: Actor> {
    map: RefCell<HashMap<ActorId, Activation<A>>>,
}

impl<A: Actor> Default for Directory<A> {
    fn default() -> Self {
        Self {
            map: RefCell::new(HashMap::new()),
        }
    }
}

/// Returns the activation for `key`, materializing it if absent.
///
/// Must run on the owning shard; the routing layer guarantees this.
pub(crate) fn hold<A: Actor>(key: &A::Key, id: ActorId) -> Activation<A> {
    let dir = context::with(|cx| cx.slot(Directory::<A>::default));

    if let Some(activation) = dir.map.borrow().get(&id) {
        return activation.clone();
    }

    // Activate outside the borrow: user constructors may send messages.
    let activation = Activation::new(A::activate(key));
    let result = dir.map.borrow_mut().entry(id).or_insert(activation).clone();
    result
}

/// Applies the type's reentrancy policy and runs the handler.
///
/// For reentrant types the handler's synchronous body has already run by
/// the time this returns. Non-reentrant types first acquire the
/// activation's single permit, failing with [`Error::ReentrancyTimeout`]
/// when it cannot be had within the deadline; the permit is held until the
/// handler's future resolves.
pub(crate) fn dispatch<A, H>(
    activation: Activation<A>,
    args: H::Args,
) -> impl Future<Output = Result<H::Output>> + 'static
where
    A: Actor,
    H: Handler<A>,
{
    if A::REENTRANT {
        return Either::Left(H::invoke(&activation.state, args));
    }

    let semaphore = activation
        .semaphore
        .clone()
        .expect("non-reentrant activation without a semaphore");
    Either::Right(async move {
        let permit = tokio::time::timeout(REENTRANCY_TIMEOUT, semaphore.acquire_owned())
            .await
            .map_err(|_| Error::ReentrancyTimeout)?
            .expect("activation semaphore closed");

        let result = H::invoke(&activation.state, args).await;
        drop(permit);
        result
    })
}

/// Resolves the activation on the current shard and dispatches one message.
pub(crate) fn dispatch_local<A, H>(
    key: &A::Key,
    id: ActorId,
    args: H::Args,
) -> impl Future<Output = Result<H::Output>> + 'static
where
    A: Actor,
    H: Handler<A>,
{
    dispatch::<A, H>(hold::<A>(key, id), args)
}

/// Unpacks a coalesced batch on the owning shard, invoking the handler once
/// per element in batch order.
///
/// The first failing element fails the whole batch; results collected so
/// far are discarded and later elements are not run.
pub(crate) async fn dispatch_packed<A, H>(
    key: A::Key,
    id: ActorId,
    batch: Vec<H::Args>,
) -> Result<Vec<H::Output>>
where
    A: Actor,
    H: Handler<A>,
{
    let mut results = Vec::with_capacity(batch.len());
    for args in batch {
        results.push(dispatch_local::<A, H>(&key, id, args).await?);
    }
    Ok(results)
}

/// Drops every activation of `A` on every shard.
pub(crate) fn clear<A: Actor>() -> impl Future<Output = ()> {
    invoke_on_all(|| async {
        let dir = context::with(|cx| cx.slot(Directory::<A>::default));
        dir.map.borrow_mut().clear();
    })
}
