//! A small observer primitive for membership events.
//!
//! A service owns an [`EventEmitter`] and raises events on it; other
//! services subscribe listeners, which are invoked sequentially with each
//! event. A listener failing is the listener's problem: the error is logged
//! and swallowed, never propagated to the emitter.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tracing::warn;

use crate::internal::prelude::*;

type Listener<E> = Rc<dyn Fn(&E) -> LocalBoxFuture<'static, Result<()>>>;

pub(crate) struct EventEmitter<E> {
    listeners: RefCell<Vec<Listener<E>>>,
}

impl<E: Debug> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Registers a listener invoked with every subsequent event.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&E) -> LocalBoxFuture<'static, Result<()>> + 'static,
    {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Invokes every listener with the event, in subscription order.
    ///
    /// The listener list is snapshotted up front, so a listener may itself
    /// subscribe without deadlocking the emitter; late subscribers see the
    /// next event.
    pub async fn raise(&self, event: E) {
        let listeners: Vec<_> = self.listeners.borrow().clone();
        for listener in listeners {
            if let Err(why) = listener(&event).await {
                warn!("event listener failed on {:?}: {}", event, why);
            }
        }
    }
}

/// Membership changes observed by the local node.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ClusterEvent {
    /// A peer completed a handshake and entered the ring.
    NodeUp(super::NodeDesc),
    /// A peer was removed: its connection closed or the node stopped.
    NodeDown(super::NodeDesc),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listeners_run_sequentially_and_errors_are_swallowed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let emitter = EventEmitter::<u32>::new();

        let log = Rc::clone(&seen);
        emitter.subscribe(move |event| {
            log.borrow_mut().push(("first", *event));
            Box::pin(std::future::ready(Err(Error::Other("listener boom"))))
        });
        let log = Rc::clone(&seen);
        emitter.subscribe(move |event| {
            log.borrow_mut().push(("second", *event));
            Box::pin(std::future::ready(Ok(())))
        });

        emitter.raise(7).await;
        emitter.raise(9).await;

        assert_eq!(
            *seen.borrow(),
            vec![("first", 7), ("second", 7), ("first", 9), ("second", 9)]
        );
    }
}
