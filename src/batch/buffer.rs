//! A bounded in-flight window of message futures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::internal::prelude::*;

struct Inner {
    window: VecDeque<LocalBoxFuture<'static, Result<()>>>,
    capacity: usize,
}

/// A bounded window of in-flight message futures.
///
/// [`push`] admits a future immediately while the window has room;
/// otherwise it first awaits the oldest windowed future, which is the sole
/// backpressure device the runtime offers to producers. The buffer does not
/// coalesce anything — pair it with
/// [`deduplicate`](crate::batch::deduplicate) for that.
///
/// The handle is cheap to clone; clones share the window.
///
/// [`push`]: Self::push
#[derive(Clone)]
pub struct MessageBuffer {
    inner: Rc<RefCell<Inner>>,
}

impl MessageBuffer {
    /// Creates a buffer admitting up to `capacity` in-flight futures.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "message buffer capacity must be positive");

        Self {
            inner: Rc::new(RefCell::new(Inner {
                window: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    /// Admits a future into the window, waiting for the oldest one first
    /// when the window is full.
    ///
    /// The future's output value is discarded; its error, if any, surfaces
    /// either here (when it was the oldest awaited one) or from
    /// [`flush`](Self::flush).
    pub async fn push<F, T>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let oldest = {
            let mut inner = self.inner.borrow_mut();
            if inner.window.len() >= inner.capacity {
                inner.window.pop_front()
            } else {
                None
            }
        };
        if let Some(oldest) = oldest {
            oldest.await?;
        }

        self.inner
            .borrow_mut()
            .window
            .push_back(Box::pin(async move { fut.await.map(|_| ()) }));
        Ok(())
    }

    /// Waits for every windowed future, oldest first. The first error wins;
    /// later futures are dropped with the buffer.
    pub async fn flush(&self) -> Result<()> {
        loop {
            let Some(fut) = self.inner.borrow_mut().window.pop_front() else {
                return Ok(());
            };
            fut.await?;
        }
    }
}

/// Runs a producer closure against a fresh [`MessageBuffer`] and flushes
/// the window once the closure's future resolves.
///
/// # Examples
///
/// ```rust,no_run
/// # fn main() {}
/// # use lapis::{batch::with_buffer, Actor, messages};
/// # struct Counter { count: u64 }
/// # impl Actor for Counter {
/// #     type Key = u64;
/// #     fn activate(_: &u64) -> Self { Counter { count: 0 } }
/// # }
/// # impl Counter {
/// #     fn inc(&mut self) { self.count += 1; }
/// # }
/// # messages! { impl Counter as pub mod counter { fn inc(&mut self); } }
/// # async fn run() -> lapis::Result<()> {
/// use counter::Tell as _;
///
/// let counter = lapis::get::<Counter>(0);
/// with_buffer(64, |buf| async move {
///     for _ in 0..10_000 {
///         buf.push(counter.inc()).await?;
///     }
///     Ok(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_buffer<F, Fut>(capacity: usize, func: F) -> Result<()>
where
    F: FnOnce(MessageBuffer) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let buffer = MessageBuffer::new(capacity);
    func(buffer.clone()).await?;
    buffer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_admits_until_capacity() {
        let buffer = MessageBuffer::new(2);
        buffer.push(async { Ok(1u32) }).await.unwrap();
        buffer.push(async { Ok(2u32) }).await.unwrap();
        assert_eq!(buffer.inner.borrow().window.len(), 2);

        // A third push evicts (and awaits) the oldest.
        buffer.push(async { Ok(3u32) }).await.unwrap();
        assert_eq!(buffer.inner.borrow().window.len(), 2);

        buffer.flush().await.unwrap();
        assert!(buffer.inner.borrow().window.is_empty());
    }

    #[tokio::test]
    async fn flush_surfaces_the_first_error() {
        let buffer = MessageBuffer::new(8);
        buffer.push(async { Ok(()) }).await.unwrap();
        buffer.push(async { Err::<(), _>(Error::Other("boom")) }).await.unwrap();

        match buffer.flush().await {
            Err(Error::Other(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected flush result: {other:?}"),
        }
    }
}
