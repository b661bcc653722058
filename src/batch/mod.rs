//! Message coalescing.
//!
//! [`deduplicate`] batches many invocations of one handler on one
//! activation into a single cross-shard (or cross-node) task, and
//! [`with_buffer`] bounds the number of in-flight messages a producer may
//! have outstanding. The two compose: a producer typically coalesces bursts
//! with `deduplicate` and paces itself with `with_buffer`.

mod buffer;

use std::marker::PhantomData;

pub use self::buffer::{with_buffer, MessageBuffer};

use crate::actor::{Actor, ActorRef, Handler};
use crate::internal::prelude::*;

/// Accumulates the arguments of a coalesced batch.
///
/// Handed to the builder closure of [`deduplicate`]; each [`push`] appends
/// one invocation's arguments. Nothing is dispatched until the closure
/// returns.
///
/// [`push`]: Self::push
pub struct Batch<A: Actor, H: Handler<A>> {
    packed: Vec<H::Args>,
    _marker: PhantomData<fn(A, H)>,
}

impl<A: Actor, H: Handler<A>> Batch<A, H> {
    fn new() -> Self {
        Self {
            packed: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Appends one invocation to the batch.
    ///
    /// For handlers without arguments the unit tuple is pushed; the batch
    /// then simply carries the invocation count.
    pub fn push(&mut self, args: H::Args) {
        self.packed.push(args);
    }

    /// Number of invocations accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }
}

/// Coalesces many invocations of `tag` on one activation into a single
/// task.
///
/// The builder closure calls [`Batch::push`] any number of times; on
/// return, the accumulated vector crosses to the target activation *once*,
/// where the handler is invoked per element in push order. Results come
/// back concatenated in the same order. If any single invocation fails, the
/// whole batch fails with that error and the remaining invocations are not
/// run.
///
/// # Examples
///
/// ```rust,no_run
/// # fn main() {}
/// # use lapis::{batch::deduplicate, Actor, messages};
/// # struct Adder;
/// # impl Actor for Adder {
/// #     type Key = u64;
/// #     fn activate(_: &u64) -> Self { Adder }
/// # }
/// # impl Adder {
/// #     fn add(&mut self, n: u64) -> u64 { n }
/// # }
/// # messages! { impl Adder as pub mod adder { fn add(&mut self, n: u64) -> u64; } }
/// # async fn run() -> lapis::Result<()> {
/// let adder = lapis::get::<Adder>(0);
/// let doubled = deduplicate(&adder, adder::add, |b| {
///     for n in 0..1024 {
///         b.push((n,));
///     }
/// })
/// .await?;
/// assert_eq!(doubled.len(), 1024);
/// # Ok(())
/// # }
/// ```
pub async fn deduplicate<A, H, F>(actor: &ActorRef<A>, tag: H, build: F) -> Result<Vec<H::Output>>
where
    A: Actor,
    H: Handler<A>,
    F: FnOnce(&mut Batch<A, H>),
{
    let mut batch = Batch::new();
    build(&mut batch);
    actor.tell_packed(tag, batch.packed).await
}
