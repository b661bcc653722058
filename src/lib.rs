//! Lapis is a virtual-actor runtime on a shard-per-core cooperative
//! engine.
//!
//! State is modelled as *virtual actors*: addressable, on-demand activated
//! objects identified by a typed key. Callers obtain a lightweight,
//! copyable reference with [`get`] and *tell* it typed messages; the
//! runtime guarantees that each activation's handlers execute sequentially
//! on a single shard, eliminating intra-actor data races without explicit
//! locking.
//!
//! The engine underneath runs one cooperative scheduler per core with a
//! private heap each — see the [`runtime`] module. Messages to an
//! activation on the caller's shard dispatch inline; messages to another
//! shard cross as a single closure submission; with the `cluster` feature,
//! messages to another node cross the wire through a consistent-hash
//! placement — all behind the same `tell`.
//!
//! ```rust,no_run
//! use lapis::runtime::{Runtime, RuntimeOptions};
//! use lapis::{messages, Actor};
//!
//! struct Counter {
//!     count: u64,
//! }
//!
//! impl Actor for Counter {
//!     type Key = u64;
//!
//!     fn activate(_key: &u64) -> Self {
//!         Self { count: 0 }
//!     }
//! }
//!
//! impl Counter {
//!     fn inc(&mut self) {
//!         self.count += 1;
//!     }
//!
//!     fn count(&self) -> u64 {
//!         self.count
//!     }
//! }
//!
//! messages! {
//!     impl Counter as pub mod counter {
//!         fn inc(&mut self);
//!         fn count(&self) -> u64;
//!     }
//! }
//!
//! fn main() -> lapis::Result<()> {
//!     Runtime::new(RuntimeOptions::default()).block_on(|| async {
//!         use counter::Tell as _;
//!
//!         let counter = lapis::get::<Counter>(7);
//!         for _ in 0..1000 {
//!             counter.inc().await?;
//!         }
//!         assert_eq!(counter.count().await?, 1000);
//!         Ok(())
//!     })
//! }
//! ```
//!
//! # Features
//!
//! - `batch` (default): the `batch` module — message coalescing and the
//!   bounded in-flight buffer.
//! - `cluster`: the `cluster` module — peer membership, the hash ring,
//!   and wire dispatch of `tell` across the network.
#![doc(html_root_url = "https://docs.rs/lapis/*")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rust_2018_idioms)]
#![deny(rustdoc::broken_intra_doc_links)]

mod actor;
#[cfg(feature = "batch")]
pub mod batch;
#[cfg(feature = "cluster")]
pub mod cluster;
pub mod constants;
mod error;
mod internal;
mod macros;
pub mod runtime;

pub use crate::actor::{actor_id, get, Actor, ActorId, ActorKind, ActorRef, Handler, MessageId};
pub use crate::error::{Error, Result};

/// A set of exports for glob-importing the commonly used surface of the
/// library.
pub mod prelude {
    #[cfg(feature = "batch")]
    pub use crate::batch::{deduplicate, with_buffer};
    #[cfg(feature = "cluster")]
    pub use crate::cluster::{with_cluster, NodeDesc};
    pub use crate::runtime::{
        current_shard, invoke_on_all, shard_count, submit_to, Runtime, RuntimeOptions, ShardId,
    };
    pub use crate::{
        actor_id, get, messages, Actor, ActorId, ActorKind, ActorRef, Error, Handler, MessageId,
        Result,
    };
}

// Used by `messages!` expansions.
#[doc(hidden)]
pub use futures;
