//! Contains the shard-per-core execution engine the actor runtime is built
//! on. The primary building blocks are the [`Runtime`] and the free
//! functions [`submit_to`] and [`invoke_on_all`].
//!
//! A *shard* is one OS thread pinned to one cooperative scheduler with a
//! private heap: a current-thread tokio runtime driving a `LocalSet`. Shards
//! share no mutable data; the only way to reach another shard is to submit a
//! closure onto its run queue. Within a shard, tasks run to their next
//! suspension point atomically with respect to every other task on the same
//! shard, so state owned by a shard never needs a lock.

pub(crate) mod context;

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// An identifier of a single shard within the runtime, in
/// `0..shard_count()`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ShardId(pub u32);

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A unit of work enqueued onto a shard's run queue.
///
/// The closure's synchronous part is executed by the receiving shard in
/// arrival order, which is what gives `submit_to` its FIFO guarantee.
pub(crate) enum ShardTask {
    Run(Box<dyn FnOnce() + Send + 'static>),
    Stop,
}

pub(crate) type TaskSender = mpsc::UnboundedSender<ShardTask>;

/// Options for configuring a [`Runtime`].
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Number of shards to run. Defaults to the available parallelism of
    /// the host.
    pub shards: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        let shards = std::thread::available_parallelism().map_or(1, |n| n.get() as u32);

        Self {
            shards,
        }
    }
}

/// A shard-per-core cooperative runtime.
///
/// Creating a runtime spawns one pinned worker thread per shard beyond the
/// first; the first shard runs on the thread that calls
/// [`Self::block_on`]. Each shard owns a run queue that other shards submit
/// closures onto, and a thread-local context holding everything that shard
/// owns: activation directories, round-robin counters and — when clustering
/// is enabled — the shard's replica of the membership view.
///
/// # Examples
///
/// ```rust,no_run
/// use lapis::runtime::{Runtime, RuntimeOptions};
///
/// let runtime = Runtime::new(RuntimeOptions::default());
/// runtime.block_on(|| async {
///     // actor code runs on shard 0 here
/// });
/// ```
pub struct Runtime {
    senders: Arc<Vec<TaskSender>>,
    workers: Vec<JoinHandle<()>>,
    main_rx: Option<mpsc::UnboundedReceiver<ShardTask>>,
    shards: u32,
}

impl Runtime {
    /// Creates a new runtime, spawning `options.shards - 1` worker threads.
    ///
    /// The calling thread becomes shard 0 for the duration of
    /// [`Self::block_on`].
    #[must_use]
    pub fn new(options: RuntimeOptions) -> Self {
        let shards = options.shards.max(1);

        let mut senders = Vec::with_capacity(shards as usize);
        let mut receivers = Vec::with_capacity(shards as usize);
        for _ in 0..shards {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }

        let senders = Arc::new(senders);
        let mut receivers = receivers.into_iter();
        let main_rx = receivers.next();

        let mut workers = Vec::with_capacity(shards as usize - 1);
        for (i, rx) in receivers.enumerate() {
            let shard = ShardId(i as u32 + 1);
            let senders = Arc::clone(&senders);

            let handle = std::thread::Builder::new()
                .name(format!("lapis-shard-{}", shard.0))
                .spawn(move || run_shard(shard, shards, senders, rx))
                .expect("failed to spawn shard thread");
            workers.push(handle);
        }

        Self {
            senders,
            workers,
            main_rx,
            shards,
        }
    }

    /// Returns the number of shards this runtime was configured with.
    #[must_use]
    pub fn shards(&self) -> u32 {
        self.shards
    }

    /// Runs a future to completion on shard 0, pumping shard 0's run queue
    /// concurrently, then tears the runtime down.
    ///
    /// The factory closure is invoked after the calling thread has entered
    /// the runtime, so it may freely call [`get`](crate::get),
    /// [`submit_to`] and friends. Tasks still pending on any shard when the
    /// main future completes are dropped.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread is already running inside a lapis
    /// runtime.
    pub fn block_on<F, Fut, T>(mut self, factory: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let rx = self.main_rx.take().expect("runtime already entered");
        let _guard = context::install(ShardId(0), self.shards, Arc::clone(&self.senders));

        let rt = build_shard_runtime();
        let local = tokio::task::LocalSet::new();

        let output = rt.block_on(local.run_until(async move {
            tokio::task::spawn_local(pump(rx));
            factory().await
        }));

        self.shutdown();
        output
    }

    fn shutdown(&mut self) {
        for sender in self.senders.iter().skip(1) {
            // Workers that already exited have dropped their receiver.
            let _ = sender.send(ShardTask::Stop);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("runtime stopped");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_shard_runtime() -> tokio::runtime::Runtime {
    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_time();
    #[cfg(feature = "cluster")]
    builder.enable_io();
    builder.build().expect("failed to build shard runtime")
}

/// Drains a shard's run queue until a stop is received.
async fn pump(mut rx: mpsc::UnboundedReceiver<ShardTask>) {
    while let Some(task) = rx.recv().await {
        match task {
            ShardTask::Run(f) => f(),
            ShardTask::Stop => break,
        }
    }
}

fn run_shard(
    shard: ShardId,
    shards: u32,
    senders: Arc<Vec<TaskSender>>,
    rx: mpsc::UnboundedReceiver<ShardTask>,
) {
    let _guard = context::install(shard, shards, senders);
    let rt = build_shard_runtime();
    let local = tokio::task::LocalSet::new();

    debug!("[{:?}] shard up", shard);
    rt.block_on(local.run_until(pump(rx)));
    debug!("[{:?}] shard down", shard);
}

/// Returns the id of the shard the calling task runs on.
///
/// Constant within a task: a task never migrates between shards.
///
/// # Panics
///
/// Panics when called from outside a runtime.
#[must_use]
pub fn current_shard() -> ShardId {
    context::with(|cx| cx.shard)
}

/// Returns the number of shards of the current runtime.
///
/// # Panics
///
/// Panics when called from outside a runtime.
#[must_use]
pub fn shard_count() -> u32 {
    context::with(|cx| cx.shards)
}

/// Enqueues a closure onto the target shard's run queue, returning a future
/// fulfilled with the closure's eventual result.
///
/// The closure's synchronous part is executed by the target shard in
/// arrival order; its returned future is then spawned onto the target's
/// scheduler, and its output is relayed back to the caller. Two submissions
/// from the same caller shard to the same target shard therefore begin
/// executing in submission order.
///
/// # Panics
///
/// The returned future panics if the target shard terminates before
/// completing the task.
pub fn submit_to<F, Fut, T>(target: ShardId, func: F) -> impl Future<Output = T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let sender = context::with(|cx| {
        cx.senders
            .get(target.0 as usize)
            .unwrap_or_else(|| panic!("no such shard: {target}"))
            .clone()
    });

    let task = Box::new(move || {
        let fut = func();
        tokio::task::spawn_local(async move {
            // The caller may have dropped its end to discard the result.
            let _ = tx.send(fut.await);
        });
    });
    sender
        .send(ShardTask::Run(task))
        .unwrap_or_else(|_| panic!("shard {target} has shut down"));

    async move { rx.await.expect("target shard dropped the submitted task") }
}

/// Runs a closure on every shard, resolving once all of them have
/// completed.
///
/// The mutation order observed by any single shard matches the caller's
/// submission order, which is how per-shard replicated state (directories,
/// membership views) is kept in sync without locks.
pub fn invoke_on_all<F, Fut>(func: F) -> impl Future<Output = ()>
where
    F: Fn() -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + 'static,
{
    let count = shard_count();
    let futures: Vec<_> = (0..count).map(|s| submit_to(ShardId(s), func.clone())).collect();
    async move {
        futures::future::join_all(futures).await;
    }
}
