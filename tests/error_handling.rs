//! Failure propagation and reentrancy control.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use lapis::prelude::*;

/// Tracks overlap of its own handler executions through a flag that is set
/// for the lifetime of each invocation's future.
struct Guarded {
    busy: Rc<Cell<bool>>,
    overlaps: Rc<Cell<u32>>,
    completed: u32,
}

impl Guarded {
    fn make() -> Self {
        Self {
            busy: Rc::new(Cell::new(false)),
            overlaps: Rc::new(Cell::new(0)),
            completed: 0,
        }
    }

    fn exclusive(&mut self, millis: u64) -> impl std::future::Future<Output = Result<()>> + 'static {
        if self.busy.get() {
            self.overlaps.set(self.overlaps.get() + 1);
        }
        self.busy.set(true);
        self.completed += 1;

        let busy = Rc::clone(&self.busy);
        async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            busy.set(false);
            Ok(())
        }
    }

    fn overlaps(&self) -> u32 {
        self.overlaps.get()
    }

    fn completed(&self) -> u32 {
        self.completed
    }
}

/// The non-reentrant variant: handlers of one activation never interleave.
struct Serialized(Guarded);

impl Actor for Serialized {
    type Key = u64;
    const REENTRANT: bool = false;

    fn activate(_key: &u64) -> Self {
        Self(Guarded::make())
    }
}

impl Serialized {
    fn exclusive(&mut self, millis: u64) -> impl std::future::Future<Output = Result<()>> + 'static {
        self.0.exclusive(millis)
    }

    fn overlaps(&self) -> u32 {
        self.0.overlaps()
    }
}

messages! {
    impl Serialized as pub mod serialized {
        fn exclusive(&mut self, millis: u64) -> future ();
        fn overlaps(&self) -> u32;
    }
}

/// The default, reentrant variant of the same actor.
struct Interleaved(Guarded);

impl Actor for Interleaved {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        Self(Guarded::make())
    }
}

impl Interleaved {
    fn exclusive(&mut self, millis: u64) -> impl std::future::Future<Output = Result<()>> + 'static {
        self.0.exclusive(millis)
    }

    fn overlaps(&self) -> u32 {
        self.0.overlaps()
    }
}

messages! {
    impl Interleaved as pub mod interleaved {
        fn exclusive(&mut self, millis: u64) -> future ();
        fn overlaps(&self) -> u32;
    }
}

struct Flaky {
    attempts: u32,
}

impl Actor for Flaky {
    type Key = u64;

    fn activate(_key: &u64) -> Self {
        Self {
            attempts: 0,
        }
    }
}

impl Flaky {
    fn fail(&mut self) -> impl std::future::Future<Output = Result<u64>> + 'static {
        self.attempts += 1;
        std::future::ready(Err(Error::Other("deliberate failure")))
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

messages! {
    impl Flaky as pub mod flaky {
        fn fail(&mut self) -> future u64;
        fn attempts(&self) -> u32;
    }
}

fn runtime() -> Runtime {
    Runtime::new(RuntimeOptions {
        shards: 2,
    })
}

/// A failed handler future surfaces verbatim to the caller, and the
/// message is not retried.
#[test]
fn handler_failures_surface_unmodified_and_once() {
    runtime().block_on(|| async {
        use flaky::Tell as _;

        let actor = lapis::get::<Flaky>(1);
        match actor.fail().await {
            Err(Error::Other(msg)) => assert_eq!(msg, "deliberate failure"),
            other => panic!("expected the handler error, got {other:?}"),
        }
        assert_eq!(actor.attempts().await?, 1);

        // The activation stays usable after a failure.
        assert!(actor.fail().await.is_err());
        assert_eq!(actor.attempts().await?, 2);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// Non-reentrant dispatch never interleaves handler bodies of one
/// activation, whatever the concurrency on the caller side.
#[test]
fn non_reentrant_handlers_never_interleave() {
    runtime().block_on(|| async {
        use serialized::Tell as _;

        let actor = lapis::get::<Serialized>(2);
        let bursts: Vec<_> = (0..8).map(|_| actor.exclusive(10)).collect();
        futures::future::try_join_all(bursts).await?;

        assert_eq!(actor.overlaps().await?, 0);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// The same burst against the reentrant variant does interleave — the
/// serialization above comes from the semaphore, not from scheduling
/// accidents.
#[test]
fn reentrant_handlers_do_interleave() {
    runtime().block_on(|| async {
        use interleaved::Tell as _;

        let actor = lapis::get::<Interleaved>(3);
        let bursts: Vec<_> = (0..8).map(|_| actor.exclusive(10)).collect();
        futures::future::try_join_all(bursts).await?;

        assert!(actor.overlaps().await? > 0);
        Ok::<_, Error>(())
    })
    .unwrap();
}

/// A dispatch that cannot take the activation's permit within the deadline
/// fails with `ReentrancyTimeout` while the running handler is unaffected.
#[test]
fn semaphore_timeout_is_reported() {
    runtime().block_on(|| async {
        use serialized::Tell as _;

        let actor = lapis::get::<Serialized>(4);
        let long = tokio::task::spawn_local(actor.exclusive(1500));
        // Let the long handler take the permit before contending.
        tokio::task::yield_now().await;

        let started = Instant::now();
        match actor.exclusive(1).await {
            Err(Error::ReentrancyTimeout) => {},
            other => panic!("expected a reentrancy timeout, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(900));

        long.await.expect("long handler task panicked")?;
        Ok::<_, Error>(())
    })
    .unwrap();
}
