//! Graceful shutdown (spec.md §5, SPEC_FULL.md §11).
//!
//! spec.md §5: "A core shutdown request waits for outstanding work to
//! settle and then tears down the module server and any external evaluator
//! subprocesses." Command handling is spawned onto this instance's
//! [`Shutdown`] tracker so a shutdown request can drain it; the server's
//! accept loop and each started evaluator are torn down only once that
//! drain completes.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tokio::task::JoinHandle;

/// Tracks in-flight command-handling tasks for one core instance so a
/// shutdown request can wait for them to settle before tearing anything
/// down. Not a `Send`/`Sync` primitive - the whole core runs on one
/// cooperative scheduler thread (spec.md §5).
pub struct Shutdown {
    draining: Cell<bool>,
    tasks: RefCell<Vec<JoinHandle<()>>>,
}

impl Shutdown {
    pub fn new() -> Rc<Self> {
        Rc::new(Shutdown {
            draining: Cell::new(false),
            tasks: RefCell::new(Vec::new()),
        })
    }

    /// True once [`Shutdown::begin`] has been called; the stdio loop checks
    /// this before reading the next command line.
    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// Track a command-handling future so it counts toward the drain.
    /// Commands cannot be cancelled by the editor (spec.md §5), so this
    /// never aborts a tracked task - it only waits for it in [`Shutdown::begin`].
    pub fn track(&self, fut: impl Future<Output = ()> + 'static) {
        let handle = tokio::task::spawn_local(fut);
        self.tasks.borrow_mut().push(handle);
    }

    /// Stop accepting new commands and await every tracked task. Callers
    /// tear down the module server and evaluator subprocesses after this
    /// returns.
    pub async fn begin(&self) {
        self.draining.set(true);
        // Take ownership of the handles before awaiting them: holding the
        // `RefCell` borrow across an `.await` would panic the moment a
        // still-running task tried to `track()` another one concurrently.
        let handles: Vec<_> = self.tasks.borrow_mut().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
