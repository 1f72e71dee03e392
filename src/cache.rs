//! Memoization graph (spec.md §4.5, §5, component C5) and the `Core`
//! instance state (spec.md §9, SPEC_FULL.md §10.5).
//!
//! Every capability call is memoized per input so that, per spec.md §5,
//! there is at most one in-flight `read`, `analyze`, or `hash_source` for a
//! given locator - concurrent callers await the same cached result instead
//! of duplicating work. `tokio::sync::OnceCell::get_or_try_init` gives this
//! "run once, share with late arrivals" behavior directly, and a failed
//! attempt leaves the cell uninitialized rather than caching the error
//! (spec.md §4.5: "rejected promises are not cached").

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::sync::OnceCell;

use crate::analyzer::{self, Analysis};
use crate::capabilities::{Mime, Read, Resolve, Watch};
use crate::digest::Hash;
use crate::error::ReplError;
use crate::locator::{Locator, Unguessable};

type Cell<T> = Rc<OnceCell<T>>;

/// Per-instance state: the external capabilities, the `versions`/`hashes`/
/// `unguessable` triple, and the five memoization caches from spec.md §3.
/// Owned by one running instance and shared by `Rc` with the server and
/// driver (never a module-level global, so multiple instances can coexist
/// in one process per spec.md §9).
pub struct Core {
    pub resolver: Rc<dyn Resolve>,
    pub reader: Rc<dyn Read>,
    pub watcher: Rc<dyn Watch>,
    pub mime: Rc<dyn Mime>,
    pub tag: Unguessable,

    versions: RefCell<HashMap<String, u64>>,
    hashes: RefCell<HashMap<String, Hash>>,

    locating: RefCell<HashMap<(String, String), Cell<Locator>>>,
    reading: RefCell<HashMap<String, Cell<String>>>,
    analyzing: RefCell<HashMap<String, Cell<Analysis>>>,
    hashing_source: RefCell<HashMap<String, Cell<Hash>>>,

    watched: RefCell<HashSet<String>>,
}

impl Core {
    pub fn new(
        resolver: Rc<dyn Resolve>,
        reader: Rc<dyn Read>,
        watcher: Rc<dyn Watch>,
        mime: Rc<dyn Mime>,
    ) -> Rc<Self> {
        Rc::new(Core {
            resolver,
            reader,
            watcher,
            mime,
            tag: Unguessable::generate(),
            versions: RefCell::new(HashMap::new()),
            hashes: RefCell::new(HashMap::new()),
            locating: RefCell::new(HashMap::new()),
            reading: RefCell::new(HashMap::new()),
            analyzing: RefCell::new(HashMap::new()),
            hashing_source: RefCell::new(HashMap::new()),
            watched: RefCell::new(HashSet::new()),
        })
    }

    /// Memoized `locate`. Pure per spec.md §4.5, so never invalidated by a
    /// file-change notification.
    pub(crate) async fn locate_cached(
        &self,
        specifier: &str,
        parent: &Locator,
    ) -> Result<Locator, ReplError> {
        let key = (specifier.to_string(), parent.as_str().to_string());
        let cell = {
            let mut map = self.locating.borrow_mut();
            map.entry(key).or_insert_with(|| Rc::new(OnceCell::new())).clone()
        };
        cell.get_or_try_init(|| self.resolver.locate(specifier, parent))
            .await
            .map(|locator| locator.clone())
    }

    /// Memoized `read`, arming a one-shot watch on the first read of a new
    /// locator (invalidation depends on that watch firing later).
    pub(crate) async fn read_cached(self: &Rc<Self>, locator: &Locator) -> Result<String, ReplError> {
        let key = locator.as_str().to_string();
        let (cell, is_new) = {
            let mut map = self.reading.borrow_mut();
            match map.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let cell = Rc::new(OnceCell::new());
                    map.insert(key.clone(), cell.clone());
                    (cell, true)
                }
            }
        };
        if is_new {
            self.arm_watch(locator.clone());
        }
        cell.get_or_try_init(|| async {
            let bytes = self.reader.read(locator).await?;
            String::from_utf8(bytes).map_err(|err| ReplError::Read {
                locator: locator.as_str().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            })
        })
        .await
        .map(|source| source.clone())
    }

    /// Memoized `analyze`, keyed only by locator: the source text behind it
    /// is itself memoized by [`Core::read_cached`], so re-analysis only
    /// happens once per (locator, current source) pair in practice.
    pub(crate) async fn analyze_cached(
        self: &Rc<Self>,
        locator: &Locator,
    ) -> Result<Analysis, ReplError> {
        let key = locator.as_str().to_string();
        let cell = {
            let mut map = self.analyzing.borrow_mut();
            map.entry(key).or_insert_with(|| Rc::new(OnceCell::new())).clone()
        };
        let source = self.read_cached(locator).await?;
        cell.get_or_try_init(|| async { analyzer::analyze(locator.as_str(), &source) })
            .await
            .map(|analysis| analysis.clone())
    }

    /// Memoized hash of a locator's raw source bytes (not the deep hash -
    /// see [`crate::hasher::hash`] for that).
    pub(crate) async fn hash_source_cached(self: &Rc<Self>, locator: &Locator) -> Result<Hash, ReplError> {
        let key = locator.as_str().to_string();
        let cell = {
            let mut map = self.hashing_source.borrow_mut();
            map.entry(key).or_insert_with(|| Rc::new(OnceCell::new())).clone()
        };
        let source = self.read_cached(locator).await?;
        let hash = cell.get_or_init(|| async { Hash::of_bytes(source.as_bytes()) }).await;
        Ok(*hash)
    }

    /// Evict every cache entry derived from a locator's file contents
    /// (spec.md §4.5): `reading`, `analyzing`, `hashing_source`. `locating`
    /// is untouched since it is pure. Public: the watch loop calls this on
    /// a change notification, but an embedder driving its own invalidation
    /// (e.g. a non-filesystem `Watch` impl, or a test) needs the same hook.
    pub fn invalidate(&self, locator: &Locator) {
        let key = locator.as_str();
        self.reading.borrow_mut().remove(key);
        self.analyzing.borrow_mut().remove(key);
        self.hashing_source.borrow_mut().remove(key);
    }

    /// Apply `versionize`'s bookkeeping (spec.md §4.4): bump the version iff
    /// `hash` differs from the last one recorded for `locator`, then record
    /// `hash` as the new baseline. Returns the (possibly unchanged) version.
    pub(crate) fn record_hash(&self, locator: &Locator, hash: Hash) -> u64 {
        let key = locator.as_str().to_string();
        let mut hashes = self.hashes.borrow_mut();
        let mut versions = self.versions.borrow_mut();
        let version = match hashes.get(&key) {
            None => {
                versions.insert(key.clone(), 0);
                0
            }
            Some(previous) if *previous != hash => {
                let next = versions.get(&key).copied().unwrap_or(0) + 1;
                versions.insert(key.clone(), next);
                next
            }
            Some(_) => versions.get(&key).copied().unwrap_or(0),
        };
        hashes.insert(key, hash);
        version
    }

    /// Spawn a one-shot-then-rearm watch loop for `locator`. Each change
    /// evicts the locator's derived cache entries and re-arms; a watch
    /// failure evicts once more, logs, and does not retry (spec.md §7's
    /// WatchFailure policy).
    fn arm_watch(self: &Rc<Self>, locator: Locator) {
        if !self.watched.borrow_mut().insert(locator.as_str().to_string()) {
            return;
        }
        let core = self.clone();
        tokio::task::spawn_local(async move {
            loop {
                match core.watcher.watch(&locator).await {
                    Ok(()) => {
                        core.invalidate(&locator);
                    }
                    Err(err) => {
                        core.invalidate(&locator);
                        log::error!("watch failed for {locator}: {err}");
                        core.watched.borrow_mut().remove(locator.as_str());
                        break;
                    }
                }
            }
        });
    }
}
