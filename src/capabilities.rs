//! External interfaces the core delegates to (spec.md §4.8, §6).
//!
//! These are explicitly out of this crate's core scope - the specifier
//! resolver, the file system, the file watcher, the MIME sniffer and the
//! evaluator transport are each named in spec.md §1 as "external
//! collaborators". The core only depends on the narrow contracts below;
//! [`crate::fs_capabilities`] supplies one concrete, local-filesystem-backed
//! implementation so the crate is runnable end to end.

use async_trait::async_trait;

use crate::error::ReplError;
use crate::locator::Locator;
use crate::protocol::Verdict;

/// The guest language's module media type, as returned by [`Mime::mime`]
/// for a locator the core should treat as rewritable source rather than
/// opaque bytes (spec.md §4.6).
pub const MODULE_MEDIA_TYPE: &str = "application/javascript";

/// `locate(specifier, parent_locator) -> locator` - pure, may be async.
#[async_trait(?Send)]
pub trait Resolve {
    async fn locate(&self, specifier: &str, parent: &Locator) -> Result<Locator, ReplError>;
}

/// `read(locator) -> bytes`.
#[async_trait(?Send)]
pub trait Read {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>, ReplError>;
}

/// `watch(locator) -> event when the file changes once`. Implementations
/// resolve the returned future exactly once, the first time the locator's
/// backing file changes; they are re-armed by calling `watch` again.
#[async_trait(?Send)]
pub trait Watch {
    async fn watch(&self, locator: &Locator) -> Result<(), ReplError>;
}

/// `mime(locator) -> media-type-string or absent`.
pub trait Mime {
    fn mime(&self, locator: &Locator) -> Option<String>;
}

/// A projector that adapts a versioned locator string for a specific
/// evaluator's consumption - an HTTP URL back at the module server for a
/// networked host, or a bare file path for an in-process one (spec.md §9,
/// "Dynamic dispatch over evaluators").
pub trait Specify {
    fn specify(&self, versioned: &str) -> String;
}

/// The narrow capability set {start, eval, stop, specify} every external
/// evaluator exposes (spec.md §9). `platform` selects which tagged variant
/// handles a given command.
#[async_trait(?Send)]
pub trait Evaluator: Specify {
    fn platform(&self) -> &str;

    async fn start(&self) -> Result<(), ReplError>;

    /// Evaluate `script` (the replize payload) with `static_specifiers`
    /// available for import and `dynamic_specifiers` available to whatever
    /// dynamic-import mechanism the host uses. May report more than one
    /// verdict if the evaluator broadcasts to multiple endpoints (spec.md
    /// §7).
    async fn eval(
        &self,
        script: &str,
        static_specifiers: &[String],
        dynamic_specifiers: &[String],
        wait_flag: bool,
    ) -> Result<Vec<Verdict>, ReplError>;

    async fn stop(&self) -> Result<(), ReplError>;
}
