//! Dependency hasher & versioner (spec.md §4.4, component C4).
//!
//! `hash` and `versionize` are implemented as methods on [`crate::cache::Core`]
//! since they're driven entirely by its memoized capability wrappers; this
//! module only adds the deep-hash recursion and the version bookkeeping on
//! top of the primitives `cache.rs` exposes.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::capabilities::MODULE_MEDIA_TYPE;
use crate::cache::Core;
use crate::digest::{self, Hash};
use crate::locator::{version_locator, Locator};

impl Core {
    /// `hash(locator)` (spec.md §4.4): `None` if `locator` is not a
    /// readable `file://` module of the guest language's media type.
    /// Otherwise `digest(source_hash, ...child_hashes)`, where each child
    /// is a specifier in the module's specifier set, resolved then hashed
    /// recursively through this same function, in source order (see
    /// SPEC_FULL.md §13, Open Question 1).
    ///
    /// Cycle safety: a plain recursive promise cache would deadlock on a
    /// self-referential cycle (the ancestor's own in-flight computation
    /// would have to await itself). Instead this tracks the locators
    /// currently being hashed on the *current call's* path; re-entering one
    /// of them contributes `None` for that edge instead of recursing again,
    /// which both terminates and matches spec.md §4.4's "a child hash that
    /// would recurse into an ancestor is permitted (and expected)".
    pub async fn hash(self: &Rc<Self>, locator: &Locator) -> Option<Hash> {
        let mut in_progress = HashSet::new();
        self.hash_inner(locator, &mut in_progress).await
    }

    fn hash_inner<'a>(
        self: &'a Rc<Self>,
        locator: &'a Locator,
        in_progress: &'a mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = Option<Hash>> + 'a>> {
        Box::pin(async move {
            if !locator.is_file() {
                return None;
            }
            let key = locator.as_str().to_string();
            if in_progress.contains(&key) {
                return None;
            }
            if self.mime.mime(locator).as_deref() != Some(MODULE_MEDIA_TYPE) {
                return None;
            }

            in_progress.insert(key.clone());

            let source_hash = self.hash_source_cached(locator).await.ok();
            let analysis = self.analyze_cached(locator).await.ok();

            let result = match (source_hash, analysis) {
                (Some(source_hash), Some(analysis)) => {
                    let mut child_hashes = Vec::new();
                    for specifier in analysis.specifier_set() {
                        let child = self.locate_cached(specifier, locator).await.ok();
                        let child_hash = match child {
                            Some(child_locator) => self.hash_inner(&child_locator, in_progress).await,
                            None => None,
                        };
                        child_hashes.push(child_hash);
                    }
                    Some(digest::digest(source_hash, child_hashes))
                }
                _ => None,
            };

            in_progress.remove(&key);
            result
        })
    }

    /// `versionize(locator)` (spec.md §4.4): if `hash(locator)` is absent,
    /// return the locator's own string unchanged. Otherwise bump `versions`
    /// iff the hash changed since last recorded, then emit the versioned
    /// locator form.
    pub async fn versionize(self: &Rc<Self>, locator: &Locator) -> String {
        match self.hash(locator).await {
            None => locator.as_str().to_string(),
            Some(hash) => {
                let version = self.record_hash(locator, hash);
                version_locator(locator, version, &self.tag)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::capabilities::{Mime as MimeTrait, Read as ReadTrait, Resolve as ResolveTrait, Watch as WatchTrait};
    use crate::error::ReplError;

    struct FakeFs {
        files: RefCell<HashMap<String, String>>,
    }

    #[async_trait(?Send)]
    impl ResolveTrait for FakeFs {
        async fn locate(&self, specifier: &str, parent: &Locator) -> Result<Locator, ReplError> {
            parent.join(specifier).map_err(|err| ReplError::Resolve {
                specifier: specifier.to_string(),
                parent: parent.as_str().to_string(),
                reason: err.to_string(),
            })
        }
    }

    #[async_trait(?Send)]
    impl ReadTrait for FakeFs {
        async fn read(&self, locator: &Locator) -> Result<Vec<u8>, ReplError> {
            self.files
                .borrow()
                .get(locator.as_str())
                .cloned()
                .map(|s| s.into_bytes())
                .ok_or_else(|| ReplError::Read {
                    locator: locator.as_str().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                })
        }
    }

    #[async_trait(?Send)]
    impl WatchTrait for FakeFs {
        async fn watch(&self, _locator: &Locator) -> Result<(), ReplError> {
            std::future::pending().await
        }
    }

    impl MimeTrait for FakeFs {
        fn mime(&self, locator: &Locator) -> Option<String> {
            if locator.as_str().ends_with(".js") {
                Some(MODULE_MEDIA_TYPE.to_string())
            } else {
                None
            }
        }
    }

    fn make_core(files: Vec<(&str, &str)>) -> (Rc<Core>, Rc<FakeFs>) {
        let fs = Rc::new(FakeFs {
            files: RefCell::new(
                files
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        });
        let core = Core::new(fs.clone(), fs.clone(), fs.clone(), fs.clone());
        (core, fs)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashes_leaf_module_deterministically() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (core, _fs) = make_core(vec![("file:///m.js", "export default 1;\n")]);
                let locator = Locator::parse("file:///m.js").unwrap();
                let h1 = core.hash(&locator).await.unwrap();
                let h2 = core.hash(&locator).await.unwrap();
                assert_eq!(h1, h2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_module_locator_has_no_hash() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (core, _fs) = make_core(vec![("file:///a.bin", "raw bytes")]);
                let locator = Locator::parse("file:///a.bin").unwrap();
                assert!(core.hash(&locator).await.is_none());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cyclic_imports_terminate_with_stable_hash() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (core, _fs) = make_core(vec![
                    ("file:///a.js", "import b from \"./b.js\";\nb;\n"),
                    ("file:///b.js", "import a from \"./a.js\";\na;\n"),
                ]);
                let locator = Locator::parse("file:///a.js").unwrap();
                let h1 = core.hash(&locator).await.unwrap();
                let h2 = core.hash(&locator).await.unwrap();
                assert_eq!(h1, h2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn versionize_bumps_version_only_when_hash_changes() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (core, fs) = make_core(vec![("file:///m.js", "export default 1;\n")]);
                let locator = Locator::parse("file:///m.js").unwrap();

                let v0 = core.versionize(&locator).await;
                assert!(v0.contains("/v0/"));

                let v0_again = core.versionize(&locator).await;
                assert!(v0_again.contains("/v0/"));

                fs.files
                    .borrow_mut()
                    .insert("file:///m.js".to_string(), "export default 2;\n".to_string());
                core.invalidate(&locator);

                let v1 = core.versionize(&locator).await;
                assert!(v1.contains("/v1/"));
            })
            .await;
    }
}
