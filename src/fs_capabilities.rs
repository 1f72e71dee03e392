//! Local-filesystem-backed default implementations of the external
//! capabilities (SPEC_FULL.md §11). `locate` resolves relative specifiers
//! against the parent `file://` locator - deliberately not a
//! `node_modules`-style resolver, which spec.md §1 keeps out of scope.

use async_trait::async_trait;

use crate::capabilities::{Mime, Read, Resolve, Watch, MODULE_MEDIA_TYPE};
use crate::error::ReplError;
use crate::locator::Locator;

/// The default, filesystem-backed implementation of every external
/// capability the core consumes (spec.md §4.8).
pub struct FsCapabilities;

#[async_trait(?Send)]
impl Resolve for FsCapabilities {
    async fn locate(&self, specifier: &str, parent: &Locator) -> Result<Locator, ReplError> {
        parent.join(specifier).map_err(|err| ReplError::Resolve {
            specifier: specifier.to_string(),
            parent: parent.as_str().to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait(?Send)]
impl Read for FsCapabilities {
    async fn read(&self, locator: &Locator) -> Result<Vec<u8>, ReplError> {
        let path = locator.to_file_path().ok_or_else(|| ReplError::Read {
            locator: locator.as_str().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file:// locator"),
        })?;
        tokio::fs::read(&path).await.map_err(|source| ReplError::Read {
            locator: locator.as_str().to_string(),
            source,
        })
    }
}

#[async_trait(?Send)]
impl Watch for FsCapabilities {
    async fn watch(&self, locator: &Locator) -> Result<(), ReplError> {
        let path = locator.to_file_path().ok_or_else(|| ReplError::Watch {
            locator: locator.as_str().to_string(),
            reason: "not a file:// locator".to_string(),
        })?;

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = tx.blocking_send(event);
        })
        .map_err(|err| ReplError::Watch {
            locator: locator.as_str().to_string(),
            reason: err.to_string(),
        })?;
        notify::Watcher::watch(&mut watcher, &path, notify::RecursiveMode::NonRecursive).map_err(|err| {
            ReplError::Watch {
                locator: locator.as_str().to_string(),
                reason: err.to_string(),
            }
        })?;

        loop {
            match rx.recv().await {
                Some(Ok(event)) if is_relevant(&event.kind) => return Ok(()),
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    return Err(ReplError::Watch {
                        locator: locator.as_str().to_string(),
                        reason: err.to_string(),
                    })
                }
                None => {
                    return Err(ReplError::Watch {
                        locator: locator.as_str().to_string(),
                        reason: "watch channel closed".to_string(),
                    })
                }
            }
        }
    }
}

fn is_relevant(kind: &notify::EventKind) -> bool {
    matches!(
        kind,
        notify::EventKind::Modify(_) | notify::EventKind::Remove(_) | notify::EventKind::Create(_)
    )
}

impl Mime for FsCapabilities {
    fn mime(&self, locator: &Locator) -> Option<String> {
        let path = locator.to_file_path()?;
        let guessed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("js") | Some("mjs") | Some("jsx") => return Some(MODULE_MEDIA_TYPE.to_string()),
            Some("json") => mime::APPLICATION_JSON,
            Some("css") => mime::TEXT_CSS,
            Some("html") | Some("htm") => mime::TEXT_HTML,
            Some("wasm") => "application/wasm".parse().ok()?,
            _ => return None,
        };
        Some(guessed.to_string())
    }
}
