//! Module server (spec.md §4.6, component C6).
//!
//! Serves HTTP GETs for modules, rewriting every specifier in a served
//! module to its resolved, versioned, fully-qualified form before handing
//! the bytes back - the defeat of the host evaluator's immutable module
//! cache that spec.md §1 singles out as one of this crate's two hardest
//! problems.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::cache::Core;
use crate::capabilities::{Mime as MimeTrait, Read as ReadTrait, Specify, MODULE_MEDIA_TYPE};
use crate::locator::{strip_version, Locator};
use crate::patcher::{self, Edit};

/// Projects a versioned `file://` locator to the fully qualified HTTP URL
/// this server answers requests on (spec.md §4.6 step 2's "the hook
/// converts... a file path into a fully qualified HTTP URL pointing back
/// at this server").
pub struct HttpProjector {
    pub host: String,
    pub port: u16,
}

impl Specify for HttpProjector {
    fn specify(&self, versioned: &str) -> String {
        let path = versioned.strip_prefix("file://").unwrap_or(versioned);
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

/// Bind and serve forever, one task per accepted connection. Runs on the
/// same single-threaded cooperative scheduler as the rest of the core
/// (spec.md §5) via `tokio::task::spawn_local`.
pub async fn run(core: Rc<Core>, projector: Rc<dyn Specify>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("module server listening on {addr}");
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let core = core.clone();
        let projector = projector.clone();
        tokio::task::spawn_local(async move {
            let service = hyper::service::service_fn(move |req| {
                let core = core.clone();
                let projector = projector.clone();
                async move { Ok::<_, Infallible>(handle(&core, projector.as_ref(), req).await) }
            });
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                log::error!("module server connection error: {err}");
            }
        });
    }
}

async fn handle(core: &Rc<Core>, projector: &dyn Specify, req: Request<Incoming>) -> Response<Full<Bytes>> {
    match serve_one(core, projector, req.uri().path()).await {
        Ok((body, content_type)) => Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, content_type)
            .body(Full::new(body))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
        Err(err) => {
            log::error!("module request for {} failed: {err}", req.uri().path());
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
        }
    }
}

/// §4.6's four numbered steps: locator from URL (stripping a versioned
/// segment bearing this instance's tag), mime lookup, rewrite-if-module,
/// raw-bytes-otherwise. Public so integration tests (and embedders who want
/// the rewrite without an HTTP round trip) can drive it directly.
pub async fn serve_one(
    core: &Rc<Core>,
    projector: &dyn Specify,
    path: &str,
) -> Result<(Bytes, String), crate::error::ReplError> {
    use crate::error::ReplError;

    let underlying_path = strip_version(path, &core.tag).unwrap_or_else(|| path.to_string());
    let raw = format!("file://{underlying_path}");
    let locator = Locator::parse(&raw).map_err(|err| ReplError::Read {
        locator: raw.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()),
    })?;

    let content_type = core.mime.mime(&locator).ok_or_else(|| ReplError::Read {
        locator: locator.as_str().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Unsupported, "no mime type for locator"),
    })?;

    if content_type != MODULE_MEDIA_TYPE {
        let bytes = core.reader.read(&locator).await?;
        return Ok((Bytes::from(bytes), content_type));
    }

    let source = core.read_cached(&locator).await?;
    let analysis = core.analyze_cached(&locator).await?;

    let mut projected = HashMap::new();
    for specifier in analysis.specifier_set() {
        if projected.contains_key(specifier) {
            continue;
        }
        let child = core.locate_cached(specifier, &locator).await?;
        let versioned = core.versionize(&child).await;
        projected.insert(specifier.to_string(), projector.specify(&versioned));
    }

    let mut edits = Vec::new();
    for import in &analysis.imports {
        let url = &projected[import.specifier.as_str()];
        let literal = serde_json::to_string(url)?;
        let pad = patcher::blanks(&source, import.specifier_range.clone());
        edits.push(Edit::new(import.specifier_range.clone(), format!("{pad}{literal}")));
    }
    for dynamic in &analysis.dynamics {
        let url = &projected[dynamic.value.as_str()];
        let literal = serde_json::to_string(url)?;
        let pad = patcher::blanks(&source, dynamic.module_range.clone());
        edits.push(Edit::new(dynamic.module_range.clone(), format!("{pad}{literal}")));
    }

    let patched = patcher::apply(&source, &edits);
    Ok((Bytes::from(patched.into_bytes()), content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use async_trait::async_trait;

    use crate::capabilities::{Read as ReadTr, Resolve, Watch};
    use crate::error::ReplError;

    struct FakeFs {
        files: RefCell<HashMap<String, String>>,
    }

    #[async_trait(?Send)]
    impl Resolve for FakeFs {
        async fn locate(&self, specifier: &str, parent: &Locator) -> Result<Locator, ReplError> {
            parent.join(specifier).map_err(|err| ReplError::Resolve {
                specifier: specifier.to_string(),
                parent: parent.as_str().to_string(),
                reason: err.to_string(),
            })
        }
    }

    #[async_trait(?Send)]
    impl ReadTr for FakeFs {
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
    impl Watch for FakeFs {
        async fn watch(&self, _locator: &Locator) -> Result<(), ReplError> {
            std::future::pending().await
        }
    }

    impl MimeTrait for FakeFs {
        fn mime(&self, locator: &Locator) -> Option<String> {
            if locator.as_str().ends_with(".js") {
                Some(MODULE_MEDIA_TYPE.to_string())
            } else if locator.as_str().ends_with(".bin") {
                Some("application/octet-stream".to_string())
            } else {
                None
            }
        }
    }

    struct IdentityProjector;
    impl Specify for IdentityProjector {
        fn specify(&self, versioned: &str) -> String {
            format!("http://host:1234{}", versioned.strip_prefix("file://").unwrap())
        }
    }

    fn make_core(files: Vec<(&str, &str)>) -> Rc<Core> {
        let fs = Rc::new(FakeFs {
            files: RefCell::new(files.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
        });
        Core::new(fs.clone(), fs.clone(), fs.clone(), fs)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rewrites_import_specifier_to_versioned_url() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let core = make_core(vec![
                    ("file:///q.js", "import p from \"./p.js\";\n"),
                    ("file:///p.js", "export default 1;\n"),
                ]);
                let (body, content_type) = serve_one(&core, &IdentityProjector, "/q.js").await.unwrap();
                assert_eq!(content_type, MODULE_MEDIA_TYPE);
                let text = String::from_utf8(body.to_vec()).unwrap();
                assert!(text.contains("import p from \"http://host:1234/v0/"));
                assert!(text.ends_with("p.js\";\n"));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rewrites_dynamic_import_literal_without_dropping_the_call() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let core = make_core(vec![
                    ("file:///q.js", "const m = await import(\"./p.js\");\n"),
                    ("file:///p.js", "export default 1;\n"),
                ]);
                let (body, _) = serve_one(&core, &IdentityProjector, "/q.js").await.unwrap();
                let text = String::from_utf8(body.to_vec()).unwrap();
                assert!(text.contains("await import(\"http://host:1234/v0/"));
                assert!(text.ends_with("p.js\");\n"));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_module_is_served_raw() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let core = make_core(vec![("file:///a.bin", "raw bytes")]);
                let (body, content_type) = serve_one(&core, &IdentityProjector, "/a.bin").await.unwrap();
                assert_eq!(content_type, "application/octet-stream");
                assert_eq!(body.as_ref(), b"raw bytes");
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_mime_is_an_error() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let core = make_core(vec![("file:///a.unknown", "raw bytes")]);
                assert!(serve_one(&core, &IdentityProjector, "/a.unknown").await.is_err());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn strips_versioned_segment_bearing_this_instances_tag() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let core = make_core(vec![("file:///m.js", "export default 1;\n")]);
                let locator = Locator::parse("file:///m.js").unwrap();
                let versioned = core.versionize(&locator).await;
                let path = versioned.strip_prefix("file://").unwrap();
                let (body, _) = serve_one(&core, &IdentityProjector, path).await.unwrap();
                assert_eq!(String::from_utf8(body.to_vec()).unwrap(), "export default 1;\n");
            })
            .await;
    }
}
