//! Browser evaluator stub (spec.md §1 keeps "the network transport to
//! browser tabs and the browser-side relay" out of scope; SPEC_FULL.md
//! §11).
//!
//! Registered under the `"browser"` platform tag so the driver's
//! platform-dispatch polymorphism (spec.md §9) is real even though this
//! crate doesn't implement the WebSocket/iframe sandboxing the actual
//! transport needs. `specify` still does real work: it projects a
//! versioned locator to the HTTP URL a browser tab's module loader would
//! actually fetch from this instance's module server.

use async_trait::async_trait;

use crate::capabilities::{Evaluator, Specify};
use crate::error::ReplError;
use crate::protocol::Verdict;

pub struct BrowserEvaluator {
    host: String,
    port: u16,
}

impl BrowserEvaluator {
    pub fn new(host: String, port: u16) -> Self {
        BrowserEvaluator { host, port }
    }
}

#[async_trait(?Send)]
impl Evaluator for BrowserEvaluator {
    fn platform(&self) -> &str {
        "browser"
    }

    async fn start(&self) -> Result<(), ReplError> {
        Ok(())
    }

    async fn eval(
        &self,
        _script: &str,
        _static_specifiers: &[String],
        _dynamic_specifiers: &[String],
        _wait_flag: bool,
    ) -> Result<Vec<Verdict>, ReplError> {
        Err(ReplError::EvaluatorTransport {
            platform: "browser".to_string(),
            reason: "no browser tab is connected over the relay transport (external collaborator, spec.md §1)"
                .to_string(),
        })
    }

    async fn stop(&self) -> Result<(), ReplError> {
        Ok(())
    }
}

impl Specify for BrowserEvaluator {
    fn specify(&self, versioned: &str) -> String {
        let path = versioned.strip_prefix("file://").unwrap_or(versioned);
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}
