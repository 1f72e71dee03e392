//! Subprocess evaluator (SPEC_FULL.md §11) - the external collaborator for
//! a spawned "Node-like / Deno-like process" runtime (spec.md §1).
//!
//! Speaks the same kind of line-delimited JSON the core's own stdio
//! protocol (`src/protocol.rs`) uses: one JSON object per line in, one out.
//! This is this crate's own wire format, not the guest runtime's - a real
//! evaluator executable is expected to implement this narrow contract
//! itself.

use std::cell::RefCell;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::capabilities::{Evaluator, Specify};
use crate::error::ReplError;
use crate::protocol::Verdict;

#[derive(Serialize)]
struct EvalRequest<'a> {
    script: &'a str,
    static_specifiers: &'a [String],
    dynamic_specifiers: &'a [String],
    wait: bool,
}

#[derive(Deserialize)]
struct EvalResponse {
    #[serde(default)]
    evaluation: Option<String>,
    #[serde(default)]
    exception: Option<String>,
}

pub struct SubprocessEvaluator {
    platform: String,
    executable: String,
    child: RefCell<Option<Child>>,
    // Taken out for the duration of one `eval` call and put back
    // afterwards, so no `RefCell` borrow is ever held across an `.await`.
    stdin: RefCell<Option<ChildStdin>>,
    stdout: RefCell<Option<BufReader<ChildStdout>>>,
}

impl SubprocessEvaluator {
    pub fn new(platform: String, executable: String) -> Self {
        SubprocessEvaluator {
            platform,
            executable,
            child: RefCell::new(None),
            stdin: RefCell::new(None),
            stdout: RefCell::new(None),
        }
    }

    fn transport_err(&self, reason: impl Into<String>) -> ReplError {
        ReplError::EvaluatorTransport {
            platform: self.platform.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait(?Send)]
impl Evaluator for SubprocessEvaluator {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn start(&self) -> Result<(), ReplError> {
        if self.child.borrow().is_some() {
            return Ok(());
        }
        let mut child = Command::new(&self.executable)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|err| self.transport_err(format!("failed to spawn {}: {err}", self.executable)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.transport_err("child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.transport_err("child has no stdout"))?;

        *self.child.borrow_mut() = Some(child);
        *self.stdin.borrow_mut() = Some(stdin);
        *self.stdout.borrow_mut() = Some(BufReader::new(stdout));
        log::info!("started {} evaluator at {}", self.platform, self.executable);
        Ok(())
    }

    async fn eval(
        &self,
        script: &str,
        static_specifiers: &[String],
        dynamic_specifiers: &[String],
        wait_flag: bool,
    ) -> Result<Vec<Verdict>, ReplError> {
        self.start().await?;

        let mut stdin = self
            .stdin
            .borrow_mut()
            .take()
            .ok_or_else(|| self.transport_err("evaluator not started"))?;
        let mut stdout = self
            .stdout
            .borrow_mut()
            .take()
            .ok_or_else(|| self.transport_err("evaluator not started"))?;

        let result = self
            .write_and_read(&mut stdin, &mut stdout, script, static_specifiers, dynamic_specifiers, wait_flag)
            .await;

        *self.stdin.borrow_mut() = Some(stdin);
        *self.stdout.borrow_mut() = Some(stdout);

        result
    }

    async fn stop(&self) -> Result<(), ReplError> {
        self.stdin.borrow_mut().take();
        self.stdout.borrow_mut().take();
        if let Some(mut child) = self.child.borrow_mut().take() {
            let _ = child.kill().await;
        }
        Ok(())
    }
}

impl SubprocessEvaluator {
    async fn write_and_read(
        &self,
        stdin: &mut ChildStdin,
        stdout: &mut BufReader<ChildStdout>,
        script: &str,
        static_specifiers: &[String],
        dynamic_specifiers: &[String],
        wait_flag: bool,
    ) -> Result<Vec<Verdict>, ReplError> {
        let request = EvalRequest {
            script,
            static_specifiers,
            dynamic_specifiers,
            wait: wait_flag,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| self.transport_err(format!("write failed: {err}")))?;

        let mut response_line = String::new();
        let bytes_read = stdout
            .read_line(&mut response_line)
            .await
            .map_err(|err| self.transport_err(format!("read failed: {err}")))?;
        if bytes_read == 0 {
            return Err(self.transport_err("evaluator closed its stdout"));
        }

        let response: EvalResponse = serde_json::from_str(response_line.trim_end())?;
        match (response.evaluation, response.exception) {
            (Some(rendering), _) => Ok(vec![Verdict::Evaluation(rendering)]),
            (None, Some(rendering)) => Ok(vec![Verdict::Exception(rendering)]),
            (None, None) => Err(self.transport_err("response had neither evaluation nor exception")),
        }
    }
}

impl Specify for SubprocessEvaluator {
    /// A spawned process reads modules straight off the local filesystem,
    /// so it wants a bare path rather than a versioned `file://` locator's
    /// URL form (spec.md §9, "some want bare file paths").
    fn specify(&self, versioned: &str) -> String {
        versioned.strip_prefix("file://").unwrap_or(versioned).to_string()
    }
}
