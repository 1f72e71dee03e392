//! Evaluator driver (spec.md §4.7, component C7).
//!
//! For one incoming command: analyze, resolve + version every specifier,
//! replize the source into a payload script, and hand it to whichever
//! evaluator the command's `platform` names. Implements the state machine
//! from spec.md §4.7 - `received -> analyzing -> resolving -> versioning ->
//! dispatched -> delivered|failed` - as a single `Result`-returning
//! function rather than an explicit state enum, since every transition here
//! is just "the next `?`".

use std::collections::HashMap;
use std::rc::Rc;

use crate::analyzer;
use crate::cache::Core;
use crate::capabilities::{Evaluator, Specify};
use crate::error::ReplError;
use crate::locator::Locator;
use crate::protocol::{Command, CommandResult, Verdict};
use crate::replize;

pub struct Driver {
    core: Rc<Core>,
    evaluators: HashMap<String, Rc<dyn Evaluator>>,
}

impl Driver {
    pub fn new(core: Rc<Core>, evaluators: HashMap<String, Rc<dyn Evaluator>>) -> Self {
        Driver { core, evaluators }
    }

    /// Run one command end to end and render its outcome as the result
    /// line(s) spec.md §6 defines. Never returns an `Err` itself - per
    /// spec.md §7, "no exception escapes the core's top-level message
    /// loop"; every failure kind becomes an `err`-carrying [`CommandResult`]
    /// instead. Broadcast evaluators may report more than one verdict per
    /// command (spec.md §7); each becomes its own result line sharing `id`.
    pub async fn handle(&self, command: Command) -> Vec<CommandResult> {
        let id = command.id.clone();
        match self.run(command).await {
            Ok(verdicts) => verdicts
                .into_iter()
                .map(|verdict| CommandResult::from_verdict(verdict, id.clone()))
                .collect(),
            Err(err) => vec![CommandResult::err(err.to_string(), id)],
        }
    }

    async fn run(&self, command: Command) -> Result<Vec<Verdict>, ReplError> {
        let evaluator = self.evaluators.get(&command.platform).ok_or_else(|| ReplError::EvaluatorTransport {
            platform: command.platform.clone(),
            reason: "no evaluator registered for this platform".to_string(),
        })?;

        // received -> analyzing
        let locator_label = command.locator.clone().unwrap_or_default();
        let analysis = analyzer::analyze(&locator_label, &command.source)?;

        let parent = match &command.locator {
            Some(raw) => Some(Locator::parse(raw).map_err(|err| ReplError::Resolve {
                specifier: raw.clone(),
                parent: raw.clone(),
                reason: err.to_string(),
            })?),
            None => None,
        };

        // analyzing -> resolving -> versioning
        let static_specifiers = self
            .resolve_and_version(analysis.imports.iter().map(|i| i.specifier.as_str()), parent.as_ref(), evaluator.as_ref())
            .await?;
        let dynamic_specifiers = self
            .resolve_and_version(analysis.dynamics.iter().map(|d| d.value.as_str()), parent.as_ref(), evaluator.as_ref())
            .await?;

        // versioning -> dispatched
        let replized = replize::replize(&command.source, &analysis, &dynamic_specifiers, &command.scope)?;
        let verdicts = evaluator
            .eval(&replized.script, &static_specifiers, &dynamic_specifiers, true)
            .await?;

        // dispatched -> delivered
        Ok(verdicts)
    }

    /// Resolve then versionize each specifier in source order, projecting
    /// it through the evaluator's own [`Specify`] hook (spec.md §4.7 step
    /// 2, same operation §4.6 step 2 does for the module server).
    async fn resolve_and_version<'a>(
        &self,
        specifiers: impl Iterator<Item = &'a str>,
        parent: Option<&Locator>,
        evaluator: &dyn Evaluator,
    ) -> Result<Vec<String>, ReplError> {
        let mut resolved = Vec::new();
        for specifier in specifiers {
            let parent = parent.ok_or_else(|| ReplError::Resolve {
                specifier: specifier.to_string(),
                parent: String::new(),
                reason: "source imports but no parent locator was given".to_string(),
            })?;
            let locator = self.core.locate_cached(specifier, parent).await?;
            let versioned = self.core.versionize(&locator).await;
            resolved.push(evaluator.specify(&versioned));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    use async_trait::async_trait;

    use crate::capabilities::{Mime, Read, Resolve, Watch};

    struct FakeFs {
        files: RefCell<Map<String, String>>,
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
    impl Read for FakeFs {
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

    impl Mime for FakeFs {
        fn mime(&self, locator: &Locator) -> Option<String> {
            locator
                .as_str()
                .ends_with(".js")
                .then(|| crate::capabilities::MODULE_MEDIA_TYPE.to_string())
        }
    }

    struct EchoEvaluator;

    #[async_trait(?Send)]
    impl Evaluator for EchoEvaluator {
        fn platform(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<(), ReplError> {
            Ok(())
        }

        async fn eval(
            &self,
            script: &str,
            _static_specifiers: &[String],
            _dynamic_specifiers: &[String],
            _wait_flag: bool,
        ) -> Result<Vec<Verdict>, ReplError> {
            Ok(vec![Verdict::Evaluation(format!("{} chars", script.len()))])
        }

        async fn stop(&self) -> Result<(), ReplError> {
            Ok(())
        }
    }

    impl Specify for EchoEvaluator {
        fn specify(&self, versioned: &str) -> String {
            versioned.to_string()
        }
    }

    fn make_driver(files: Vec<(&str, &str)>) -> Driver {
        let fs = Rc::new(FakeFs {
            files: RefCell::new(files.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
        });
        let core = Core::new(fs.clone(), fs.clone(), fs.clone(), fs);
        let mut evaluators: Map<String, Rc<dyn Evaluator>> = Map::new();
        evaluators.insert("test".to_string(), Rc::new(EchoEvaluator));
        Driver::new(core, evaluators)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_platform_surfaces_as_err_result() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let driver = make_driver(vec![]);
                let command = Command {
                    source: "1;".to_string(),
                    locator: None,
                    platform: "nonexistent".to_string(),
                    scope: String::new(),
                    id: None,
                };
                let results = driver.handle(command).await;
                assert_eq!(results.len(), 1);
                assert!(results[0].err.is_some());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn command_without_imports_dispatches_directly() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let driver = make_driver(vec![]);
                let command = Command {
                    source: "1 + 1;".to_string(),
                    locator: None,
                    platform: "test".to_string(),
                    scope: "S".to_string(),
                    id: Some(serde_json::json!(1)),
                };
                let results = driver.handle(command).await;
                assert_eq!(results.len(), 1);
                assert!(results[0].evaluation.is_some());
                assert_eq!(results[0].id, Some(serde_json::json!(1)));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_parent_locator_for_import_is_an_err_result() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let driver = make_driver(vec![]);
                let command = Command {
                    source: "import x from \"./m.js\"; x;".to_string(),
                    locator: None,
                    platform: "test".to_string(),
                    scope: String::new(),
                    id: None,
                };
                let results = driver.handle(command).await;
                assert!(results[0].err.is_some());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn resolves_imports_against_parent_locator() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let driver = make_driver(vec![("file:///m.js", "export default 1;\n")]);
                let command = Command {
                    source: "import x from \"./m.js\"; x;".to_string(),
                    locator: Some("file:///c.js".to_string()),
                    platform: "test".to_string(),
                    scope: String::new(),
                    id: None,
                };
                let results = driver.handle(command).await;
                assert!(results[0].evaluation.is_some());
            })
            .await;
    }
}
