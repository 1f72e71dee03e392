//! Concrete evaluators (spec.md §4.8, §9 "Dynamic dispatch over
//! evaluators"; SPEC_FULL.md §11).
//!
//! The core only depends on the narrow [`crate::capabilities::Evaluator`]
//! contract; this module supplies the two variants this crate ships so the
//! `platform` tag on an incoming command actually dispatches to something -
//! a subprocess evaluator for command-line runtimes, and a stub for the
//! browser transport, which spec.md §1 keeps external.

pub mod browser;
pub mod subprocess;

use std::collections::HashMap;
use std::rc::Rc;

use crate::capabilities::Evaluator;
use crate::config::Config;

/// Build the `platform -> evaluator` registry [`crate::driver::Driver`]
/// dispatches on: one [`subprocess::SubprocessEvaluator`] per
/// `--evaluator platform=path` flag, plus the always-present `"browser"`
/// stub.
pub fn build_registry(config: &Config) -> HashMap<String, Rc<dyn Evaluator>> {
    let mut registry: HashMap<String, Rc<dyn Evaluator>> = HashMap::new();
    registry.insert(
        "browser".to_string(),
        Rc::new(browser::BrowserEvaluator::new(config.host.clone(), config.port)),
    );
    for (platform, path) in &config.evaluators {
        registry.insert(
            platform.clone(),
            Rc::new(subprocess::SubprocessEvaluator::new(platform.clone(), path.clone())),
        );
    }
    registry
}
