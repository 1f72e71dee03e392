//! Parsed configuration threaded through to the server and driver
//! (SPEC_FULL.md §10.3).

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `(platform, executable_path)` pairs, one per `--evaluator` flag.
    pub evaluators: Vec<(String, String)>,
    pub log_level: String,
}
