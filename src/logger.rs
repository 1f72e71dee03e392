//! Logging setup (spec.md is silent; SPEC_FULL.md §10.2).
//!
//! `log` + `env_logger`, configured the way `cli/lib/util/logger.rs`
//! configures Deno's own - seeded from an env var renamed the same way
//! Deno renames `RUST_LOG` to `DENO_LOG` (here, `REPLETE_LOG`), with
//! per-module filter overrides for noisy transitive crates and
//! level-sensitive formatting.

use std::io::Write;

/// Install the process-wide logger. `maybe_level` overrides the
/// `REPLETE_LOG` env var when given (wired to `--log-level`).
pub fn init(maybe_level: Option<log::LevelFilter>) {
    let default_level = maybe_level.unwrap_or(log::LevelFilter::Info).to_string();

    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or("REPLETE_LOG", default_level)
            .write_style("REPLETE_LOG_STYLE"),
    )
    // the swc parser logs a span-level trace for every token on Debug;
    // drop it to Error so `--log-level debug` stays readable.
    .filter_module("swc_ecma_parser", log::LevelFilter::Error)
    .filter_module("swc_ecma_codegen", log::LevelFilter::Off)
    .filter_module("notify", log::LevelFilter::Warn)
    .filter_module("hyper_util", log::LevelFilter::Warn)
    .format(|buf, record| {
        if record.level() <= log::Level::Info {
            writeln!(buf, "{}", record.args())
        } else {
            writeln!(buf, "{} {} - {}", record.level(), record.target(), record.args())
        }
    })
    .init();
}
