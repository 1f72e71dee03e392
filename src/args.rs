//! CLI flag surface (spec.md §6, SPEC_FULL.md §10.3).
//!
//! Deliberately thin: spec.md names the CLI itself as an external
//! collaborator the core only consumes the result of. This covers exactly
//! the flags needed to boot the binary - the module server's host/port,
//! one `--evaluator platform=path` flag per non-browser runtime, and the
//! log level - matching `cli/args/flags.rs`'s builder-API shape rather than
//! deno's full subcommand surface, which has no equivalent here.

use clap::{Arg, ArgAction, Command};

use crate::config::Config;

fn clap_root() -> Command {
    Command::new("replete")
        .bin_name("replete")
        .about("Multi-runtime evaluation service for the guest language")
        .arg(
            Arg::new("host")
                .long("host")
                .help("Module server bind address")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Module server port")
                .value_parser(clap::value_parser!(u16))
                .default_value("4242"),
        )
        .arg(
            Arg::new("evaluator")
                .long("evaluator")
                .help("platform=executable-path, repeatable, one per non-browser runtime")
                .action(ArgAction::Append)
                .value_name("platform=path"),
        )
        .arg(
            Arg::new("log-level")
                .short('L')
                .long("log-level")
                .help("Set log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
}

/// Parse `std::env::args()` into a [`Config`]. Panics on a malformed
/// `--evaluator` value or a clap usage error, matching the teacher's
/// `flags::flags_from_vec` convention of failing fast at startup.
pub fn parse() -> Config {
    let matches = clap_root().get_matches();
    parse_from(&matches)
}

fn parse_from(matches: &clap::ArgMatches) -> Config {
    let host = matches.get_one::<String>("host").unwrap().clone();
    let port = *matches.get_one::<u16>("port").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap().clone();

    let mut evaluators = Vec::new();
    if let Some(values) = matches.get_many::<String>("evaluator") {
        for value in values {
            let (platform, path) = value.split_once('=').unwrap_or_else(|| {
                panic!("--evaluator expects platform=path, got {value:?}")
            });
            evaluators.push((platform.to_string(), path.to_string()));
        }
    }

    Config {
        host,
        port,
        evaluators,
        log_level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags_given() {
        let matches = clap_root().get_matches_from(["replete"]);
        let config = parse_from(&matches);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4242);
        assert!(config.evaluators.is_empty());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn parses_repeated_evaluator_flags() {
        let matches = clap_root().get_matches_from([
            "replete",
            "--evaluator",
            "node=/usr/bin/node-evaluator",
            "--evaluator",
            "deno=/usr/bin/deno-evaluator",
            "--port",
            "9000",
        ]);
        let config = parse_from(&matches);
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.evaluators,
            vec![
                ("node".to_string(), "/usr/bin/node-evaluator".to_string()),
                ("deno".to_string(), "/usr/bin/deno-evaluator".to_string()),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "platform=path")]
    fn rejects_evaluator_flag_without_equals() {
        let matches = clap_root().get_matches_from(["replete", "--evaluator", "node"]);
        parse_from(&matches);
    }
}
