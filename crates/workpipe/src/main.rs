mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "workpipe", version, about = "Worker pool over framed pipes")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true, env = "WORKPIPE_FORMAT")]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        global = true,
        env = "WORKPIPE_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        global = true,
        env = "WORKPIPE_LOG_LEVEL"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "workpipe",
            "run",
            "--workers",
            "4",
            "--count",
            "8",
            "--transport",
            "unix-pair",
        ])
        .expect("run args should parse");

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.pool.workers, 4);
                assert_eq!(args.count, 8);
                assert_eq!(args.pool.transport, cmd::TransportArg::UnixPair);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_defaults_match_classic_driver() {
        let cli = Cli::try_parse_from(["workpipe", "run"]).expect("run should parse");
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.pool.workers, 2);
                assert_eq!(args.count, 16);
                assert_eq!(args.pool.timeout, "5s");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_stress_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "workpipe",
            "stress",
            "--callers",
            "3",
            "--requests",
            "10",
            "--format",
            "json",
            "--log-level",
            "warn",
        ])
        .expect("stress args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert!(matches!(cli.command, Command::Stress(_)));
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = Cli::try_parse_from(["workpipe", "run", "--transport", "carrier-pigeon"])
            .expect_err("unknown transport should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
