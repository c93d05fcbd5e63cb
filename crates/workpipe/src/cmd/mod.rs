use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use workpipe_frame::DEFAULT_MAX_PAYLOAD;
use workpipe_pool::PoolConfig;
use workpipe_transport::TransportKind;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod run;
pub mod stress;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send doubling-length packets through a pool and verify every echo.
    Run(RunArgs),
    /// Hammer a pool from many caller threads and check responses are not crossed.
    Stress(StressArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Stress(args) => stress::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Anonymous OS pipes.
    Pipe,
    /// Unix stream socket pairs.
    UnixPair,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Pipe => TransportKind::Pipe,
            TransportArg::UnixPair => TransportKind::UnixPair,
        }
    }
}

/// Pool settings shared by every subcommand that starts a pool.
#[derive(Args, Debug)]
pub struct PoolArgs {
    /// Number of worker threads.
    #[arg(long, short = 'w', default_value_t = 2, env = "WORKPIPE_WORKERS")]
    pub workers: usize,
    /// Byte stream backing the down and up channels.
    #[arg(long, value_enum, default_value = "pipe", env = "WORKPIPE_TRANSPORT")]
    pub transport: TransportArg,
    /// Per-request timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", env = "WORKPIPE_TIMEOUT")]
    pub timeout: String,
    /// Largest payload accepted on either channel, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD, env = "WORKPIPE_MAX_PAYLOAD")]
    pub max_payload: usize,
}

impl PoolArgs {
    pub fn to_config(&self) -> CliResult<PoolConfig> {
        let config = PoolConfig::default()
            .with_workers(self.workers)
            .with_transport(self.transport.into())
            .with_request_timeout(parse_duration(&self.timeout)?)
            .with_max_payload_size(self.max_payload);
        config
            .validate()
            .map_err(|err| CliError::new(USAGE, err.to_string()))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub pool: PoolArgs,
    /// Number of packets; packet i is 2^i bytes long.
    #[arg(long, short = 'n', default_value_t = 16)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct StressArgs {
    #[command(flatten)]
    pub pool: PoolArgs,
    /// Concurrent caller threads.
    #[arg(long, default_value_t = 8)]
    pub callers: usize,
    /// Requests submitted by each caller.
    #[arg(long, default_value_t = 100)]
    pub requests: usize,
    /// Payload size in bytes; each payload starts with a caller/request marker.
    #[arg(long, default_value_t = 64)]
    pub payload_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
