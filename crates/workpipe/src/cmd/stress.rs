use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, warn};
use workpipe_pool::{Outcome, Pool};

use crate::cmd::StressArgs;
use crate::exit::{
    pool_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE, VERIFY_FAILED,
};
use crate::output::{print_stress_report, OutputFormat, StressReport};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    verified: usize,
    mismatched: usize,
    errors: usize,
}

/// Payload for request `request` of caller `caller`: a unique marker padded to `size`.
pub(crate) fn marker(caller: usize, request: usize, size: usize) -> Bytes {
    let mut text = format!("caller={caller} request={request};");
    if text.len() < size {
        text.push_str(&".".repeat(size - text.len()));
    }
    Bytes::from(text)
}

pub fn run(args: StressArgs, format: OutputFormat) -> CliResult<i32> {
    if args.callers == 0 || args.requests == 0 {
        return Err(CliError::new(
            USAGE,
            "--callers and --requests must both be at least 1",
        ));
    }
    let config = args.pool.to_config()?;
    let timeout = config.request_timeout;
    let pool = Pool::start(config).map_err(|err| pool_error("pool start failed", err))?;
    let pool = Arc::new(pool);

    info!(
        callers = args.callers,
        requests = args.requests,
        workers = pool.config().workers,
        "stress run starting"
    );

    let (requests, size) = (args.requests, args.payload_size);
    let started = Instant::now();
    let handles = launch(args.callers, |caller, gate| {
        let pool = Arc::clone(&pool);
        thread::Builder::new()
            .name(format!("stress-caller-{caller}"))
            .spawn(move || {
                if !is_open(&gate) {
                    return Tally::default();
                }
                submit_all(&pool, caller, requests, size, timeout)
            })
    })?;

    let mut total = Tally::default();
    for handle in handles {
        let tally = handle
            .join()
            .map_err(|_| CliError::new(INTERNAL, "caller thread panicked"))?;
        total.verified += tally.verified;
        total.mismatched += tally.mismatched;
        total.errors += tally.errors;
    }
    let elapsed = started.elapsed();

    let stats = pool.stats();
    pool.shutdown();

    let submitted = args.callers * args.requests;
    print_stress_report(
        &StressReport {
            record: "stress",
            callers: args.callers,
            requests_per_caller: args.requests,
            total: submitted,
            verified: total.verified,
            mismatched: total.mismatched,
            errors: total.errors,
            elapsed_ms: elapsed.as_millis(),
            requests_per_sec: rate(submitted, elapsed),
            stats: stats.into(),
        },
        format,
    );

    if total.mismatched > 0 {
        return Err(CliError::new(
            VERIFY_FAILED,
            format!(
                "{} responses were delivered to the wrong caller or altered",
                total.mismatched
            ),
        ));
    }
    if total.errors > 0 {
        return Err(CliError::new(
            FAILURE,
            format!("{} of {submitted} requests failed", total.errors),
        ));
    }
    Ok(SUCCESS)
}

/// Closed while callers are being spawned so they all start together.
type StartGate = Arc<RwLock<bool>>;

/// Spawn every caller behind a shared gate.
///
/// If a spawn fails, the gate is released still closed: callers already
/// running return without submitting and are joined before the error is
/// returned.
fn launch<F>(callers: usize, mut spawn_caller: F) -> CliResult<Vec<JoinHandle<Tally>>>
where
    F: FnMut(usize, StartGate) -> io::Result<JoinHandle<Tally>>,
{
    let gate: StartGate = Arc::new(RwLock::new(false));
    let mut open = gate.write().unwrap_or_else(PoisonError::into_inner);
    let mut handles = Vec::with_capacity(callers);
    for caller in 0..callers {
        match spawn_caller(caller, Arc::clone(&gate)) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                drop(open);
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(CliError::new(
                    INTERNAL,
                    format!("failed to spawn caller {caller}: {err}"),
                ));
            }
        }
    }
    *open = true;
    Ok(handles)
}

/// Blocks until spawning is over; `true` if every caller started.
fn is_open(gate: &StartGate) -> bool {
    *gate.read().unwrap_or_else(PoisonError::into_inner)
}

fn submit_all(
    pool: &Pool,
    caller: usize,
    requests: usize,
    size: usize,
    timeout: Duration,
) -> Tally {
    let mut tally = Tally::default();
    for request in 0..requests {
        let payload = marker(caller, request, size);
        match pool.submit(payload.clone(), timeout) {
            Ok(Outcome::Success(reply)) if reply == payload => tally.verified += 1,
            Ok(outcome) => {
                tally.mismatched += 1;
                warn!(
                    caller,
                    request,
                    reply = %String::from_utf8_lossy(outcome.payload()),
                    "unexpected response"
                );
            }
            Err(err) => {
                tally.errors += 1;
                warn!(caller, request, error = %err, "request failed");
            }
        }
    }
    tally
}

fn rate(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}
