use std::time::Instant;

use bytes::Bytes;
use tracing::{info, warn};
use workpipe_pool::{Outcome, Pool};

use crate::cmd::RunArgs;
use crate::exit::{pool_error, CliError, CliResult, SUCCESS, USAGE, VERIFY_FAILED};
use crate::output::{OutputFormat, PacketPrinter, PacketRecord, RunSummary};

/// Fill byte for packet `index`: `A`, `B`, ... `Z`, then `A` again.
pub(crate) fn fill_byte(index: usize) -> u8 {
    b'A' + (index % 26) as u8
}

/// Length of packet `index`, or `None` once it no longer fits in `usize`.
pub(crate) fn packet_length(index: usize) -> Option<usize> {
    u32::try_from(index)
        .ok()
        .and_then(|shift| 1usize.checked_shl(shift))
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.pool.to_config()?;
    let timeout = config.request_timeout;

    if let Some(last) = args.count.checked_sub(1) {
        match packet_length(last) {
            Some(length) if length <= config.max_payload_size => {}
            _ => {
                return Err(CliError::new(
                    USAGE,
                    format!(
                        "--count {} needs packets larger than the {} byte payload limit",
                        args.count, config.max_payload_size
                    ),
                ))
            }
        }
    }

    let pool = Pool::start(config).map_err(|err| pool_error("pool start failed", err))?;
    info!(
        workers = pool.config().workers,
        count = args.count,
        "sending packets"
    );

    let started = Instant::now();
    let mut printer = PacketPrinter::new(format);
    let mut mismatches = 0usize;

    for index in 0..args.count {
        let fill = fill_byte(index);
        let length = packet_length(index).unwrap_or_default();
        let payload = Bytes::from(vec![fill; length]);

        let outcome = pool
            .submit(payload.clone(), timeout)
            .map_err(|err| pool_error(&format!("packet {index} failed"), err))?;
        let ok = matches!(&outcome, Outcome::Success(reply) if *reply == payload);
        if !ok {
            mismatches += 1;
            warn!(
                index,
                length,
                reply_length = outcome.payload().len(),
                success = outcome.is_success(),
                "response does not match request"
            );
        }

        printer.record(PacketRecord {
            record: "packet",
            index,
            length,
            fill: char::from(fill),
            ok,
        });
    }

    let stats = pool.stats();
    let report = pool.shutdown();
    info!(joined = report.workers_joined, "pool stopped");

    printer.finish(&RunSummary {
        record: "summary",
        packets: args.count,
        workers: stats.configured_workers,
        transport: pool.config().transport.name(),
        elapsed_ms: started.elapsed().as_millis(),
        stats: stats.into(),
    });

    if mismatches > 0 {
        return Err(CliError::new(
            VERIFY_FAILED,
            format!("{mismatches} of {} packets did not match", args.count),
        ));
    }
    Ok(SUCCESS)
}
