use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use workpipe_pool::PoolStats;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One verified request/response pair from `run`.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub record: &'static str,
    pub index: usize,
    pub length: usize,
    pub fill: char,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsOutput {
    pub configured_workers: usize,
    pub active_workers: usize,
    pub idle_workers: usize,
    pub outstanding: usize,
    pub completed: u64,
    pub failed_replies: u64,
    pub timed_out: u64,
    pub orphaned_responses: u64,
    pub packets_down: u64,
    pub packets_up: u64,
    pub peak_channel_readers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl From<PoolStats> for StatsOutput {
    fn from(stats: PoolStats) -> Self {
        Self {
            configured_workers: stats.configured_workers,
            active_workers: stats.active_workers,
            idle_workers: stats.idle_workers,
            outstanding: stats.outstanding,
            completed: stats.completed,
            failed_replies: stats.failed_replies,
            timed_out: stats.timed_out,
            orphaned_responses: stats.orphaned_responses,
            packets_down: stats.packets_down,
            packets_up: stats.packets_up,
            peak_channel_readers: stats.peak_channel_readers,
            fault: stats.fault,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub record: &'static str,
    pub packets: usize,
    pub workers: usize,
    pub transport: &'static str,
    pub elapsed_ms: u128,
    pub stats: StatsOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub record: &'static str,
    pub callers: usize,
    pub requests_per_caller: usize,
    pub total: usize,
    pub verified: usize,
    pub mismatched: usize,
    pub errors: usize,
    pub elapsed_ms: u128,
    pub requests_per_sec: f64,
    pub stats: StatsOutput,
}

/// Prints `run` results as they arrive (json, pretty) or at the end (table).
pub struct PacketPrinter {
    format: OutputFormat,
    rows: Vec<PacketRecord>,
}

impl PacketPrinter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            rows: Vec::new(),
        }
    }

    pub fn record(&mut self, record: PacketRecord) {
        match self.format {
            OutputFormat::Json => print_json(&record),
            OutputFormat::Pretty => println!("{}", pretty_line(&record)),
            OutputFormat::Table => self.rows.push(record),
        }
    }

    pub fn finish(self, summary: &RunSummary) {
        match self.format {
            OutputFormat::Json => print_json(summary),
            OutputFormat::Pretty => {}
            OutputFormat::Table => {
                let mut table = new_table(vec!["#", "LENGTH", "FILL", "STATUS"]);
                for row in &self.rows {
                    table.add_row(vec![
                        row.index.to_string(),
                        row.length.to_string(),
                        row.fill.to_string(),
                        status_text(row.ok).to_string(),
                    ]);
                }
                println!("{table}");
                print_stats_table(&summary.stats);
            }
        }
    }
}

pub fn print_stress_report(report: &StressReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Pretty => {
            println!(
                "callers={} requests={} verified={} mismatched={} errors={} elapsed_ms={} rate={:.0}/s",
                report.callers,
                report.total,
                report.verified,
                report.mismatched,
                report.errors,
                report.elapsed_ms,
                report.requests_per_sec
            );
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["callers".to_string(), report.callers.to_string()])
                .add_row(vec![
                    "requests_per_caller".to_string(),
                    report.requests_per_caller.to_string(),
                ])
                .add_row(vec!["verified".to_string(), report.verified.to_string()])
                .add_row(vec!["mismatched".to_string(), report.mismatched.to_string()])
                .add_row(vec!["errors".to_string(), report.errors.to_string()])
                .add_row(vec!["elapsed_ms".to_string(), report.elapsed_ms.to_string()])
                .add_row(vec![
                    "requests_per_sec".to_string(),
                    format!("{:.0}", report.requests_per_sec),
                ]);
            println!("{table}");
            print_stats_table(&report.stats);
        }
    }
}

fn print_stats_table(stats: &StatsOutput) {
    let mut table = new_table(vec!["STAT", "VALUE"]);
    table
        .add_row(vec![
            "workers".to_string(),
            format!("{}/{}", stats.active_workers, stats.configured_workers),
        ])
        .add_row(vec!["completed".to_string(), stats.completed.to_string()])
        .add_row(vec![
            "failed_replies".to_string(),
            stats.failed_replies.to_string(),
        ])
        .add_row(vec!["timed_out".to_string(), stats.timed_out.to_string()])
        .add_row(vec!["orphaned".to_string(), stats.orphaned_responses.to_string()])
        .add_row(vec![
            "peak_channel_readers".to_string(),
            stats.peak_channel_readers.to_string(),
        ]);
    if let Some(fault) = &stats.fault {
        table.add_row(vec!["fault".to_string(), fault.clone()]);
    }
    println!("{table}");
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn pretty_line(record: &PacketRecord) -> String {
    if record.ok {
        format!("Checked packet, length={}", record.length)
    } else {
        format!("Packet mismatch, length={}", record.length)
    }
}

fn status_text(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "MISMATCH"
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
