// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cmd::commands;
use cmd::common::{LogContext, Scope, parse_bucket, parse_where};
use schedlog::{EventKind, LogType, Reduction};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "nrlog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Capture directory (defaults to $SCHEDLOG_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// YAML engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Interval start, `YYYYMMDDhhmmss` or `YYYY-MM-DD hh:mm:ss`
    #[arg(long, global = true)]
    from: Option<String>,

    /// Interval end, inclusive
    #[arg(long, global = true)]
    to: Option<String>,

    /// Concurrent file reads per load
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Fail when any export cannot be read
    #[arg(long, global = true)]
    strict: bool,
}

/// Which rows a query looks at
#[derive(Args)]
struct Target {
    /// Log type: dl, ul or the export tag
    #[arg(long = "log")]
    log_type: LogType,

    #[arg(long)]
    cell: Option<i64>,

    /// UE group id
    #[arg(long)]
    ue: Option<i64>,
}

impl Target {
    fn scope(&self) -> Scope {
        Scope {
            cell: self.cell,
            ue: self.ue,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Files, rows and time range per log type, then cells and UE groups
    Describe,
    /// Reduce columns into time buckets
    Trend {
        #[command(flatten)]
        target: Target,
        #[arg(long = "column", required = true)]
        columns: Vec<String>,
        /// sum, mean, min, max, count, hist or ratio
        #[arg(long, default_value = "mean")]
        reduction: Reduction,
        /// Bucket width, e.g. 1, 500ms, 5s, 1m
        #[arg(long, default_value = "1s")]
        bucket: String,
        /// Keep rows where column is one of the values: column=v1,v2
        #[arg(long = "where")]
        clauses: Vec<String>,
    },
    /// Distinct value counts of one column
    Hist {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        column: String,
        /// Shares instead of counts (bucketed only)
        #[arg(long)]
        ratio: bool,
        /// Bucket width; overall counts when absent
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long = "where")]
        clauses: Vec<String>,
    },
    /// Block error rate per bucket
    Bler {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "1s")]
        bucket: String,
        /// Slot 0..19; 20 or more means all slots
        #[arg(long)]
        slot: Option<u32>,
    },
    /// Scheduling failure reasons, most frequent first
    FailReasons {
        #[command(flatten)]
        target: Target,
    },
    /// Rows flagged as harq-fail, self-maintain, dtx or dci0-lost
    Events {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        kind: EventKind,
    },
}

fn print(output: &str) {
    let mut stdout = std::io::stdout().lock();
    // A closed pipe is not an error for a batch report
    let _ = stdout.write_all(output.as_bytes());
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init();
    let cli = Cli::parse();

    let ctx = LogContext::from_args(
        cli.dir,
        cli.config.as_deref(),
        cli.from.as_deref(),
        cli.to.as_deref(),
        cli.workers,
        cli.strict,
    )?;

    match cli.command {
        Commands::Describe => commands::describe_command(&ctx, print).await,
        Commands::Trend {
            target,
            columns,
            reduction,
            bucket,
            clauses,
        } => {
            let filter = parse_where(&clauses)?;
            commands::trend_command(
                &ctx,
                target.log_type,
                target.scope(),
                &columns,
                reduction,
                parse_bucket(&bucket)?,
                filter.as_ref(),
                print,
            )
            .await
        }
        Commands::Hist {
            target,
            column,
            ratio,
            bucket,
            clauses,
        } => {
            let filter = parse_where(&clauses)?;
            let bucket = bucket.as_deref().map(parse_bucket).transpose()?;
            commands::hist_command(
                &ctx,
                target.log_type,
                target.scope(),
                &column,
                ratio,
                bucket,
                filter.as_ref(),
                print,
            )
            .await
        }
        Commands::Bler {
            target,
            bucket,
            slot,
        } => {
            commands::bler_command(
                &ctx,
                target.log_type,
                target.scope(),
                parse_bucket(&bucket)?,
                slot,
                print,
            )
            .await
        }
        Commands::FailReasons { target } => {
            commands::fail_reasons_command(&ctx, target.log_type, target.scope(), print).await
        }
        Commands::Events { target, kind } => {
            commands::events_command(&ctx, target.log_type, target.scope(), kind, print).await
        }
    }
}
