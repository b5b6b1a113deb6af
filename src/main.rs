//! # Load Test Report Generator - Main Entry Point
//!
//! The main function:
//! 1. **Initialize logging**: coloured console output, optional log file
//! 2. **Parse arguments** and merge them over the optional configuration file
//! 3. **Generate the report**: one pass over the results file, data written
//!    to the output directory
//! 4. **Print a statistics table** for the labels in the report
//! 5. **Evaluate NFR rules** if any were given, by replaying the results
//!    file into a live registry from a pool of worker threads
//!
//! Exits with an error when the report cannot be generated or when any
//! NFR rule fails.

use anyhow::{bail, Context, Result};
use clap::Parser;
use loadtest_report::{
    cli::Args, logging, utils, LiveRegistry, ReportConfig, ReportGenerator, SampleSource, StatSummary, Verdict,
    VERSION,
};
use serde_json::Value;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so the log file is flushed on exit.
    let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting load test report generator v{}", VERSION);
    debug!("Arguments: {:?}", args);

    let mut config = match &args.config {
        Some(path) => ReportConfig::from_file(path)?,
        None => ReportConfig::default(),
    };
    config.apply_args(&args);
    config.validate()?;

    let generator = ReportGenerator::new(config.clone());
    let (context, summary) = generator
        .generate(&args.results, &args.output_dir)
        .with_context(|| format!("Failed to generate report from {}", args.results.display()))?;

    if summary.rows_skipped > 0 {
        info!("{} malformed row(s) were skipped", summary.rows_skipped);
    }
    if let Some(statistics) = context.get("statisticsSummary") {
        print_statistics(statistics);
    }

    if args.nfr.is_empty() {
        info!("Report generation completed successfully");
        return Ok(());
    }

    let registry = LiveRegistry::new();
    let source = SampleSource::new(&args.results)
        .with_delimiter(config.delimiter_byte())
        .with_timestamp_mode(config.timestamp_mode);
    registry
        .replay(&source, utils::worker_count(args.replay_workers))
        .context("Failed to replay results for NFR evaluation")?;

    let verdicts = registry.evaluate_all(&args.nfr);
    print_verdicts(&verdicts);

    let failed = verdicts.iter().filter(|v| v.failed()).count();
    if failed > 0 {
        error!("{} of {} NFR rule(s) failed", failed, verdicts.len());
        bail!("{} NFR rule(s) failed", failed);
    }
    info!("All NFR rules passed");
    Ok(())
}

/// Print one row per label plus the total row.
fn print_statistics(statistics: &Value) {
    let widths = [24, 9, 8, 10, 10, 10, 14, 12];
    println!("{}", utils::table_separator(&widths));
    println!(
        "{}",
        utils::table_row(
            &["Label", "Samples", "Errors", "Mean", "Min", "Max", "Throughput", "Received"],
            &widths
        )
    );
    println!("{}", utils::table_separator(&widths));

    let mut rows: Vec<(String, &Value)> = Vec::new();
    if let Some(items) = statistics.get("items").and_then(Value::as_object) {
        rows.extend(items.iter().map(|(label, row)| (label.clone(), row)));
    }
    if let Some(overall) = statistics.get("overall") {
        rows.push(("Total".to_string(), overall));
    }

    for (label, row) in rows {
        let Ok(stats) = serde_json::from_value::<StatSummary>(row.clone()) else {
            debug!("Skipping unreadable statistics row for {}", label);
            continue;
        };
        let samples = stats.count.to_string();
        let errors = utils::format_percent(stats.error_rate);
        let mean = utils::format_millis(stats.mean);
        let min = utils::format_millis(stats.min as f64);
        let max = utils::format_millis(stats.max as f64);
        let throughput = utils::format_request_rate(stats.throughput);
        let received = utils::format_rate(stats.bytes_per_second);
        println!(
            "{}",
            utils::table_row(
                &[&label, &samples, &errors, &mean, &min, &max, &throughput, &received],
                &widths
            )
        );
    }
    println!("{}", utils::table_separator(&widths));
}

fn print_verdicts(verdicts: &[Verdict]) {
    let widths = [40, 8, 48];
    println!("{}", utils::table_separator(&widths));
    println!("{}", utils::table_row(&["Rule", "Result", "Detail"], &widths));
    println!("{}", utils::table_separator(&widths));
    for verdict in verdicts {
        let result = if verdict.skipped {
            "SKIPPED"
        } else if verdict.passed {
            "PASS"
        } else {
            "FAIL"
        };
        let rule = verdict.rule.to_string();
        println!(
            "{}",
            utils::table_row(&[&rule, result, &verdict.message], &widths)
        );
    }
    println!("{}", utils::table_separator(&widths));
}
