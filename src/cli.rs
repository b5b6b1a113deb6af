use crate::nfr::NfrRule;
use crate::report::source::TimestampMode;
use clap::Parser;
use std::path::PathBuf;

/// Load Test Report Generator - Turns a results file into report data and NFR verdicts
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Results file: delimited text with a header row
    #[clap(help_heading = "Core Options")]
    pub results: PathBuf,

    /// Directory to write the report data into (must be absent or empty)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_DIR, help_heading = "Core Options")]
    pub output_dir: PathBuf,

    /// JSON report configuration file; flags below override its values
    #[clap(short = 'c', long, help_heading = "Core Options")]
    pub config: Option<PathBuf>,

    /// Only report these labels (comma-separated)
    #[clap(long, value_delimiter = ',', help_heading = "Filtering")]
    pub include: Vec<String>,

    /// Leave these labels out of the report (comma-separated)
    #[clap(long, value_delimiter = ',', help_heading = "Filtering")]
    pub exclude: Vec<String>,

    /// Apdex satisfied threshold in milliseconds
    #[clap(long, help_heading = "Summaries")]
    pub apdex_satisfied: Option<i64>,

    /// Apdex tolerated threshold in milliseconds
    #[clap(long, help_heading = "Summaries")]
    pub apdex_tolerated: Option<i64>,

    /// Percentiles to export in the statistics summary (comma-separated)
    #[clap(long, value_delimiter = ',', help_heading = "Summaries")]
    pub percentiles: Vec<f64>,

    /// Field delimiter of the results file
    #[clap(long, help_heading = "Input Format")]
    pub delimiter: Option<char>,

    /// Whether the timestamp column holds the sample start or end time
    #[clap(long, value_enum, help_heading = "Input Format")]
    pub timestamp_mode: Option<TimestampMode>,

    /// NFR rule as "label,criterion,symbol,value", e.g. "login,Avg,<=,250" (repeatable)
    #[clap(long = "nfr", value_parser = parse_nfr_rule, help_heading = "NFR Evaluation")]
    pub nfr: Vec<NfrRule>,

    /// Worker threads replaying the results file for NFR evaluation (0 = one per CPU)
    #[clap(long, default_value_t = 0, help_heading = "NFR Evaluation")]
    pub replay_workers: usize,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Also write log output to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

/// Parse an NFR rule from its command-line form.
fn parse_nfr_rule(s: &str) -> Result<NfrRule, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["loadtest-report", "results.csv"]);
        assert_eq!(args.results, PathBuf::from("results.csv"));
        assert_eq!(args.output_dir, PathBuf::from(crate::defaults::OUTPUT_DIR));
        assert!(args.config.is_none());
        assert!(args.include.is_empty());
        assert!(args.percentiles.is_empty());
        assert!(args.nfr.is_empty());
        assert_eq!(args.replay_workers, 0);
        assert!(!args.verbose);
    }

    #[test]
    fn test_lists_and_rules() {
        let args = Args::parse_from([
            "loadtest-report",
            "results.csv",
            "--include",
            "home,login",
            "--percentiles",
            "50,99.9",
            "--timestamp-mode",
            "end",
            "--nfr",
            "login,Avg,<=,250",
            "--nfr",
            "search, with comma,Error Rate,<,1",
        ]);
        assert_eq!(args.include, vec!["home".to_string(), "login".to_string()]);
        assert_eq!(args.percentiles, vec![50.0, 99.9]);
        assert_eq!(args.timestamp_mode, Some(TimestampMode::End));
        assert_eq!(args.nfr.len(), 2);
        assert_eq!(args.nfr[0], NfrRule::new("login", "Avg", "<=", "250"));
        assert_eq!(args.nfr[1].label, "search, with comma");
        assert_eq!(args.nfr[1].criterion, "Error Rate");
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        assert!(Args::try_parse_from(["loadtest-report", "results.csv", "--nfr", "login,Avg"]).is_err());
        assert!(parse_nfr_rule(",Avg,<,1").is_err());
    }
}
