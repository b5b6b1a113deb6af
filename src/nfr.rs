//! Non-functional requirement rules and their evaluation.
//!
//! A rule names a label, a criterion, a comparison symbol and a threshold,
//! all kept as the strings the user typed. Parsing happens at evaluation
//! time so that a bad rule produces a failed verdict with a diagnostic
//! instead of aborting the run.

use crate::metrics::StatCalculator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric a rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Arithmetic mean of elapsed times.
    Avg,
    Min,
    Max,
    /// Percentage of failed samples.
    ErrorRate,
    /// Samples per second over the label's wall-clock span.
    SampleRate,
}

impl Criterion {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Avg" => Some(Self::Avg),
            "Min" => Some(Self::Min),
            "Max" => Some(Self::Max),
            "Error Rate" | "ErrorRate" => Some(Self::ErrorRate),
            "Sample Rate" | "SampleRate" => Some(Self::SampleRate),
            _ => None,
        }
    }

    /// Derive this criterion's value from a statistics snapshot.
    pub fn measure(&self, stats: &StatCalculator) -> f64 {
        match self {
            Self::Avg => stats.mean(),
            Self::Min => stats.min().unwrap_or(0) as f64,
            Self::Max => stats.max().unwrap_or(0) as f64,
            Self::ErrorRate => stats.error_percentage(),
            Self::SampleRate => stats.throughput(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => write!(f, "Avg"),
            Self::Min => write!(f, "Min"),
            Self::Max => write!(f, "Max"),
            Self::ErrorRate => write!(f, "Error Rate"),
            Self::SampleRate => write!(f, "Sample Rate"),
        }
    }
}

/// Comparison applied as `measured <symbol> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    Less,
    LessOrEqual,
    GreaterOrEqual,
    Greater,
}

impl Comparison {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "=" => Some(Self::Equal),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            ">=" => Some(Self::GreaterOrEqual),
            ">" => Some(Self::Greater),
            _ => None,
        }
    }

    pub fn holds(&self, measured: f64, threshold: f64) -> bool {
        match self {
            Self::Equal => measured == threshold,
            Self::Less => measured < threshold,
            Self::LessOrEqual => measured <= threshold,
            Self::GreaterOrEqual => measured >= threshold,
            Self::Greater => measured > threshold,
        }
    }
}

/// One user-defined threshold check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfrRule {
    pub label: String,
    pub criterion: String,
    pub symbol: String,
    pub value: String,
}

impl NfrRule {
    pub fn new(
        label: impl Into<String>,
        criterion: impl Into<String>,
        symbol: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            criterion: criterion.into(),
            symbol: symbol.into(),
            value: value.into(),
        }
    }

    /// Check this rule against a snapshot of the label's statistics.
    /// `None` means the label has seen no traffic and the rule is skipped.
    pub fn check(&self, stats: Option<&StatCalculator>) -> Verdict {
        let Some(stats) = stats else {
            return self.verdict(None, false, true, "no samples recorded for label".to_string());
        };
        let Some(criterion) = Criterion::parse(&self.criterion) else {
            return self.verdict(None, false, false, format!("unknown criterion \"{}\"", self.criterion));
        };
        let Some(comparison) = Comparison::parse(&self.symbol) else {
            return self.verdict(None, false, false, format!("unknown symbol \"{}\"", self.symbol));
        };
        let threshold = match self.value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return self.verdict(None, false, false, format!("invalid threshold \"{}\"", self.value));
            }
        };

        let measured = criterion.measure(stats);
        let passed = comparison.holds(measured, threshold);
        let message = format!(
            "{} {} = {:.2} {} {}",
            self.label,
            criterion,
            measured,
            self.symbol.trim(),
            threshold
        );
        self.verdict(Some(measured), passed, false, message)
    }

    fn verdict(&self, actual: Option<f64>, passed: bool, skipped: bool, message: String) -> Verdict {
        Verdict {
            rule: self.clone(),
            actual,
            passed,
            skipped,
            message,
        }
    }
}

impl fmt::Display for NfrRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.label, self.criterion, self.symbol, self.value)
    }
}

/// Parses `label,criterion,symbol,value`. The label may itself contain
/// commas; the last three fields are taken from the right.
impl FromStr for NfrRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(4, ',');
        let value = parts.next();
        let symbol = parts.next();
        let criterion = parts.next();
        let label = parts.next();
        match (label, criterion, symbol, value) {
            (Some(label), Some(criterion), Some(symbol), Some(value)) if !label.trim().is_empty() => {
                Ok(NfrRule::new(label.trim(), criterion.trim(), symbol.trim(), value.trim()))
            }
            _ => Err(format!(
                "Invalid NFR rule \"{}\", expected label,criterion,symbol,value",
                s
            )),
        }
    }
}

/// Outcome of checking one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub rule: NfrRule,
    pub actual: Option<f64>,
    pub passed: bool,
    pub skipped: bool,
    pub message: String,
}

impl Verdict {
    pub fn failed(&self) -> bool {
        !self.passed && !self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;

    fn stats(values: &[i64]) -> StatCalculator {
        let mut calc = StatCalculator::new();
        for (i, &v) in values.iter().enumerate() {
            calc.add_sample(&Sample::new("L", i as i64 * 1_000, v, true));
        }
        calc
    }

    #[test]
    fn test_avg_and_max_rules() {
        let calc = stats(&[100, 200, 300]);

        let avg = NfrRule::new("L", "Avg", "<=", "250").check(Some(&calc));
        assert!(avg.passed);
        assert!(!avg.skipped);

        let max = NfrRule::new("L", "Max", "<", "300").check(Some(&calc));
        assert!(!max.passed);
        assert!(max.failed());
        assert_eq!(max.actual, Some(300.0));
    }

    #[test]
    fn test_absent_label_is_skipped() {
        let verdict = NfrRule::new("M", "Avg", "<", "1").check(None);
        assert!(verdict.skipped);
        assert!(!verdict.failed());
    }

    #[test]
    fn test_unknown_symbol_and_criterion_fail() {
        let calc = stats(&[10]);
        let bad_symbol = NfrRule::new("L", "Min", "!=", "1").check(Some(&calc));
        assert!(bad_symbol.failed());
        assert!(bad_symbol.message.contains("symbol"));

        let bad_criterion = NfrRule::new("L", "P99", "<", "1").check(Some(&calc));
        assert!(bad_criterion.failed());
        assert!(bad_criterion.message.contains("criterion"));

        let bad_value = NfrRule::new("L", "Min", "<", "fast").check(Some(&calc));
        assert!(bad_value.failed());
    }

    #[test]
    fn test_error_and_sample_rate() {
        let mut calc = StatCalculator::new();
        calc.add_sample(&Sample::new("L", 0, 500, true));
        calc.add_sample(&Sample::new("L", 1_000, 500, false));
        calc.add_sample(&Sample::new("L", 2_000, 500, true));
        calc.add_sample(&Sample::new("L", 3_500, 500, false));

        let errors = NfrRule::new("L", "Error Rate", "=", "50").check(Some(&calc));
        assert!(errors.passed);

        // 4 samples over 4 seconds
        let rate = NfrRule::new("L", "SampleRate", ">=", "1").check(Some(&calc));
        assert!(rate.passed);
    }

    #[test]
    fn test_comparisons() {
        assert!(Comparison::Equal.holds(1.0, 1.0));
        assert!(Comparison::Less.holds(0.5, 1.0));
        assert!(Comparison::LessOrEqual.holds(1.0, 1.0));
        assert!(Comparison::GreaterOrEqual.holds(1.0, 1.0));
        assert!(!Comparison::Greater.holds(1.0, 1.0));
    }

    #[test]
    fn test_parse_rule() {
        let rule: NfrRule = "Home, page,Avg,<=,250".parse().unwrap();
        assert_eq!(rule.label, "Home, page");
        assert_eq!(rule.criterion, "Avg");
        assert_eq!(rule.symbol, "<=");
        assert_eq!(rule.value, "250");

        assert!("Avg,<=".parse::<NfrRule>().is_err());
        assert!(",Avg,<,1".parse::<NfrRule>().is_err());
    }
}
