use anyhow::Result;
use loadtest_report::{
    config::GraphDefinition, FlushResults, GraphError, ReportConfig, ReportError, ReportGenerator, ResultWriter,
    Sample,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

const HEADER: &str = "timeStamp,elapsed,label,responseCode,responseMessage,threadName,success,bytes,sentBytes";

fn write_results(dir: &Path, rows: &[String]) -> PathBuf {
    let path = dir.join("results.csv");
    let mut body = format!("{}\n", HEADER);
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Full generation over a small mixed results file: summaries, graphs and
/// the files written to the output directory all agree.
#[test]
fn end_to_end_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rows = Vec::new();
    for i in 0..20 {
        let success = i % 5 != 0;
        rows.push(format!(
            "{},{},login,{},msg,Group 1-1,{},1000,200",
            1_000 + i * 100,
            100 + i * 10,
            if success { 200 } else { 500 },
            success
        ));
        rows.push(format!("{},{},home,200,OK,Group 1-2,true,500,100", 1_050 + i * 100, 40));
    }
    let results = write_results(dir.path(), &rows);
    let output = dir.path().join("report");

    let (context, summary) = ReportGenerator::new(ReportConfig::default()).generate(&results, &output)?;

    assert_eq!(summary.rows_read, 40);
    assert_eq!(summary.rows_skipped, 0);
    assert_eq!(summary.samples_accepted, 40);

    let requests = context.get("requestsSummary").unwrap();
    assert_eq!(requests["overall"]["total"], json!(40));
    assert_eq!(requests["overall"]["ko"], json!(4));
    assert_eq!(requests["items"]["home"]["ko"], json!(0));

    let stats = context.get("statisticsSummary").unwrap();
    assert_eq!(stats["overall"]["count"], json!(40));
    assert_eq!(stats["items"]["home"]["min"], json!(40));
    assert_eq!(stats["items"]["login"]["max"], json!(290));

    let errors = context.get("errorsSummary").unwrap();
    assert_eq!(errors["items"]["login"]["errors"], json!(4));
    assert!(errors["items"].get("home").is_none());

    assert!(context.get("apdexSummary").unwrap()["overall"]["apdex"].is_number());
    for graph in [
        "responseTimesOverTime",
        "hitsPerSecond",
        "bytesThroughputOverTime",
        "responseTimeDistribution",
        "responseTimePercentiles",
    ] {
        let data = context.get(graph).unwrap_or_else(|| panic!("missing {}", graph));
        assert!(data["series"].is_array(), "{} has no series", graph);
    }
    assert!(context.get("beginDate").unwrap().is_string());

    let written = read_json(&output.join(loadtest_report::defaults::REPORT_DATA_FILE));
    assert_eq!(written, context.to_json());
    let statistics = read_json(&output.join(loadtest_report::defaults::STATISTICS_FILE));
    assert_eq!(&statistics, stats);

    let leftovers: Vec<_> = fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".report-"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

/// A header with no rows still produces a complete, well-formed context.
#[test]
fn zero_sample_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let results = write_results(dir.path(), &[]);
    let (context, summary) =
        ReportGenerator::new(ReportConfig::default()).generate(&results, &dir.path().join("out"))?;

    assert_eq!(summary.rows_read, 0);
    assert_eq!(context.get("beginDate"), Some(&Value::Null));
    assert_eq!(context.get("endDate"), Some(&Value::Null));
    let stats = context.get("statisticsSummary").unwrap();
    assert_eq!(stats["overall"]["count"], json!(0));
    assert_eq!(stats["overall"]["throughput"], json!(0.0));
    assert!(stats["items"].as_object().unwrap().is_empty());
    assert_eq!(context.get("requestsSummary").unwrap()["overall"]["total"], json!(0));
    Ok(())
}

/// Malformed rows are skipped one by one; the rest of the file is used.
#[test]
fn malformed_rows_are_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rows: Vec<String> = (0..10)
        .map(|i| format!("{},{},page,200,OK,t,true,10,1", 1_000 + i, 50))
        .collect();
    rows.insert(3, "not-a-number,50,page,200,OK,t,true,10,1".to_string());
    rows.insert(6, "1000,-5,page,200,OK,t,true,10,1".to_string());
    rows.insert(8, "1000,50,page".to_string());
    let results = write_results(dir.path(), &rows);

    let (context, summary) =
        ReportGenerator::new(ReportConfig::default()).generate(&results, &dir.path().join("out"))?;

    assert_eq!(summary.rows_read, 13);
    assert_eq!(summary.rows_skipped, 3);
    assert_eq!(context.get("statisticsSummary").unwrap()["overall"]["count"], json!(10));
    Ok(())
}

/// Timestamps outside the epoch-millisecond range are skipped like any
/// other bad row instead of breaking the time buckets.
#[test]
fn extreme_timestamps_are_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let rows = vec![
        "1000,50,page,200,OK,t,true,10,1".to_string(),
        "-9223372036854775808,50,page,200,OK,t,true,10,1".to_string(),
        "9223372036854775807,50,page,200,OK,t,true,10,1".to_string(),
    ];
    let results = write_results(dir.path(), &rows);

    let (context, summary) =
        ReportGenerator::new(ReportConfig::default()).generate(&results, &dir.path().join("out"))?;

    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_skipped, 2);
    assert_eq!(context.get("statisticsSummary").unwrap()["overall"]["count"], json!(1));
    assert!(dir.path().join("out").join("report-data.json").exists());
    Ok(())
}

#[test]
fn missing_source_fails_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out");
    let err = ReportGenerator::new(ReportConfig::default())
        .generate(&dir.path().join("nope.csv"), &output)
        .unwrap_err();
    assert!(matches!(err, ReportError::SourceMissing { .. }));
    assert!(!output.exists());
}

#[test]
fn unknown_graph_class_names_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let results = write_results(dir.path(), &["1000,10,a,200,OK,t,true,1,1".to_string()]);
    let mut config = ReportConfig::default();
    config.graphs.push(GraphDefinition::new("custom", "org.example.graphs.CustomGraphConsumer"));
    let index = config.graphs.len() - 1;

    let err = ReportGenerator::new(config)
        .generate(&results, &dir.path().join("out"))
        .unwrap_err();
    match err {
        ReportError::Graph { key, source } => {
            assert_eq!(key, format!("graphs[{}].className", index));
            assert!(matches!(source, GraphError::UnknownClass(_)));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn excluded_labels_never_reach_summaries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let results = write_results(
        dir.path(),
        &[
            "1000,10,keep,200,OK,t,true,1,1".to_string(),
            "1000,10,setup,200,OK,t,false,1,1".to_string(),
        ],
    );
    let mut config = ReportConfig::default();
    config.excluded_samples = vec!["setup".to_string()];
    let (context, summary) = ReportGenerator::new(config).generate(&results, &dir.path().join("out"))?;

    assert_eq!(summary.rows_read, 2);
    let stats = context.get("statisticsSummary").unwrap();
    assert_eq!(stats["overall"]["count"], json!(1));
    assert!(stats["items"].get("setup").is_none());
    // Dates come from the normalizer, ahead of the label filter.
    assert!(context.get("beginDate").unwrap().is_string());
    Ok(())
}

/// A writer that is still open when the report is requested gets flushed
/// first, so every sample it accepted is in the report.
#[test]
fn live_writer_is_flushed_before_reading() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let results = dir.path().join("live.csv");
    let mut writer = ResultWriter::create(&results, b',')?;
    for i in 0..25 {
        writer.write(&Sample::new("checkout", 10_000 + i * 10, 80, i % 10 != 0).with_bytes(100, 10))?;
    }

    let generator = ReportGenerator::new(ReportConfig::default());
    let (context, summary) = generator.generate_live(&results, &dir.path().join("out"), &mut writer)?;

    assert_eq!(summary.samples_accepted, 25);
    assert_eq!(context.get("requestsSummary").unwrap()["overall"]["ko"], json!(3));

    let other = dir.path().join("other.csv");
    let err = generator
        .generate_live(&other, &dir.path().join("out2"), &mut writer)
        .unwrap_err();
    assert!(matches!(err, ReportError::InvalidConfig(_)));
    assert_eq!(writer.results_path(), results.as_path());
    Ok(())
}
