//! Scoring and summary commands

use anyhow::Result;
use colored::Colorize;
use hostwatch_lib::{
    store::SqliteSampleStore, BatchSummary, DateRange, HostwatchConfig, LabeledSample, Scorer,
};
use tabled::Tabled;
use tracing::warn;

use super::date_range;
use crate::output::{
    color_anomaly_percent, color_label, format_percent, format_timestamp, print_header,
    print_json, print_warning, OutputFormat,
};
use crate::RangeArgs;

/// Row for scored samples table
#[derive(Tabled)]
struct ScoredRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Disk")]
    disk: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&LabeledSample> for ScoredRow {
    fn from(sample: &LabeledSample) -> Self {
        Self {
            timestamp: format_timestamp(&sample.timestamp),
            cpu: format_percent(sample.cpu_percent),
            memory: format_percent(sample.memory_percent),
            disk: format_percent(sample.disk_percent),
            status: color_label(sample.anomaly),
        }
    }
}

/// Load the bundle and score the requested range.
///
/// Never fails on a missing store or bundle: the batch is empty, or every
/// sample is labeled normal.
fn scored_batch(config: &HostwatchConfig, range: Option<&DateRange>) -> (Scorer, Vec<LabeledSample>) {
    let scorer = Scorer::load(&config.bundle_path, config.node_name.clone());

    let batch = match SqliteSampleStore::open_existing(&config.db_path, &config.table_name) {
        Ok(store) => scorer.score_batch(&store, range),
        Err(e) => {
            warn!(error = %e, "Sample store unavailable, no data to score");
            Vec::new()
        }
    };
    (scorer, batch)
}

/// Print labeled samples
pub fn score(
    config: &HostwatchConfig,
    range: &RangeArgs,
    anomalies_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let range = date_range(range)?;
    let (scorer, batch) = scored_batch(config, range.as_ref());

    let shown: Vec<&LabeledSample> = batch
        .iter()
        .filter(|s| !anomalies_only || s.anomaly.is_anomaly())
        .collect();

    match format {
        OutputFormat::Json => print_json(&shown)?,
        OutputFormat::Table => {
            if scorer.bundle().is_none() {
                print_warning("No usable model bundle, all samples labeled normal");
            }
            if shown.is_empty() {
                print_warning("No samples found");
                return Ok(());
            }

            let rows: Vec<ScoredRow> = shown.iter().map(|s| ScoredRow::from(*s)).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let anomalies = batch.iter().filter(|s| s.anomaly.is_anomaly()).count();
            println!(
                "\nTotal: {} samples, {} anomalies",
                batch.len(),
                anomalies.to_string().red().bold()
            );
        }
    }

    Ok(())
}

/// Print headline figures of a scored range
pub fn summary(config: &HostwatchConfig, range: &RangeArgs, format: OutputFormat) -> Result<()> {
    let range = date_range(range)?;
    let (scorer, batch) = scored_batch(config, range.as_ref());
    let summary = BatchSummary::from_labeled(&batch);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_header("Host Anomaly Summary");
            if scorer.bundle().is_none() {
                print_warning("No usable model bundle, anomaly detection disabled");
            }
            let Some((first, last)) = summary.period else {
                print_warning("No samples found");
                return Ok(());
            };

            let contamination = scorer.bundle().map(|b| b.detector.contamination());
            println!(
                "Period:    {} to {}",
                format_timestamp(&first).cyan(),
                format_timestamp(&last).cyan()
            );
            println!("Readings:  {}", summary.total);
            println!("Anomalies: {}", summary.anomalies);
            println!(
                "Rate:      {}",
                color_anomaly_percent(summary.anomaly_percent, contamination)
            );

            if let Some(latest) = &summary.latest {
                println!();
                println!("{}", "Latest reading".bold());
                println!("  Time:   {}", format_timestamp(&latest.timestamp));
                println!("  CPU:    {}", format_percent(latest.cpu_percent));
                println!("  Memory: {}", format_percent(latest.memory_percent));
                println!("  Disk:   {}", format_percent(latest.disk_percent));
                println!("  Status: {}", color_label(latest.anomaly));
            }
        }
    }

    Ok(())
}
