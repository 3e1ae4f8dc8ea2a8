//! One-shot sample collection command

use anyhow::{Context, Result};
use hostwatch_lib::{
    collector::{HostCollector, SystemCollector},
    store::{SampleStore, SqliteSampleStore},
    HostwatchConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::output::{format_percent, print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct SampleOutput {
    id: i64,
    #[serde(flatten)]
    sample: hostwatch_lib::NewSample,
}

/// Collect one sample from this host and append it to the store
pub async fn run(
    config: &HostwatchConfig,
    disk_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let store = Arc::new(
        SqliteSampleStore::open(&config.db_path, &config.table_name)
            .with_context(|| format!("Failed to open sample store {:?}", config.db_path))?,
    );
    let collector = SystemCollector::new(disk_path.unwrap_or_else(|| config.disk_path.clone()));

    let sample = collector.collect().await;
    let id = {
        let store = store.clone();
        let sample = sample.clone();
        tokio::task::spawn_blocking(move || store.append(&sample))
            .await
            .context("Write task failed")?
            .context("Failed to store sample")?
    };

    match format {
        OutputFormat::Json => print_json(&SampleOutput { id, sample })?,
        OutputFormat::Table => print_success(&format!(
            "Stored sample {} (cpu {}, memory {}, disk {})",
            id,
            format_percent(sample.cpu_percent),
            format_percent(sample.memory_percent),
            format_percent(sample.disk_percent)
        )),
    }

    Ok(())
}
