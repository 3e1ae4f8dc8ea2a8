//! Model training command

use anyhow::{Context, Result};
use hostwatch_lib::{store::SqliteSampleStore, train_and_persist, HostwatchConfig, ModelSummary};
use tracing::debug;

use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Train on every stored sample and replace the model bundle
pub fn run(config: &HostwatchConfig, format: OutputFormat) -> Result<()> {
    debug!(db_path = ?config.db_path, table = %config.table_name, "Opening sample store");
    let store = SqliteSampleStore::open_existing(&config.db_path, &config.table_name)
        .context("Training aborted")?;

    let outcome =
        train_and_persist(&store, &config.training_config()).context("Training aborted")?;
    let info = ModelSummary::from(outcome.bundle.as_ref());

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Trained on {} samples, bundle written to {}",
                info.sample_count,
                config.bundle_path.display()
            ));
            print_info(&format!(
                "{} trees, contamination {}, decision threshold {:.4}",
                info.n_estimators, info.contamination, info.threshold
            ));
            print_info(&format!("Checksum: {}", outcome.checksum));
        }
    }

    Ok(())
}
