//! Model bundle inspection command

use anyhow::{Context, Result};
use colored::Colorize;
use hostwatch_lib::{FeatureSummary, HostwatchConfig, ModelBundle, ModelSummary};
use tabled::Tabled;

use crate::output::{format_timestamp, print_header, print_json, OutputFormat};

/// Table row for one feature's preprocessing parameters
#[derive(Debug, Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Impute Mean", display_with = "format_stat")]
    imputation_mean: f64,
    #[tabled(rename = "Scale Mean", display_with = "format_stat")]
    scaler_mean: f64,
    #[tabled(rename = "Scale Std", display_with = "format_stat")]
    scaler_std: f64,
}

fn format_stat(value: &f64) -> String {
    format!("{:.4}", value)
}

impl From<&FeatureSummary> for FeatureRow {
    fn from(feature: &FeatureSummary) -> Self {
        Self {
            name: feature.name.clone(),
            imputation_mean: feature.imputation_mean,
            scaler_mean: feature.scaler_mean,
            scaler_std: feature.scaler_std,
        }
    }
}

/// Show the persisted model bundle
pub fn show(config: &HostwatchConfig, format: OutputFormat) -> Result<()> {
    let bundle = ModelBundle::load(&config.bundle_path).with_context(|| {
        format!(
            "Cannot read model bundle {}; run `hostwatch train` first",
            config.bundle_path.display()
        )
    })?;
    let info = ModelSummary::from(&bundle);

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_header("Model Bundle");
            println!("Path:          {}", config.bundle_path.display().to_string().cyan());
            println!("Format:        v{}", info.format_version);
            println!("Trained at:    {}", format_timestamp(&info.trained_at));
            println!("Samples:       {}", info.sample_count);
            println!("Trees:         {}", info.n_estimators);
            println!("Max samples:   {}", info.max_samples);
            println!("Seed:          {}", info.random_seed);
            println!("Contamination: {}", info.contamination);
            println!("Threshold:     {:.4}", info.threshold);
            println!();

            let rows: Vec<FeatureRow> = info.features.iter().map(FeatureRow::from).collect();
            let table = tabled::Table::new(&rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
