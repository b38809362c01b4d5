//! Run the training pipeline once and archive its metadata.
//!
//! Reads `runvault.json` from the working directory when present.

use std::path::Path;

use anyhow::Context;
use runvault::config::PipelineConfig;
use runvault::pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "runvault.json";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::load_or_default(Path::new(CONFIG_FILE))
        .with_context(|| format!("loading {CONFIG_FILE}"))?;
    let report = Pipeline::new(config)?.run().context("pipeline failed")?;

    println!("run id:           {}", report.run_id);
    println!("best params:      {}", report.best_params);
    println!("best cv score:    {:.4} (+/- {:.4})", report.best_score, report.best_score_std);
    println!("refit time:       {:.3}s", report.refit_time_secs);
    println!("holdout accuracy: {:.4}", report.holdout_accuracy);
    println!(
        "archive:          {} ({} -> {} bytes, {})",
        report.archive_path.display(),
        report.archive.content_len,
        report.archive.payload_len,
        report.archive.compression.as_str()
    );
    Ok(())
}
