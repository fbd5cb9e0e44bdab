pub mod catalog;
pub mod error;
pub mod services;
mod utils;

use std::path::{Path, PathBuf};

use tracing_subscriber::{fmt, EnvFilter};

use crate::catalog::Catalog;
use crate::error::{AppResult, ResultExt};
use crate::services::{
    ClipService, ConfigOverrides, DelayPacer, EnrichConfig, EnrichmentPipeline, HttpTransport,
    RunSummary,
};

pub use error::{AppError, ItemError};

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding callers) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    /// Defaults to rewriting `input` in place
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

/// Loads config and catalog, enriches the catalog, and writes it back
/// unless this is a dry run.
pub async fn run(options: RunOptions) -> AppResult<RunSummary> {
    let mut config = EnrichConfig::load(options.config.as_deref())?;
    config.apply_overrides(&options.overrides);
    config.validate()?;

    let mut catalog = Catalog::load(&options.input)?;
    tracing::info!(
        input = %options.input.display(),
        items = catalog.items.len(),
        "Catalog loaded"
    );

    let model = ClipService::new(config.model.clone()).model_err("loading CLIP models")?;
    let transport = HttpTransport::new(
        &config.user_agent,
        config.manifest_timeout(),
        config.image_timeout(),
    )?;
    let pacer = DelayPacer::new(config.request_delay());

    let pipeline = EnrichmentPipeline::new(model, transport, pacer, &config).await?;
    let summary = pipeline.run(&mut catalog).await;
    summary.log();

    let output = options.output.as_deref().unwrap_or(&options.input);
    write_output(&catalog, output, config.dry_run)?;
    Ok(summary)
}

/// Writes the enriched catalog. Returns whether anything was written.
pub fn write_output(catalog: &Catalog, output: &Path, dry_run: bool) -> AppResult<bool> {
    if dry_run {
        tracing::info!(output = %output.display(), "Dry run, catalog not written");
        return Ok(false);
    }
    catalog.save(output)?;
    tracing::info!(
        output = %output.display(),
        items = catalog.items.len(),
        "Catalog written"
    );
    Ok(true)
}
