use std::path::PathBuf;
use std::process::ExitCode;

use catalog_enrich_lib::services::ConfigOverrides;
use catalog_enrich_lib::{init_tracing, run, RunOptions};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "catalog-enrich",
    about = "Add image urls, CLIP tags and visual neighbours to a catalog"
)]
struct Cli {
    /// Catalog JSON with an `items` array
    #[arg(long, env = "CATALOG_ENRICH_INPUT")]
    input: PathBuf,

    /// Where to write the enriched catalog (defaults to rewriting the input)
    #[arg(long, env = "CATALOG_ENRICH_OUTPUT")]
    output: Option<PathBuf>,

    /// Optional JSON config file
    #[arg(long, env = "CATALOG_ENRICH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for cached manifests and embeddings
    #[arg(long, env = "CATALOG_ENRICH_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Tags kept per item
    #[arg(long)]
    top_tags: Option<usize>,

    /// Neighbours kept per item
    #[arg(long)]
    top_similar: Option<usize>,

    /// Recompute tags for cached items (never refetches images)
    #[arg(long, default_value_t = false)]
    force_retag: bool,

    /// Run everything but do not write the output catalog
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Pause after each network request, in milliseconds
    #[arg(long)]
    request_delay_ms: Option<u64>,

    /// Request IIIF images at this width instead of the resolved size
    #[arg(long)]
    scan_image_size: Option<u32>,

    /// Run the subject detection pass with the default prompts
    #[arg(long, default_value_t = false)]
    detect: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let options = RunOptions {
        input: cli.input,
        output: cli.output,
        config: cli.config,
        overrides: ConfigOverrides {
            top_tags: cli.top_tags,
            top_similar: cli.top_similar,
            cache_dir: cli.cache_dir,
            request_delay_ms: cli.request_delay_ms,
            scan_image_size: cli.scan_image_size,
            force_retag: cli.force_retag,
            dry_run: cli.dry_run,
            detect: cli.detect,
        },
    };

    match run(options).await {
        Ok(summary) => {
            if summary.fetch_failed > 0 {
                tracing::warn!(failed = summary.fetch_failed, "Some items could not be fetched");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Enrichment failed");
            ExitCode::FAILURE
        }
    }
}
