//! Binary entry point for the changecast CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use thiserror::Error;

use changecast::{
    AwsCliUploader, BatchContext, ConfigError, ContextError, ExportManifest, HttpComputePlatform,
    HttpObjectStore, JobLedger, LedgerError, Mosaicker, PipelineConfig, PipelineError,
    PipelineOrchestrator, ProcessCommandRunner, Satellite, ShutdownSignal, SubmitError, Submitter,
    Variant, plan_exports,
};

#[derive(Debug, Parser)]
#[command(
    name = "changecast",
    about = "Submit, track, and publish change-detection export batches",
    arg_required_else_help = true
)]
enum Cli {
    #[command(name = "submit", about = "Submit the batch's export jobs and record their ids")]
    Submit(BatchArgs),
    #[command(
        name = "collect",
        about = "Resume from the ledger: track, retrieve, mosaic, and publish"
    )]
    Collect(BatchArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SatelliteArg {
    /// Landsat 8 surface reflectance.
    L8,
    /// Sentinel-2.
    S2,
}

impl From<SatelliteArg> for Satellite {
    fn from(value: SatelliteArg) -> Self {
        match value {
            SatelliteArg::L8 => Self::L8,
            SatelliteArg::S2 => Self::S2,
        }
    }
}

#[derive(Debug, Parser)]
struct BatchArgs {
    /// Satellite source for every product in the batch.
    #[arg(long, value_enum)]
    satellite: SatelliteArg,

    /// Produce the yearly products over a custom year pair instead of the
    /// rolling year-to-date products. Yearly outputs go to an explicit
    /// bucket prefix.
    #[arg(long, requires = "bucket")]
    yearly: bool,

    /// More recent year of the change pair; the older year is the one
    /// before it.
    #[arg(long)]
    year: u16,

    /// Bucket prefix receiving published outputs. Defaults to the rolling
    /// year-to-date prefix; required with --yearly.
    #[arg(long)]
    bucket: Option<String>,

    /// Ledger file recording submitted job ids.
    #[arg(long, default_value = "batch-ids.txt")]
    ledger: Utf8PathBuf,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("batch parameters invalid: {0}")]
    Context(#[from] ContextError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("submission failed: {0}")]
    Submit(#[from] SubmitError),
    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

#[tokio::main]
async fn main() {
    changecast::logging::init();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Submit(args) => submit_command(args).await,
        Cli::Collect(args) => collect_command(args).await,
    }
}

fn build_context(config: &PipelineConfig, args: &BatchArgs) -> Result<BatchContext, CliError> {
    let variant = if args.yearly {
        Variant::Custom
    } else {
        Variant::Latest
    };
    let context = BatchContext::builder()
        .satellite(args.satellite.into())
        .variant(variant)
        .years(args.year, args.year.saturating_sub(1))
        .bucket_prefix(args.bucket.clone().unwrap_or_default())
        .ledger_path(args.ledger.clone())
        .staging_dir(config.staging_dir.clone())
        .publish_dir(config.publish_dir.clone())
        .build()?;
    Ok(context)
}

async fn submit_command(args: BatchArgs) -> Result<(), CliError> {
    let config = PipelineConfig::load_without_cli_args()?;
    config.validate()?;
    let context = build_context(&config, &args)?;

    let platform = HttpComputePlatform::new(
        &config.compute_base_url,
        &config.compute_token,
        config.list_retry_attempts,
    );
    let ledger = JobLedger::create(&context.ledger_path)?;
    let requests = plan_exports(&context)?;
    let mut manifest = ExportManifest::new();
    Submitter::new(&platform, &ledger)
        .submit_all(&requests, &mut manifest)
        .await?;
    Ok(())
}

async fn collect_command(args: BatchArgs) -> Result<(), CliError> {
    let config = PipelineConfig::load_without_cli_args()?;
    config.validate()?;
    let context = build_context(&config, &args)?;

    let platform = HttpComputePlatform::new(
        &config.compute_base_url,
        &config.compute_token,
        config.list_retry_attempts,
    );
    let store = HttpObjectStore::new(
        &config.store_base_url,
        &config.store_token,
        config.list_retry_attempts,
    );
    let runner = ProcessCommandRunner;
    let mosaicker = Mosaicker::new(&runner, &config.gdalwarp_bin, &config.gdal_translate_bin);
    let uploader = AwsCliUploader::new(&runner, &config.aws_bin, &config.bucket);

    // The manifest is re-derived from the batch parameters; the roster is a
    // pure function of the context, so a collect run started in a fresh
    // process expects the same artifacts the submit run scheduled.
    let mut manifest = ExportManifest::new();
    for request in plan_exports(&context)? {
        manifest.record(request.expected);
    }

    let (shutdown_handle, mut shutdown) = ShutdownSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_handle.trigger();
        }
    });

    let orchestrator = PipelineOrchestrator::new(
        &platform,
        &store,
        &mosaicker,
        &uploader,
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.wait_budget_secs),
    );
    orchestrator
        .execute(&context, &manifest, &mut shutdown)
        .await?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
