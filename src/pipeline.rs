//! End-to-end batch orchestration: track, retrieve, mosaic, publish.
//!
//! The orchestrator owns the polling loop. Each iteration scans remote
//! storage for finished rasters, retrieves anything new, classifies the
//! ledger against the platform's job listing, and decides settlement. Only
//! a settled batch proceeds to the scene tables, the mosaics, and the final
//! upload pass.

use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::context::{BatchContext, ExportManifest};
use crate::ledger::{JobLedger, LedgerError};
use crate::mosaic::{MosaicError, Mosaicker, plan_mosaics};
use crate::platform::ComputePlatform;
use crate::process::CommandRunner;
use crate::publish::{PublishError, Uploader, publish_directory, publish_file};
use crate::retrieval::{Retriever, StagedArtifact};
use crate::store::{ObjectQuery, RemoteStore};
use crate::tracker::{
    JobClassification, Settlement, ShutdownSignal, Tracker, TrackerError, WaitOutcome,
};

/// Errors raised by a pipeline run. Every variant carries enough context to
/// act on without re-running the batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raised when a local working directory cannot be prepared.
    #[error("failed to prepare directory {path}: {message}")]
    Workspace {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the job ledger cannot be read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Raised when the object store listing fails after retries.
    #[error("object store listing failed")]
    StoreList {
        /// Underlying store error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Raised when the platform job listing fails after retries.
    #[error("job status listing failed")]
    PlatformList {
        /// Underlying platform error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Raised when jobs fail or the wait budget is exhausted.
    #[error(transparent)]
    Tracking(#[from] TrackerError),
    /// Raised when an operator requested shutdown mid-batch. The ledger is
    /// intact; a later `collect` run resumes from it.
    #[error("shutdown requested; batch left resumable via the ledger")]
    ShutdownRequested,
    /// Raised when a mosaic group is incomplete or a GDAL tool fails.
    #[error(transparent)]
    Mosaic(#[from] MosaicError),
    /// Raised when the publish directory cannot be enumerated or an upload
    /// cannot be spawned.
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// Raised when one or more uploads failed after the best-effort pass.
    #[error("publication incomplete; failed key(s): {}", keys.join(", "))]
    PublishIncomplete {
        /// Destination keys that did not upload.
        keys: Vec<String>,
    },
}

/// What one completed run produced.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Artifacts retrieved from remote storage over the whole run.
    pub staged: Vec<StagedArtifact>,
    /// Published mosaic paths.
    pub mosaics: Vec<Utf8PathBuf>,
    /// Destination keys uploaded to long-term storage.
    pub uploaded: Vec<String>,
}

/// Orchestrates one batch across the platform, store, GDAL, and uploader
/// seams.
#[derive(Debug)]
pub struct PipelineOrchestrator<'a, P, S, R, U> {
    platform: &'a P,
    store: &'a S,
    mosaicker: &'a Mosaicker<R>,
    uploader: &'a U,
    poll_interval: Duration,
    wait_budget: Duration,
}

impl<'a, P, S, R, U> PipelineOrchestrator<'a, P, S, R, U>
where
    P: ComputePlatform,
    S: RemoteStore,
    R: CommandRunner,
    U: Uploader,
{
    /// Creates an orchestrator over the four collaborator seams.
    #[must_use]
    pub const fn new(
        platform: &'a P,
        store: &'a S,
        mosaicker: &'a Mosaicker<R>,
        uploader: &'a U,
        poll_interval: Duration,
        wait_budget: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            mosaicker,
            uploader,
            poll_interval,
            wait_budget,
        }
    }

    /// Runs the batch to completion: poll until settled, retrieve the scene
    /// tables, mosaic, publish.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] naming the stage that failed. Tracking
    /// failures list the offending job ids; an incomplete publication lists
    /// the failed keys.
    pub async fn execute(
        &self,
        context: &BatchContext,
        manifest: &ExportManifest,
        shutdown: &mut ShutdownSignal,
    ) -> Result<PipelineReport, PipelineError> {
        prepare_dir(&context.staging_dir)?;
        prepare_dir(&context.publish_dir)?;

        let ledger = JobLedger::open(&context.ledger_path)?;
        let retriever = Retriever::new(self.store, &context.staging_dir);

        info!(
            batch = %context.batch_id,
            ledger = %context.ledger_path,
            "tracking batch until settlement"
        );
        let mut report = PipelineReport::default();
        self.track_until_settled(context, &ledger, &retriever, shutdown, &mut report)
            .await?;

        let table_failures = self
            .collect_scene_tables(context, manifest, &retriever, &mut report)
            .await?;
        self.mosaic_and_publish(context, manifest, &mut report, table_failures)?;
        Ok(report)
    }

    async fn track_until_settled(
        &self,
        context: &BatchContext,
        ledger: &JobLedger,
        retriever: &Retriever<'_, S>,
        shutdown: &mut ShutdownSignal,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let tracker = Tracker::start(self.poll_interval, self.wait_budget);
        let raster_query = ObjectQuery::rasters();

        loop {
            let listing =
                self.store
                    .list(&raster_query)
                    .await
                    .map_err(|err| PipelineError::StoreList {
                        source: Box::new(err),
                    })?;
            let scan = retriever.collect(&listing).await;
            let newly_retrieved = scan.newly_retrieved();
            // Failed transfers count as retrieval activity: the objects are
            // still remote, and settlement must stay open until a later scan
            // retries them.
            let scan_activity = scan.matched();
            report.staged.extend(scan.staged);

            let ledger_ids = ledger.read_ids()?;
            let jobs =
                self.platform
                    .list_jobs()
                    .await
                    .map_err(|err| PipelineError::PlatformList {
                        source: Box::new(err),
                    })?;
            let classification = JobClassification::classify(&ledger_ids, &jobs);

            match Settlement::decide(&classification, ledger_ids.len(), scan_activity)? {
                Settlement::Settled => {
                    info!(batch = %context.batch_id, retrieved = report.staged.len(), "batch settled");
                    return Ok(());
                }
                Settlement::Unsettled { pending, completed } => {
                    info!(
                        batch = %context.batch_id,
                        pending,
                        completed,
                        newly_retrieved,
                        "batch not settled; waiting one interval"
                    );
                }
            }

            if tracker.budget_exhausted() {
                return Err(tracker.budget_error(classification.outstanding()).into());
            }
            if tracker.wait_next_poll(shutdown).await == WaitOutcome::Shutdown {
                return Err(PipelineError::ShutdownRequested);
            }
        }
    }

    /// Retrieves the scene-table CSVs and uploads them straight away; they
    /// bypass the mosaic stage. A shortfall against the manifest is logged
    /// rather than fatal, and a failed table upload is itemized and carried
    /// into the final publication verdict without blocking the mosaics: the
    /// tables are provenance, not product. Returns the failed keys.
    async fn collect_scene_tables(
        &self,
        context: &BatchContext,
        manifest: &ExportManifest,
        retriever: &Retriever<'_, S>,
        report: &mut PipelineReport,
    ) -> Result<Vec<String>, PipelineError> {
        let fragment = format!(
            "-Change-Between-{:04}-and-{:04}",
            context.year_start, context.year_end
        );
        let table_query = ObjectQuery::tables(fragment);
        let listing =
            self.store
                .list(&table_query)
                .await
                .map_err(|err| PipelineError::StoreList {
                    source: Box::new(err),
                })?;
        let scan = retriever.collect(&listing).await;

        let expected = manifest.tables().count();
        if scan.staged.len() < expected {
            warn!(
                expected,
                staged = scan.staged.len(),
                "fewer scene tables than the manifest expects"
            );
        }
        let mut failed_keys = Vec::new();
        for table in &scan.staged {
            match publish_file(self.uploader, &table.path, &context.bucket_prefix) {
                Ok(key) => report.uploaded.push(key),
                Err(err) => {
                    let key = format!("{}{}", context.bucket_prefix, table.name);
                    warn!(key = %key, error = %err, "scene table upload failed; continuing");
                    failed_keys.push(key);
                }
            }
        }
        report.staged.extend(scan.staged);
        Ok(failed_keys)
    }

    fn mosaic_and_publish(
        &self,
        context: &BatchContext,
        manifest: &ExportManifest,
        report: &mut PipelineReport,
        mut failed_keys: Vec<String>,
    ) -> Result<(), PipelineError> {
        let plans = plan_mosaics(context, manifest);
        report.mosaics = self
            .mosaicker
            .mosaic_all(context, &plans, &report.staged)?;

        let summary = publish_directory(self.uploader, &context.publish_dir, &context.bucket_prefix)?;
        failed_keys.extend(summary.failures.into_iter().map(|(key, _)| key));
        report.uploaded.extend(summary.uploaded);
        if !failed_keys.is_empty() {
            return Err(PipelineError::PublishIncomplete { keys: failed_keys });
        }
        info!(
            batch = %context.batch_id,
            mosaics = report.mosaics.len(),
            uploaded = report.uploaded.len(),
            "batch published"
        );
        Ok(())
    }
}

fn prepare_dir(path: &Utf8PathBuf) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|err| PipelineError::Workspace {
        path: path.clone(),
        message: err.to_string(),
    })
}
