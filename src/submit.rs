//! Export submission: builds the per-batch request roster and records every
//! acknowledged job id durably before the next submission.

use thiserror::Error;
use tracing::info;

use crate::context::{BatchContext, ExportManifest};
use crate::ledger::{JobLedger, LedgerError};
use crate::naming::{ArtifactName, ProductIndex, Qualifier, Region, Variant};
use crate::platform::{ComputePlatform, ExportRequest, JobId, PlatformError};

/// Export footprint of the mainland region.
pub const CONUS_BOUNDS: &str = "[[-106.65,24.39],[-75.20,39.65]]";

/// Export footprint of the island region.
pub const PRVI_BOUNDS: &str = "[[-67.95,17.62],[-64.51,18.57]]";

/// Errors raised during submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Raised when a request fails validation while building the roster.
    #[error(transparent)]
    Request(#[from] PlatformError),
    /// Raised when the platform rejects a submission. No local retry: the
    /// id is the only link to a scheduled job, and a blind resubmit could
    /// double-schedule the export.
    #[error("platform rejected export '{description}'")]
    Platform {
        /// Description of the rejected export.
        description: String,
        /// Underlying platform error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Raised when an acknowledged id cannot be recorded. The id is included
    /// so an operator can reconcile the batch by hand.
    #[error("job {id} was accepted but could not be recorded")]
    Ledger {
        /// Acknowledged but unrecorded job id.
        id: JobId,
        /// Underlying ledger error.
        #[source]
        source: LedgerError,
    },
}

/// Builds the batch's export requests from its context.
///
/// Latest batches export the SWIR, NDVI, and NDMI change rasters; yearly
/// (custom) batches export only the SWIR family. The SWIR products always
/// include the per-pixel observation-date rasters (`datesBegin`/`datesEnd`)
/// alongside the change raster, and every batch exports the two SWIR scene
/// tables used for provenance.
///
/// # Errors
///
/// Returns [`SubmitError::Request`] when a request fails validation.
pub fn plan_exports(context: &BatchContext) -> Result<Vec<ExportRequest>, SubmitError> {
    let indices: &[ProductIndex] = match context.variant {
        Variant::Latest => &[ProductIndex::Swir, ProductIndex::Ndvi, ProductIndex::Ndmi],
        Variant::Custom => &[ProductIndex::Swir],
    };

    let mut requests = Vec::new();
    for &index in indices {
        let qualifiers: &[Qualifier] = if index == ProductIndex::Swir {
            &[Qualifier::Plain, Qualifier::DatesBegin, Qualifier::DatesEnd]
        } else {
            &[Qualifier::Plain]
        };
        for &qualifier in qualifiers {
            for (region, bounds) in [(Region::Conus, CONUS_BOUNDS), (Region::Prvi, PRVI_BOUNDS)] {
                let expected = artifact(context, index, qualifier, Some(region));
                requests.push(ExportRequest::builder(expected).region_bounds(bounds).build()?);
            }
        }
    }
    for qualifier in [Qualifier::ScenesBegin, Qualifier::ScenesEnd] {
        let expected = artifact(context, ProductIndex::Swir, qualifier, None);
        requests.push(
            ExportRequest::builder(expected)
                .region_bounds(CONUS_BOUNDS)
                .build()?,
        );
    }
    Ok(requests)
}

fn artifact(
    context: &BatchContext,
    index: ProductIndex,
    qualifier: Qualifier,
    region: Option<Region>,
) -> ArtifactName {
    ArtifactName {
        index,
        variant: context.variant,
        year_start: context.year_start,
        year_end: context.year_end,
        qualifier,
        satellite: context.satellite,
        region,
    }
}

/// Submits export requests and keeps the ledger ahead of the platform.
#[derive(Debug)]
pub struct Submitter<'a, P> {
    platform: &'a P,
    ledger: &'a JobLedger,
}

impl<'a, P: ComputePlatform> Submitter<'a, P> {
    /// Creates a submitter bound to a platform and an open ledger.
    #[must_use]
    pub const fn new(platform: &'a P, ledger: &'a JobLedger) -> Self {
        Self { platform, ledger }
    }

    /// Submits every request in order. Each acknowledged id is appended to
    /// the ledger and the expected artifact recorded in the manifest before
    /// the next submission starts, so a crash mid-batch never loses an id.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Platform`] on the first rejection and
    /// [`SubmitError::Ledger`] when an acknowledged id cannot be persisted.
    /// Either way, ids recorded so far remain in the ledger.
    pub async fn submit_all(
        &self,
        requests: &[ExportRequest],
        manifest: &mut ExportManifest,
    ) -> Result<Vec<JobId>, SubmitError> {
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let id = self
                .platform
                .submit(request)
                .await
                .map_err(|err| SubmitError::Platform {
                    description: request.description.clone(),
                    source: Box::new(err),
                })?;
            self.ledger
                .append(&id)
                .map_err(|source| SubmitError::Ledger {
                    id: id.clone(),
                    source,
                })?;
            manifest.record(request.expected.clone());
            info!(job = %id, description = %request.description, "export submitted");
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::*;
    use crate::naming::Satellite;
    use crate::platform::{JobRecord, PlatformFuture};

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct Quota;

    /// Platform double yielding scripted responses in order.
    struct ScriptedPlatform {
        responses: Mutex<VecDeque<Result<JobId, Quota>>>,
    }

    impl ScriptedPlatform {
        fn new(responses: Vec<Result<JobId, Quota>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }
    }

    impl ComputePlatform for ScriptedPlatform {
        type Error = Quota;

        fn submit<'a>(
            &'a self,
            _request: &'a ExportRequest,
        ) -> PlatformFuture<'a, JobId, Self::Error> {
            let response = self
                .responses
                .lock()
                .expect("mutex poisoned")
                .pop_front()
                .expect("script exhausted");
            Box::pin(async move { response })
        }

        fn list_jobs(&self) -> PlatformFuture<'_, Vec<JobRecord>, Self::Error> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn latest_context(dir: &TempDir) -> BatchContext {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp path");
        BatchContext::builder()
            .satellite(Satellite::L8)
            .variant(Variant::Latest)
            .years(2023, 2022)
            .ledger_path(root.join("ids.txt"))
            .staging_dir(root.join("staging"))
            .publish_dir(root.join("publish"))
            .build()
            .expect("context should build")
    }

    #[test]
    fn latest_roster_covers_three_indices_dates_and_scene_tables() {
        let dir = TempDir::new().expect("temp dir");
        let requests = plan_exports(&latest_context(&dir)).expect("roster should build");

        // SWIR change + dates over two regions, NDVI and NDMI change over
        // two regions, plus two scene tables.
        assert_eq!(requests.len(), 12);
        let tables = requests
            .iter()
            .filter(|request| request.expected.region.is_none())
            .count();
        assert_eq!(tables, 2);
        assert!(
            requests
                .iter()
                .any(|request| request.description
                    == "SWIR-Latest-Change-Between-2023-and-2022L8PRVI")
        );
        for expected in [
            "SWIR-Latest-Change-Between-2023-and-2022datesBeginL8CONUS",
            "SWIR-Latest-Change-Between-2023-and-2022datesEndL8PRVI",
        ] {
            assert!(
                requests.iter().any(|request| request.description == expected),
                "roster should include {expected}"
            );
        }
    }

    #[test]
    fn yearly_roster_is_swir_only() {
        let dir = TempDir::new().expect("temp dir");
        let mut context = latest_context(&dir);
        context.variant = Variant::Custom;
        context.year_start = 2019;
        context.year_end = 2018;

        let requests = plan_exports(&context).expect("roster should build");

        // Change + dates over two regions, plus the two scene tables.
        assert_eq!(requests.len(), 8);
        assert!(
            requests
                .iter()
                .all(|request| request.expected.index == ProductIndex::Swir)
        );
        let dates = requests
            .iter()
            .filter(|request| {
                matches!(
                    request.expected.qualifier,
                    Qualifier::DatesBegin | Qualifier::DatesEnd
                ) && request.expected.region.is_some()
            })
            .count();
        assert_eq!(dates, 4);
    }

    #[tokio::test]
    async fn ids_are_recorded_in_submission_order() {
        let dir = TempDir::new().expect("temp dir");
        let context = latest_context(&dir);
        let requests = plan_exports(&context).expect("roster should build");
        let ledger = JobLedger::create(&context.ledger_path).expect("create ledger");
        let platform = ScriptedPlatform::new(
            (0..requests.len())
                .map(|n| Ok(JobId(format!("task-{n}"))))
                .collect(),
        );
        let mut manifest = ExportManifest::new();

        let ids = Submitter::new(&platform, &ledger)
            .submit_all(&requests, &mut manifest)
            .await
            .expect("submission should succeed");

        assert_eq!(ids.len(), requests.len());
        assert_eq!(ledger.read_ids().expect("read ids"), ids);
        assert_eq!(manifest.len(), requests.len());
    }

    #[tokio::test]
    async fn rejection_preserves_previously_recorded_ids() {
        let dir = TempDir::new().expect("temp dir");
        let context = latest_context(&dir);
        let requests = plan_exports(&context).expect("roster should build");
        let ledger = JobLedger::create(&context.ledger_path).expect("create ledger");
        let platform = ScriptedPlatform::new(vec![
            Ok(JobId(String::from("task-0"))),
            Ok(JobId(String::from("task-1"))),
            Err(Quota),
        ]);
        let mut manifest = ExportManifest::new();

        let result = Submitter::new(&platform, &ledger)
            .submit_all(&requests, &mut manifest)
            .await;

        assert!(matches!(result, Err(SubmitError::Platform { .. })));
        assert_eq!(ledger.read_ids().expect("read ids").len(), 2);
        assert_eq!(manifest.len(), 2);
    }
}
