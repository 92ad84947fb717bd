//! Remote compute-platform abstraction for submitting and listing export
//! jobs.
//!
//! The actual pixel computation runs entirely inside the remote platform;
//! this crate only describes exports as requests, submits them, and reads
//! job status back. The trait seam keeps the polling and reconciliation
//! logic testable against scripted platforms.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::naming::ArtifactName;

/// Opaque identifier assigned by the platform to one submitted job.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state reported by the platform for a job.
///
/// Classification downstream is total over all five states; an unknown
/// string maps to `None` and is surfaced as a listing error by callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    /// Accepted, not yet scheduled.
    Ready,
    /// Executing.
    Running,
    /// Finished successfully; outputs written to remote storage.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Cancelled by an operator or the platform.
    Cancelled,
}

impl JobState {
    /// Maps the platform's wire string onto a state.
    #[must_use]
    pub fn from_remote(value: &str) -> Option<Self> {
        match value {
            "READY" => Some(Self::Ready),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` for states that may still transition.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Returns `true` for terminal-but-unsuccessful states.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

/// One job's status as returned by the platform listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobRecord {
    /// Platform-assigned identifier.
    pub id: JobId,
    /// Current lifecycle state.
    pub state: JobState,
}

/// Destination for an export.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportKind {
    /// Export to bulk remote storage for later retrieval.
    Storage,
    /// Export to the platform's long-lived asset archive.
    Archive,
}

/// Fully formed remote export descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportRequest {
    /// Output name; must follow the artifact naming convention.
    pub description: String,
    /// Polygon bounds of the export region, serialised for the wire.
    pub region_bounds: String,
    /// Ground sample distance in metres.
    pub scale_metres: u32,
    /// Maximum pixel budget the platform may spend on this export.
    pub max_pixels: u64,
    /// Request a cloud-optimised, tiled container.
    pub cloud_optimized: bool,
    /// Shard dimension limit for very large exports, when the platform
    /// splits output files.
    pub file_dimensions: Option<u32>,
    /// Storage or archive destination.
    pub kind: ExportKind,
    /// Expected output artifact recorded for reconciliation.
    pub expected: ArtifactName,
}

impl ExportRequest {
    /// Starts a builder for an [`ExportRequest`].
    #[must_use]
    pub fn builder(expected: ArtifactName) -> ExportRequestBuilder {
        ExportRequestBuilder::new(expected)
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing or inconsistent.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] when the description is empty,
    /// the bounds are empty, the scale is zero, or the description does not
    /// render the expected artifact name.
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.description.is_empty() {
            return Err(PlatformError::Validation("description".to_owned()));
        }
        if self.region_bounds.is_empty() {
            return Err(PlatformError::Validation("region_bounds".to_owned()));
        }
        if self.scale_metres == 0 {
            return Err(PlatformError::Validation("scale_metres".to_owned()));
        }
        if self.max_pixels == 0 {
            return Err(PlatformError::Validation("max_pixels".to_owned()));
        }
        if self.description != self.expected.render() {
            return Err(PlatformError::DescriptionMismatch {
                description: self.description.clone(),
                expected: self.expected.render(),
            });
        }
        Ok(())
    }
}

/// Reference ground sample distance for all exports, in metres.
pub const DEFAULT_SCALE_METRES: u32 = 30;

/// Reference pixel budget for all exports.
pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000_000;

/// Builder for [`ExportRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug)]
pub struct ExportRequestBuilder {
    region_bounds: String,
    scale_metres: u32,
    max_pixels: u64,
    cloud_optimized: bool,
    file_dimensions: Option<u32>,
    kind: ExportKind,
    expected: ArtifactName,
}

impl ExportRequestBuilder {
    /// Creates a builder with the reference scale and pixel budget.
    #[must_use]
    pub fn new(expected: ArtifactName) -> Self {
        Self {
            region_bounds: String::new(),
            scale_metres: DEFAULT_SCALE_METRES,
            max_pixels: DEFAULT_MAX_PIXELS,
            cloud_optimized: true,
            file_dimensions: None,
            kind: ExportKind::Storage,
            expected,
        }
    }

    /// Sets the export region bounds.
    #[must_use]
    pub fn region_bounds(mut self, value: impl Into<String>) -> Self {
        self.region_bounds = value.into();
        self
    }

    /// Overrides the ground sample distance.
    #[must_use]
    pub const fn scale_metres(mut self, value: u32) -> Self {
        self.scale_metres = value;
        self
    }

    /// Overrides the pixel budget.
    #[must_use]
    pub const fn max_pixels(mut self, value: u64) -> Self {
        self.max_pixels = value;
        self
    }

    /// Toggles the cloud-optimised container option.
    #[must_use]
    pub const fn cloud_optimized(mut self, value: bool) -> Self {
        self.cloud_optimized = value;
        self
    }

    /// Sets the shard dimension limit for very large exports.
    #[must_use]
    pub const fn file_dimensions(mut self, value: Option<u32>) -> Self {
        self.file_dimensions = value;
        self
    }

    /// Selects the storage or archive destination.
    #[must_use]
    pub const fn kind(mut self, value: ExportKind) -> Self {
        self.kind = value;
        self
    }

    /// Builds and validates the [`ExportRequest`]. The description is
    /// derived from the expected artifact so the two can never diverge.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] when a required field is empty
    /// or zero.
    pub fn build(self) -> Result<ExportRequest, PlatformError> {
        let request = ExportRequest {
            description: self.expected.render(),
            region_bounds: self.region_bounds.trim().to_owned(),
            scale_metres: self.scale_metres,
            max_pixels: self.max_pixels,
            cloud_optimized: self.cloud_optimized,
            file_dimensions: self.file_dimensions,
            kind: self.kind,
            expected: self.expected,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised by compute-platform request construction.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PlatformError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a description diverges from the expected artifact name.
    #[error("description '{description}' does not match expected artifact '{expected}'")]
    DescriptionMismatch {
        /// Description supplied on the request.
        description: String,
        /// Canonical rendering of the expected artifact.
        expected: String,
    },
}

/// Future returned by platform operations.
pub type PlatformFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by remote compute platforms.
pub trait ComputePlatform {
    /// Platform specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits an export job. Fire-and-forget: the platform schedules
    /// independently and the returned id is the only link back to the job.
    fn submit<'a>(
        &'a self,
        request: &'a ExportRequest,
    ) -> PlatformFuture<'a, JobId, Self::Error>;

    /// Fetches the full job-status listing visible to this account.
    fn list_jobs(&self) -> PlatformFuture<'_, Vec<JobRecord>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::naming::{ProductIndex, Qualifier, Region, Satellite, Variant};

    fn expected_artifact() -> ArtifactName {
        ArtifactName {
            index: ProductIndex::Swir,
            variant: Variant::Latest,
            year_start: 2023,
            year_end: 2022,
            qualifier: Qualifier::Plain,
            satellite: Satellite::L8,
            region: Some(Region::Conus),
        }
    }

    #[test]
    fn builder_defaults_match_reference_cadence() {
        let request = ExportRequest::builder(expected_artifact())
            .region_bounds("[[-106.6,24.5],[-75.2,39.5]]")
            .build()
            .expect("request should build");

        assert_eq!(request.scale_metres, DEFAULT_SCALE_METRES);
        assert_eq!(request.max_pixels, DEFAULT_MAX_PIXELS);
        assert!(request.cloud_optimized);
        assert_eq!(
            request.description,
            "SWIR-Latest-Change-Between-2023-and-2022L8CONUS"
        );
    }

    #[test]
    fn builder_rejects_empty_bounds() {
        let result = ExportRequest::builder(expected_artifact()).build();
        assert_eq!(
            result.err(),
            Some(PlatformError::Validation("region_bounds".to_owned()))
        );
    }

    #[rstest]
    #[case("READY", Some(JobState::Ready))]
    #[case("RUNNING", Some(JobState::Running))]
    #[case("COMPLETED", Some(JobState::Completed))]
    #[case("FAILED", Some(JobState::Failed))]
    #[case("CANCELLED", Some(JobState::Cancelled))]
    #[case("UNSUBMITTED", None)]
    fn job_state_mapping_is_total_over_known_states(
        #[case] wire: &str,
        #[case] expected: Option<JobState>,
    ) {
        assert_eq!(JobState::from_remote(wire), expected);
    }

    #[test]
    fn pending_and_failure_partitions_do_not_overlap() {
        for state in [
            JobState::Ready,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert!(!(state.is_pending() && state.is_terminal_failure()));
        }
    }
}
