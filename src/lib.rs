//! Core library for the changecast export pipeline.
//!
//! The crate orchestrates change-detection export batches on a remote
//! compute platform: submit exports and record their job ids durably, poll
//! until the batch settles, retrieve artifacts from remote storage with
//! at-most-once semantics, merge the per-region rasters into regional
//! GeoTIFFs, and publish the results to long-term storage.

pub mod config;
pub mod context;
pub mod ledger;
pub mod logging;
pub mod mosaic;
pub mod naming;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod publish;
pub mod remote;
pub mod retrieval;
pub mod store;
pub mod submit;
pub mod tracker;

pub use config::{ConfigError, PipelineConfig};
pub use context::{BatchContext, BatchContextBuilder, ContextError, ExportManifest};
pub use ledger::{JobLedger, LedgerError};
pub use mosaic::{MosaicError, MosaicPlan, Mosaicker, plan_mosaics};
pub use naming::{
    ArtifactKind, ArtifactName, ArtifactSelector, ProductIndex, Qualifier, Region, Satellite,
    Variant,
};
pub use pipeline::{PipelineError, PipelineOrchestrator, PipelineReport};
pub use platform::{
    ComputePlatform, ExportKind, ExportRequest, ExportRequestBuilder, JobId, JobRecord, JobState,
    PlatformError,
};
pub use process::{CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError};
pub use publish::{AwsCliUploader, PublishError, PublishSummary, Uploader};
pub use remote::{ComputeApiError, HttpComputePlatform, HttpObjectStore, StoreApiError};
pub use retrieval::{RetrievalError, RetrievalReport, Retriever, StagedArtifact};
pub use store::{ObjectId, ObjectQuery, RemoteObject, RemoteStore};
pub use submit::{SubmitError, Submitter, plan_exports};
pub use tracker::{
    JobClassification, Settlement, ShutdownHandle, ShutdownSignal, Tracker, TrackerError,
    WaitOutcome,
};
