//! Artifact location and at-most-once retrieval.
//!
//! Each storage scan is matched against the naming grammar; matching objects
//! go through a scoped transfer: stream to a temporary file, verify the byte
//! count against the advertised size, rename into the staging directory, and
//! only then delete the remote copy. A failure at any step leaves the remote
//! object in place so the next scan can retry, and is itemized in the
//! report instead of aborting the batch.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::naming::ArtifactName;
use crate::store::{RemoteObject, RemoteStore};

/// One artifact staged locally with its remote copy removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedArtifact {
    /// Original object name.
    pub name: String,
    /// Parsed structural name.
    pub artifact: ArtifactName,
    /// Local staging path.
    pub path: Utf8PathBuf,
    /// Bytes written locally.
    pub bytes: u64,
}

/// Why one object could not be retrieved this scan.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The download itself failed.
    #[error("download of {name} failed: {message}")]
    Download {
        /// Object name.
        name: String,
        /// Store error message.
        message: String,
    },
    /// The local byte count differed from the advertised size.
    #[error("{name}: wrote {actual} bytes but the store advertised {expected}")]
    SizeMismatch {
        /// Object name.
        name: String,
        /// Advertised size.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },
    /// A local filesystem operation failed.
    #[error("local write for {name} failed at {path}: {message}")]
    Io {
        /// Object name.
        name: String,
        /// Local path involved.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// The remote delete failed after a verified local write. The object
    /// will reappear in the next scan and the transfer retried.
    #[error("remote delete of {name} failed: {message}")]
    Delete {
        /// Object name.
        name: String,
        /// Store error message.
        message: String,
    },
}

/// One scan's outcome: staged artifacts plus itemized per-object failures.
#[derive(Debug, Default)]
pub struct RetrievalReport {
    /// Artifacts staged and removed from remote storage this scan.
    pub staged: Vec<StagedArtifact>,
    /// Objects that matched the grammar but could not be retrieved.
    pub failures: Vec<RetrievalError>,
}

impl RetrievalReport {
    /// Number of artifacts newly staged this scan.
    #[must_use]
    pub fn newly_retrieved(&self) -> usize {
        self.staged.len()
    }

    /// Number of convention-matching objects this scan attempted, staged or
    /// not; one of the three settlement signals. Failed transfers count so a
    /// batch cannot settle while an artifact is still awaiting retry.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.staged.len() + self.failures.len()
    }
}

/// Locates and retrieves batch artifacts from a remote store.
#[derive(Debug)]
pub struct Retriever<'a, S> {
    store: &'a S,
    staging_dir: &'a Utf8Path,
}

impl<'a, S: RemoteStore> Retriever<'a, S> {
    /// Creates a retriever staging into `staging_dir`.
    #[must_use]
    pub const fn new(store: &'a S, staging_dir: &'a Utf8Path) -> Self {
        Self { store, staging_dir }
    }

    /// Retrieves every listed object whose name follows the artifact
    /// convention. Objects with foreign names are ignored; they belong to
    /// other tenants of the store.
    pub async fn collect(&self, listing: &[RemoteObject]) -> RetrievalReport {
        let mut report = RetrievalReport::default();
        for object in listing {
            let Some(artifact) = ArtifactName::parse(&object.name) else {
                continue;
            };
            match self.transfer(object, artifact).await {
                Ok(staged) => {
                    info!(name = %staged.name, bytes = staged.bytes, "staged artifact");
                    report.staged.push(staged);
                }
                Err(err) => {
                    warn!(name = %object.name, error = %err, "retrieval failed; will retry next scan");
                    report.failures.push(err);
                }
            }
        }
        report
    }

    /// Scoped transfer for one object: download to a temporary file, verify,
    /// rename, then delete remotely. The remote delete is last so a failed
    /// local write can never lose data.
    async fn transfer(
        &self,
        object: &RemoteObject,
        artifact: ArtifactName,
    ) -> Result<StagedArtifact, RetrievalError> {
        let dest = self.staging_dir.join(&object.name);
        let part = self.staging_dir.join(format!("{}.part", object.name));

        let bytes = match self.store.download(object, &part).await {
            Ok(bytes) => bytes,
            Err(err) => {
                discard_partial(&part);
                return Err(RetrievalError::Download {
                    name: object.name.clone(),
                    message: err.to_string(),
                });
            }
        };

        if let Some(expected) = object.size
            && expected != bytes
        {
            discard_partial(&part);
            return Err(RetrievalError::SizeMismatch {
                name: object.name.clone(),
                expected,
                actual: bytes,
            });
        }

        std::fs::rename(&part, &dest).map_err(|err| {
            discard_partial(&part);
            RetrievalError::Io {
                name: object.name.clone(),
                path: dest.clone(),
                message: err.to_string(),
            }
        })?;

        self.store
            .delete(&object.id)
            .await
            .map_err(|err| RetrievalError::Delete {
                name: object.name.clone(),
                message: err.to_string(),
            })?;

        Ok(StagedArtifact {
            name: object.name.clone(),
            artifact,
            path: dest,
            bytes,
        })
    }
}

fn discard_partial(part: &Utf8Path) {
    // Best effort; a stale .part file is overwritten by the next attempt.
    std::fs::remove_file(part).ok();
}
