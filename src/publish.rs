//! Best-effort publication of finished outputs to long-term storage.
//!
//! Uploads go through the object-storage CLI driven by the command-runner
//! seam. A failed upload is logged and itemized but never aborts the
//! remaining uploads; the batch's ultimate success is judged by the files
//! present in the publish directory.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::process::{CommandRunner, ProcessError};

/// Errors raised while publishing outputs.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Raised when the publish directory cannot be enumerated.
    #[error("failed to list publish directory {path}: {message}")]
    ListDir {
        /// Directory that could not be read.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the upload tool cannot be started at all.
    #[error(transparent)]
    Spawn(#[from] ProcessError),
    /// Raised when one upload exits non-zero.
    #[error("upload of {key} failed with status {status_text}: {stderr}")]
    UploadFailed {
        /// Destination key that failed.
        key: String,
        /// Exit status rendered for diagnostics.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Abstraction over single-file uploads to long-term storage.
pub trait Uploader {
    /// Uploads `local` to `key` within the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the upload cannot start or exits
    /// non-zero.
    fn upload(&self, local: &Utf8Path, key: &str) -> Result<(), PublishError>;
}

/// Uploader driving the object-storage CLI (`aws s3 cp`).
#[derive(Debug)]
pub struct AwsCliUploader<R> {
    runner: R,
    aws_bin: String,
    bucket: String,
}

impl<R: CommandRunner> AwsCliUploader<R> {
    /// Creates an uploader targeting `bucket` through `aws_bin`.
    pub fn new(runner: R, aws_bin: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            runner,
            aws_bin: aws_bin.into(),
            bucket: bucket.into(),
        }
    }
}

impl<R: CommandRunner> Uploader for AwsCliUploader<R> {
    fn upload(&self, local: &Utf8Path, key: &str) -> Result<(), PublishError> {
        let args = vec![
            OsString::from("s3"),
            OsString::from("cp"),
            OsString::from(local.as_str()),
            OsString::from(format!("s3://{}/{key}", self.bucket)),
        ];
        let output = self.runner.run(&self.aws_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(PublishError::UploadFailed {
            key: key.to_owned(),
            status_text,
            stderr: output.stderr,
        })
    }
}

/// Summary of one publication pass.
#[derive(Debug, Default)]
pub struct PublishSummary {
    /// Keys uploaded successfully.
    pub uploaded: Vec<String>,
    /// Failed keys with their errors, in directory order.
    pub failures: Vec<(String, PublishError)>,
}

impl PublishSummary {
    /// Returns `true` when every file uploaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Uploads one file under the batch prefix.
///
/// # Errors
///
/// Propagates the uploader's [`PublishError`].
pub fn publish_file<U: Uploader>(
    uploader: &U,
    local: &Utf8Path,
    prefix: &str,
) -> Result<String, PublishError> {
    let file_name = local.file_name().unwrap_or(local.as_str());
    let key = format!("{prefix}{file_name}");
    uploader.upload(local, &key)?;
    info!(key = %key, "published");
    Ok(key)
}

/// Uploads every regular file in `dir` under `prefix`, best-effort.
/// Individual failures are logged and itemized in the summary.
///
/// # Errors
///
/// Returns [`PublishError::ListDir`] only when the directory itself cannot
/// be enumerated.
pub fn publish_directory<U: Uploader>(
    uploader: &U,
    dir: &Utf8Path,
    prefix: &str,
) -> Result<PublishSummary, PublishError> {
    let entries = dir.read_dir_utf8().map_err(|err| PublishError::ListDir {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })?;

    let mut summary = PublishSummary::default();
    for entry in entries {
        let entry = entry.map_err(|err| PublishError::ListDir {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match publish_file(uploader, path, prefix) {
            Ok(key) => summary.uploaded.push(key),
            Err(err) => {
                let key = format!("{prefix}{}", entry.file_name());
                warn!(key = %key, error = %err, "upload failed; continuing");
                summary.failures.push((key, err));
            }
        }
    }
    summary.uploaded.sort();
    Ok(summary)
}
