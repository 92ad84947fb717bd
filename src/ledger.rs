//! Durable job-id ledger.
//!
//! A single flat text file of comma-separated job ids. Each id is appended
//! with a leading separator as soon as the platform acknowledges the
//! submission, so a crash after any submission never loses track of
//! outstanding work. The file is append-only during submission and read-only
//! during tracking; empty tokens are discarded on read.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::platform::JobId;

const SEPARATOR: char = ',';

/// Errors raised by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Raised when the ledger path has no file name component.
    #[error("ledger path {path} is missing a filename")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Append-only ledger of submitted job ids bound to one file.
#[derive(Debug)]
pub struct JobLedger {
    dir: Dir,
    file_name: String,
    path: Utf8PathBuf,
}

impl JobLedger {
    /// Opens the ledger at `path`, creating an empty file when absent. The
    /// parent directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPath`] when `path` has no filename and
    /// [`LedgerError::Io`] when the parent directory cannot be opened or the
    /// file cannot be created.
    pub fn open(path: &Utf8Path) -> Result<Self, LedgerError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| LedgerError::InvalidPath {
                path: path.to_path_buf(),
            })?
            .to_owned();

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
            LedgerError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let exists = dir.try_exists(&file_name).map_err(|err| LedgerError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if !exists {
            dir.write(&file_name, "").map_err(|err| LedgerError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        }

        Ok(Self {
            dir,
            file_name,
            path: path.to_path_buf(),
        })
    }

    /// Opens the ledger at `path` and truncates any previous content. Used
    /// at the start of a new submission batch.
    ///
    /// # Errors
    ///
    /// Propagates the same errors as [`JobLedger::open`].
    pub fn create(path: &Utf8Path) -> Result<Self, LedgerError> {
        let ledger = Self::open(path)?;
        ledger
            .dir
            .write(&ledger.file_name, "")
            .map_err(|err| ledger.io_error(&err))?;
        Ok(ledger)
    }

    /// Appends one job id, prefixed with the record separator, and flushes
    /// it to disk before returning.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] when the write fails.
    pub fn append(&self, id: &JobId) -> Result<(), LedgerError> {
        let mut options = OpenOptions::new();
        options.append(true);
        let mut file = self
            .dir
            .open_with(&self.file_name, &options)
            .map_err(|err| self.io_error(&err))?;
        write!(file, "{SEPARATOR}{id}").map_err(|err| self.io_error(&err))?;
        file.flush().map_err(|err| self.io_error(&err))?;
        Ok(())
    }

    /// Reads back every recorded id in submission order, discarding empty
    /// tokens produced by the leading separators.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] when the file cannot be read.
    pub fn read_ids(&self) -> Result<Vec<JobId>, LedgerError> {
        let contents = self
            .dir
            .read_to_string(&self.file_name)
            .map_err(|err| self.io_error(&err))?;
        Ok(contents
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| JobId(token.to_owned()))
            .collect())
    }

    /// Path this ledger is bound to.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, err: &std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}
