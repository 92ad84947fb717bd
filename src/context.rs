//! Per-batch context carried by value through every pipeline component.
//!
//! Replaces ambient module state: ledger location, staging and publish
//! directories, and the satellite/variant/year parameters travel together,
//! so two batches can never share file handles or directory constants by
//! accident.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::naming::{ArtifactKind, ArtifactName, Satellite, Variant};

/// Default publish prefix for rolling latest-change batches.
pub const LATEST_BUCKET_PREFIX: &str = "current-year-to-date/";

/// Errors raised while assembling a batch context.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ContextError {
    /// Raised when a required field is missing or empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when the year pair is not a descending consecutive range.
    #[error("year range {start}-{end} is not a descending pair")]
    YearRange {
        /// More recent year.
        start: u16,
        /// Older year.
        end: u16,
    },
}

/// Immutable parameters of one pipeline batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchContext {
    /// Unique identifier for this run, used in log correlation.
    pub batch_id: Uuid,
    /// Satellite source for every product in the batch.
    pub satellite: Satellite,
    /// Latest or custom (yearly) variant.
    pub variant: Variant,
    /// More recent year of the change pair.
    pub year_start: u16,
    /// Older year of the change pair.
    pub year_end: u16,
    /// Destination prefix within the long-term storage bucket.
    pub bucket_prefix: String,
    /// Ledger file recording submitted job ids.
    pub ledger_path: Utf8PathBuf,
    /// Local staging directory for retrieved artifacts.
    pub staging_dir: Utf8PathBuf,
    /// Local directory holding finished mosaics awaiting upload.
    pub publish_dir: Utf8PathBuf,
}

impl BatchContext {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> BatchContextBuilder {
        BatchContextBuilder::default()
    }

    /// Product label embedded in mosaic output names:
    /// `LatestChange` for rolling batches, `YearlyChange<YYYY>` otherwise.
    #[must_use]
    pub fn product_label(&self) -> String {
        match self.variant {
            Variant::Latest => String::from("LatestChange"),
            Variant::Custom => format!("YearlyChange{}", self.year_start),
        }
    }

    /// Staging path for a retrieved object name.
    #[must_use]
    pub fn staging_path(&self, name: &str) -> Utf8PathBuf {
        self.staging_dir.join(name)
    }

    /// Publish path for a mosaic output name.
    #[must_use]
    pub fn publish_path(&self, name: &str) -> Utf8PathBuf {
        self.publish_dir.join(name)
    }
}

/// Builder for [`BatchContext`] that defers validation to construction.
#[derive(Clone, Debug, Default)]
pub struct BatchContextBuilder {
    satellite: Option<Satellite>,
    variant: Option<Variant>,
    year_start: u16,
    year_end: u16,
    bucket_prefix: String,
    ledger_path: Utf8PathBuf,
    staging_dir: Utf8PathBuf,
    publish_dir: Utf8PathBuf,
}

impl BatchContextBuilder {
    /// Sets the satellite source.
    #[must_use]
    pub const fn satellite(mut self, value: Satellite) -> Self {
        self.satellite = Some(value);
        self
    }

    /// Sets the product variant.
    #[must_use]
    pub const fn variant(mut self, value: Variant) -> Self {
        self.variant = Some(value);
        self
    }

    /// Sets the descending year pair.
    #[must_use]
    pub const fn years(mut self, start: u16, end: u16) -> Self {
        self.year_start = start;
        self.year_end = end;
        self
    }

    /// Sets the bucket prefix.
    #[must_use]
    pub fn bucket_prefix(mut self, value: impl Into<String>) -> Self {
        self.bucket_prefix = value.into();
        self
    }

    /// Sets the ledger file path.
    #[must_use]
    pub fn ledger_path(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.ledger_path = value.into();
        self
    }

    /// Sets the staging directory.
    #[must_use]
    pub fn staging_dir(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.staging_dir = value.into();
        self
    }

    /// Sets the publish directory.
    #[must_use]
    pub fn publish_dir(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.publish_dir = value.into();
        self
    }

    /// Builds and validates the context, assigning a fresh batch id.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Validation`] when a required field is missing
    /// and [`ContextError::YearRange`] when the year pair is not a
    /// descending consecutive range.
    pub fn build(self) -> Result<BatchContext, ContextError> {
        let satellite = self
            .satellite
            .ok_or_else(|| ContextError::Validation("satellite".to_owned()))?;
        let variant = self
            .variant
            .ok_or_else(|| ContextError::Validation("variant".to_owned()))?;
        if self.year_start == 0 || self.year_start != self.year_end.saturating_add(1) {
            return Err(ContextError::YearRange {
                start: self.year_start,
                end: self.year_end,
            });
        }
        require_path(&self.ledger_path, "ledger_path")?;
        require_path(&self.staging_dir, "staging_dir")?;
        require_path(&self.publish_dir, "publish_dir")?;

        let bucket_prefix = if self.bucket_prefix.trim().is_empty() {
            String::from(LATEST_BUCKET_PREFIX)
        } else {
            self.bucket_prefix.trim().to_owned()
        };

        Ok(BatchContext {
            batch_id: Uuid::new_v4(),
            satellite,
            variant,
            year_start: self.year_start,
            year_end: self.year_end,
            bucket_prefix,
            ledger_path: self.ledger_path,
            staging_dir: self.staging_dir,
            publish_dir: self.publish_dir,
        })
    }
}

fn require_path(path: &Utf8Path, field: &str) -> Result<(), ContextError> {
    if path.as_str().trim().is_empty() {
        return Err(ContextError::Validation(field.to_owned()));
    }
    Ok(())
}

/// Expected artifacts recorded at submission time, consulted by the mosaic
/// completeness check.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExportManifest {
    entries: Vec<ArtifactName>,
}

impl ExportManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records one expected artifact.
    pub fn record(&mut self, artifact: ArtifactName) {
        self.entries.push(artifact);
    }

    /// Expected regional raster artifacts.
    pub fn rasters(&self) -> impl Iterator<Item = &ArtifactName> {
        self.entries
            .iter()
            .filter(|artifact| matches!(artifact.kind(), ArtifactKind::Raster(_)))
    }

    /// Expected scene-table artifacts.
    pub fn tables(&self) -> impl Iterator<Item = &ArtifactName> {
        self.entries
            .iter()
            .filter(|artifact| matches!(artifact.kind(), ArtifactKind::Table))
    }

    /// Number of expected artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> BatchContextBuilder {
        BatchContext::builder()
            .satellite(Satellite::L8)
            .variant(Variant::Latest)
            .years(2023, 2022)
            .ledger_path("/tmp/ids.txt")
            .staging_dir("/tmp/staging")
            .publish_dir("/tmp/publish")
    }

    #[test]
    fn latest_variant_defaults_bucket_prefix() {
        let context = builder().build().expect("context should build");
        assert_eq!(context.bucket_prefix, LATEST_BUCKET_PREFIX);
        assert_eq!(context.product_label(), "LatestChange");
    }

    #[test]
    fn yearly_variant_labels_products_with_the_year() {
        let context = builder()
            .variant(Variant::Custom)
            .years(2019, 2018)
            .bucket_prefix("2019-2018/")
            .build()
            .expect("context should build");
        assert_eq!(context.product_label(), "YearlyChange2019");
        assert_eq!(context.bucket_prefix, "2019-2018/");
    }

    #[test]
    fn rejects_non_descending_year_pair() {
        let result = builder().years(2022, 2022).build();
        assert_eq!(
            result.err(),
            Some(ContextError::YearRange {
                start: 2022,
                end: 2022
            })
        );
    }

    #[test]
    fn rejects_missing_staging_dir() {
        let result = builder().staging_dir("").build();
        assert_eq!(
            result.err(),
            Some(ContextError::Validation("staging_dir".to_owned()))
        );
    }
}
