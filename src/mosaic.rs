//! Mosaic planning and regional GeoTIFF production.
//!
//! Staged per-region rasters are grouped by structural selector and merged
//! with `gdalwarp` into a fixed equal-area reference system, then packaged
//! with `gdal_translate` as tiled, DEFLATE-compressed BigTIFFs so outputs
//! can exceed single-block addressing. A mosaic never runs with an
//! incomplete group: missing artifacts fail the batch loudly, listing the
//! absent names.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::context::{BatchContext, ExportManifest};
use crate::naming::{ArtifactKind, ArtifactName, ArtifactSelector};
use crate::process::{CommandRunner, ProcessError};
use crate::retrieval::StagedArtifact;

/// Equal-area spatial reference all mosaics are warped into.
pub const TARGET_SRS: &str = "EPSG:5070";

/// Creation options applied to every published GeoTIFF.
pub const GEOTIFF_CREATION_OPTIONS: [&str; 4] = [
    "TILED=YES",
    "COPY_SRC_OVERVIEWS=YES",
    "COMPRESS=DEFLATE",
    "BIGTIFF=YES",
];

/// Errors raised while planning or producing mosaics.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// Raised when an expected sub-region artifact is not staged. The batch
    /// fails rather than producing an incomplete mosaic.
    #[error("mosaic {output} is missing expected artifact(s): {}", missing.join(", "))]
    MissingArtifacts {
        /// Output name of the incomplete mosaic.
        output: String,
        /// Canonical names of the absent artifacts.
        missing: Vec<String>,
    },
    /// Raised when a GDAL tool exits non-zero.
    #[error("{program} failed with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status rendered for diagnostics.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when a GDAL tool cannot be started.
    #[error(transparent)]
    Spawn(#[from] ProcessError),
}

/// One planned mosaic: the group selector, the expected roster, and the
/// output file name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MosaicPlan {
    /// Structural selector for group membership.
    pub selector: ArtifactSelector,
    /// Every artifact that must be staged before the merge may run.
    pub expected: Vec<ArtifactName>,
    /// Output file name in the publish directory.
    pub output_name: String,
}

/// Derives mosaic plans from the manifest recorded at submission time.
/// Rasters sharing {index, qualifier, region} form one group; tables are
/// never mosaicked.
#[must_use]
pub fn plan_mosaics(context: &BatchContext, manifest: &ExportManifest) -> Vec<MosaicPlan> {
    let mut plans: Vec<MosaicPlan> = Vec::new();
    for artifact in manifest.rasters() {
        let ArtifactKind::Raster(region) = artifact.kind() else {
            continue;
        };
        let selector = ArtifactSelector {
            index: artifact.index,
            qualifier: artifact.qualifier,
            region: Some(region),
        };
        if let Some(plan) = plans.iter_mut().find(|plan| plan.selector == selector) {
            plan.expected.push(artifact.clone());
            continue;
        }
        plans.push(MosaicPlan {
            selector,
            expected: vec![artifact.clone()],
            output_name: format!(
                "{index}{qualifier}{label}{satellite}{region}.tif",
                index = artifact.index.lower_token(),
                qualifier = artifact.qualifier.token(),
                label = context.product_label(),
                satellite = context.satellite.token(),
                region = region.token(),
            ),
        });
    }
    plans
}

/// Produces regional GeoTIFFs from staged artifacts via GDAL.
#[derive(Debug)]
pub struct Mosaicker<R> {
    runner: R,
    warp_bin: String,
    translate_bin: String,
}

impl<R: CommandRunner> Mosaicker<R> {
    /// Creates a mosaicker using the given GDAL binaries.
    pub fn new(runner: R, warp_bin: impl Into<String>, translate_bin: impl Into<String>) -> Self {
        Self {
            runner,
            warp_bin: warp_bin.into(),
            translate_bin: translate_bin.into(),
        }
    }

    /// Runs every plan, failing on the first incomplete group or tool
    /// failure. Returns the published output paths.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::MissingArtifacts`] for an incomplete group and
    /// [`MosaicError::CommandFailure`] when a GDAL invocation fails.
    pub fn mosaic_all(
        &self,
        context: &BatchContext,
        plans: &[MosaicPlan],
        staged: &[StagedArtifact],
    ) -> Result<Vec<Utf8PathBuf>, MosaicError> {
        let mut outputs = Vec::with_capacity(plans.len());
        for plan in plans {
            outputs.push(self.mosaic(context, plan, staged)?);
        }
        Ok(outputs)
    }

    /// Runs one plan: completeness check, warp, translate.
    ///
    /// # Errors
    ///
    /// See [`Mosaicker::mosaic_all`].
    pub fn mosaic(
        &self,
        context: &BatchContext,
        plan: &MosaicPlan,
        staged: &[StagedArtifact],
    ) -> Result<Utf8PathBuf, MosaicError> {
        let members: Vec<&StagedArtifact> = staged
            .iter()
            .filter(|artifact| plan.selector.matches(&artifact.artifact))
            .collect();

        let missing: Vec<String> = plan
            .expected
            .iter()
            .filter(|expected| {
                !members
                    .iter()
                    .any(|member| member.artifact == **expected)
            })
            .map(ArtifactName::render)
            .collect();
        if !missing.is_empty() {
            return Err(MosaicError::MissingArtifacts {
                output: plan.output_name.clone(),
                missing,
            });
        }

        let merged = context.staging_path(&plan.output_name);
        let published = context.publish_path(&plan.output_name);

        info!(
            output = %plan.output_name,
            inputs = members.len(),
            "merging mosaic group"
        );
        self.run_warp(&members, &merged)?;
        self.run_translate(&merged, &published)?;
        Ok(published)
    }

    fn run_warp(
        &self,
        members: &[&StagedArtifact],
        merged: &Utf8PathBuf,
    ) -> Result<(), MosaicError> {
        let mut args = vec![OsString::from("-t_srs"), OsString::from(TARGET_SRS)];
        // Overwrite-safe merge: overlaps are disjoint by region design, so
        // last-writer-wins at the seams is acceptable.
        args.push(OsString::from("-overwrite"));
        for member in members {
            args.push(OsString::from(member.path.as_str()));
        }
        args.push(OsString::from(merged.as_str()));
        self.run_checked(&self.warp_bin, &args)
    }

    fn run_translate(
        &self,
        merged: &Utf8PathBuf,
        published: &Utf8PathBuf,
    ) -> Result<(), MosaicError> {
        let mut args = vec![
            OsString::from(merged.as_str()),
            OsString::from(published.as_str()),
        ];
        for option in GEOTIFF_CREATION_OPTIONS {
            args.push(OsString::from("-co"));
            args.push(OsString::from(option));
        }
        self.run_checked(&self.translate_bin, &args)
    }

    fn run_checked(&self, program: &str, args: &[OsString]) -> Result<(), MosaicError> {
        let output = self.runner.run(program, args)?;
        if output.is_success() {
            return Ok(());
        }
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(MosaicError::CommandFailure {
            program: program.to_owned(),
            status_text,
            stderr: output.stderr,
        })
    }
}
