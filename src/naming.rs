//! Artifact naming grammar shared by export submission, retrieval, and
//! mosaic grouping.
//!
//! Every object produced by the remote platform follows one structural
//! convention:
//!
//! `<INDEX>(-Latest|-Custom)-Change-Between-<YYYY>-and-<YYYY><qualifier><SAT>(CONUS|PRVI)?`
//!
//! optionally followed by a `.tif` or `.csv` extension. The convention is the
//! sole mechanism associating remote artifacts with local mosaic groups, so
//! rendering must be preserved bit-exact for downstream consumers.

use std::fmt;

/// Spectral index a change product was derived from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProductIndex {
    /// Normalised difference vegetation index.
    Ndvi,
    /// Shortwave infrared single-band difference.
    Swir,
    /// Normalised difference moisture index.
    Ndmi,
}

impl ProductIndex {
    /// Uppercase token used in artifact names.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Swir => "SWIR",
            Self::Ndmi => "NDMI",
        }
    }

    /// Lowercase token used in mosaic output file names.
    #[must_use]
    pub const fn lower_token(self) -> &'static str {
        match self {
            Self::Ndvi => "ndvi",
            Self::Swir => "swir",
            Self::Ndmi => "ndmi",
        }
    }
}

impl fmt::Display for ProductIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Change-product variant qualifier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Variant {
    /// Rolling year-to-date product.
    Latest,
    /// Operator-selected custom date range (yearly products).
    Custom,
}

impl Variant {
    /// Token used in artifact names, including the leading hyphen.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Latest => "-Latest",
            Self::Custom => "-Custom",
        }
    }
}

/// Satellite source for a product batch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Satellite {
    /// Landsat 8 surface reflectance.
    L8,
    /// Sentinel-2.
    S2,
}

impl Satellite {
    /// Token used in artifact names.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::L8 => "L8",
            Self::S2 => "S2",
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Regional sub-artifact code. Each logical product splits into a mainland
/// mosaic and an island mosaic.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Region {
    /// Conterminous United States portion.
    Conus,
    /// Puerto Rico and Virgin Islands portion.
    Prvi,
}

impl Region {
    /// Token used in artifact names.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Conus => "CONUS",
            Self::Prvi => "PRVI",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Qualifier appearing between the year range and the satellite token.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Qualifier {
    /// The change raster itself.
    Plain,
    /// Per-pixel observation dates for the range start composite.
    DatesBegin,
    /// Per-pixel observation dates for the range end composite.
    DatesEnd,
    /// Scene-identifier table for the range start composite.
    ScenesBegin,
    /// Scene-identifier table for the range end composite.
    ScenesEnd,
}

impl Qualifier {
    /// Token used in artifact names (empty for the plain raster).
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Plain => "",
            Self::DatesBegin => "datesBegin",
            Self::DatesEnd => "datesEnd",
            Self::ScenesBegin => "scenesBegin",
            Self::ScenesEnd => "scenesEnd",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "" => Some(Self::Plain),
            "datesBegin" => Some(Self::DatesBegin),
            "datesEnd" => Some(Self::DatesEnd),
            "scenesBegin" => Some(Self::ScenesBegin),
            "scenesEnd" => Some(Self::ScenesEnd),
            _ => None,
        }
    }
}

/// Broad classification of an artifact.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArtifactKind {
    /// A raster tile belonging to one regional mosaic group.
    Raster(Region),
    /// A scene-identifier table (CSV); never mosaicked.
    Table,
}

/// Fully parsed artifact name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ArtifactName {
    /// Spectral index of the product.
    pub index: ProductIndex,
    /// Latest or custom variant.
    pub variant: Variant,
    /// More recent year of the change pair.
    pub year_start: u16,
    /// Older year of the change pair.
    pub year_end: u16,
    /// Qualifier between the year range and the satellite token.
    pub qualifier: Qualifier,
    /// Satellite source.
    pub satellite: Satellite,
    /// Regional code; absent for scene tables.
    pub region: Option<Region>,
}

impl ArtifactName {
    /// Parses an object name, tolerating a trailing `.tif` or `.csv`
    /// extension. Returns `None` when the name does not follow the
    /// convention; such objects do not belong to this pipeline.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name
            .strip_suffix(".tif")
            .or_else(|| name.strip_suffix(".csv"))
            .unwrap_or(name);

        let (index, rest) = parse_index(stem)?;
        let (variant, rest) = parse_variant(rest)?;
        let rest = rest.strip_prefix("-Change-Between-")?;
        let (year_start, rest) = take_year(rest)?;
        let rest = rest.strip_prefix("-and-")?;
        let (year_end, rest) = take_year(rest)?;

        let (region, rest) = strip_region(rest);
        let (satellite, qualifier_token) = strip_satellite(rest)?;
        let qualifier = Qualifier::from_token(qualifier_token)?;

        Some(Self {
            index,
            variant,
            year_start,
            year_end,
            qualifier,
            satellite,
            region,
        })
    }

    /// Renders the canonical name without an extension.
    #[must_use]
    pub fn render(&self) -> String {
        let region = self.region.map_or("", Region::token);
        format!(
            "{index}{variant}-Change-Between-{start:04}-and-{end:04}{qualifier}{satellite}{region}",
            index = self.index.token(),
            variant = self.variant.token(),
            start = self.year_start,
            end = self.year_end,
            qualifier = self.qualifier.token(),
            satellite = self.satellite.token(),
        )
    }

    /// Classifies the artifact as a regional raster or a scene table.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        match self.region {
            Some(region) => ArtifactKind::Raster(region),
            None => ArtifactKind::Table,
        }
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Structural selector matching artifacts into one mosaic group, ignoring
/// the variant and year range.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ArtifactSelector {
    /// Required spectral index.
    pub index: ProductIndex,
    /// Required qualifier.
    pub qualifier: Qualifier,
    /// Required region; `None` selects scene tables.
    pub region: Option<Region>,
}

impl ArtifactSelector {
    /// Returns `true` when `artifact` belongs to this group.
    #[must_use]
    pub fn matches(&self, artifact: &ArtifactName) -> bool {
        self.index == artifact.index
            && self.qualifier == artifact.qualifier
            && self.region == artifact.region
    }
}

fn parse_index(input: &str) -> Option<(ProductIndex, &str)> {
    for index in [ProductIndex::Ndvi, ProductIndex::Swir, ProductIndex::Ndmi] {
        if let Some(rest) = input.strip_prefix(index.token()) {
            return Some((index, rest));
        }
    }
    None
}

fn parse_variant(input: &str) -> Option<(Variant, &str)> {
    for variant in [Variant::Latest, Variant::Custom] {
        if let Some(rest) = input.strip_prefix(variant.token()) {
            return Some((variant, rest));
        }
    }
    None
}

fn take_year(input: &str) -> Option<(u16, &str)> {
    let mut chars = input.chars();
    let mut value: u16 = 0;
    for _ in 0..4 {
        let digit = chars.next()?.to_digit(10)?;
        value = value.checked_mul(10)?.checked_add(u16::try_from(digit).ok()?)?;
    }
    Some((value, chars.as_str()))
}

fn strip_region(input: &str) -> (Option<Region>, &str) {
    for region in [Region::Conus, Region::Prvi] {
        if let Some(rest) = input.strip_suffix(region.token()) {
            return (Some(region), rest);
        }
    }
    (None, input)
}

fn strip_satellite(input: &str) -> Option<(Satellite, &str)> {
    for satellite in [Satellite::L8, Satellite::S2] {
        if let Some(rest) = input.strip_suffix(satellite.token()) {
            return Some((satellite, rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_regional_raster_name() {
        let parsed = ArtifactName::parse("NDVI-Latest-Change-Between-2023-and-2022L8CONUS.tif")
            .expect("raster name should parse");

        assert_eq!(parsed.index, ProductIndex::Ndvi);
        assert_eq!(parsed.variant, Variant::Latest);
        assert_eq!(parsed.year_start, 2023);
        assert_eq!(parsed.year_end, 2022);
        assert_eq!(parsed.qualifier, Qualifier::Plain);
        assert_eq!(parsed.satellite, Satellite::L8);
        assert_eq!(parsed.kind(), ArtifactKind::Raster(Region::Conus));
    }

    #[test]
    fn parses_scene_table_name() {
        let parsed = ArtifactName::parse("NDVI-Latest-Change-Between-2023-and-2022scenesBeginL8.csv")
            .expect("table name should parse");

        assert_eq!(parsed.qualifier, Qualifier::ScenesBegin);
        assert_eq!(parsed.satellite, Satellite::L8);
        assert_eq!(parsed.kind(), ArtifactKind::Table);
    }

    #[test]
    fn raster_and_table_fall_into_distinct_groups() {
        let raster = ArtifactName::parse("NDVI-Latest-Change-Between-2023-and-2022L8CONUS.tif")
            .expect("raster name should parse");
        let table = ArtifactName::parse("NDVI-Latest-Change-Between-2023-and-2022scenesBeginL8.csv")
            .expect("table name should parse");

        let raster_group = ArtifactSelector {
            index: ProductIndex::Ndvi,
            qualifier: Qualifier::Plain,
            region: Some(Region::Conus),
        };

        assert!(raster_group.matches(&raster));
        assert!(!raster_group.matches(&table));
    }

    #[rstest]
    #[case("SWIR-Custom-Change-Between-2020-and-2019datesBeginS2PRVI")]
    #[case("NDMI-Latest-Change-Between-2024-and-2023L8PRVI")]
    #[case("SWIR-Custom-Change-Between-2020-and-2019scenesEndS2")]
    fn render_round_trips(#[case] name: &str) {
        let parsed = ArtifactName::parse(name).expect("name should parse");
        assert_eq!(parsed.render(), name);
    }

    #[rstest]
    #[case("EVI-Latest-Change-Between-2023-and-2022L8CONUS")]
    #[case("NDVI-Weekly-Change-Between-2023-and-2022L8CONUS")]
    #[case("NDVI-Latest-Change-Between-23-and-22L8CONUS")]
    #[case("NDVI-Latest-Change-Between-2023-and-2022L9CONUS")]
    #[case("NDVI-Latest-Change-Between-2023-and-2022mysteryL8CONUS")]
    #[case("composite-2023.tif")]
    fn rejects_foreign_names(#[case] name: &str) {
        assert!(ArtifactName::parse(name).is_none(), "should reject {name}");
    }

    #[test]
    fn parsing_is_idempotent_over_repeated_listings() {
        let listing = [
            "SWIR-Latest-Change-Between-2023-and-2022L8CONUS.tif",
            "SWIR-Latest-Change-Between-2023-and-2022L8PRVI.tif",
            "unrelated.txt",
        ];
        let first: Vec<_> = listing.iter().filter_map(|n| ArtifactName::parse(n)).collect();
        let second: Vec<_> = listing.iter().filter_map(|n| ArtifactName::parse(n)).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
