use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use encoding_rs::Encoding;
use serde::Deserialize;

use crate::{
    convert::{fields::FieldMapping, simplify::SimplifyAlgorithm},
    crs::crs_utils::Crs,
    geofile::shapefile::encoding_for_label,
};

/// Settings as written in the YAML config file. Every key is optional.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// A distance in units of the target CRS, i.e. degrees for EPSG:4326. With
    /// `visvalingam_preserve` it is a triangle area instead, in squared units.
    pub simplify_tolerance: f64,
    pub simplify_algorithm: SimplifyAlgorithm,
    pub target_crs: String,
    /// Assumed for shapefiles without a `.prj` sidecar.
    pub source_crs_fallback: Option<String>,
    /// Attribute table encoding used when a shapefile has no `.cpg` sidecar.
    pub encoding: String,
    pub field_mapping: FieldMapping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("N02-20_GML"),
            output_dir: PathBuf::from("railway_geojson"),
            simplify_tolerance: 0.001,
            simplify_algorithm: SimplifyAlgorithm::default(),
            target_crs: "EPSG:4326".to_string(),
            source_crs_fallback: None,
            encoding: "cp932".to_string(),
            field_mapping: FieldMapping::default(),
        }
    }
}

/// Validated settings handed to the converter.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub simplify_tolerance: f64,
    pub simplify_algorithm: SimplifyAlgorithm,
    pub target_crs: Crs,
    pub source_crs_fallback: Option<Crs>,
    pub encoding: &'static Encoding,
    pub field_mapping: FieldMapping,
}

impl Config {
    pub fn from_yaml_file(filepath: &Path) -> anyhow::Result<Self> {
        if !filepath.exists() {
            return Err(anyhow!("Config file {:?} not found", filepath));
        }
        let config_contents = read_to_string(filepath)?;
        serde_yaml::from_str(&config_contents)
            .with_context(|| format!("Parsing config file {:?}", filepath))
    }

    pub fn resolve(&self) -> anyhow::Result<ConversionSettings> {
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(anyhow!(
                "simplify_tolerance must be a non-negative number, got {}",
                self.simplify_tolerance
            ));
        }
        let encoding = encoding_for_label(&self.encoding)
            .ok_or_else(|| anyhow!("Unknown encoding '{}'", self.encoding))?;
        let target_crs = self.target_crs.parse::<Crs>().context("Parsing target_crs")?;
        let source_crs_fallback = self
            .source_crs_fallback
            .as_deref()
            .map(str::parse::<Crs>)
            .transpose()
            .context("Parsing source_crs_fallback")?;

        Ok(ConversionSettings {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            simplify_tolerance: self.simplify_tolerance,
            simplify_algorithm: self.simplify_algorithm,
            target_crs,
            source_crs_fallback,
            encoding,
            field_mapping: self.field_mapping.clone(),
        })
    }
}
