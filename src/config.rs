//! Application configuration module.
//!
//! Handles loading, validating, and merging `printcrop.toml` files.
//! Configuration is layered: stock defaults are overridden by each config
//! file in the order given (the input directory's `printcrop.toml` first,
//! then every `--config` file).
//!
//! ## Keys and Defaults
//!
//! ```toml
//! # Every key is optional; the values below are the defaults
//!
//! [crop]
//! ratio_tolerance = 0.01    # Relative error allowed between crop and size ratio
//! min_area = 100            # Smallest accepted manual crop, in image pixels²
//! analysis_max_edge = 600   # Longest edge of the saliency analysis copy
//!
//! [export]
//! quality = 95              # JPEG quality (1-100)
//! date_stamp = false        # Ask the stamp collaborator to decorate outputs
//!
//! [scan]
//! extensions = ["jpg", "jpeg", "png", "tif", "tiff", "webp"]
//!
//! [processing]
//! max_processes = 4         # Export workers (omit to use every core)
//!
//! [size_groups.Wedding]
//! sizes = [
//!     { name = "4x6", alias = "Small" },   # ratio parsed from the name: 4 / 6
//!     { name = "Square", ratio = 1.0 },
//! ]
//! ```
//!
//! ## Sparse Files
//!
//! A file only needs the keys it changes:
//!
//! ```toml
//! [export]
//! quality = 90
//! ```
//!
//! Unknown keys are rejected to catch typos early. Size groups are merged
//! by name; a group's `sizes` list is replaced as a whole.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Application configuration loaded from `printcrop.toml`.
///
/// Every table defaults independently, so a project file can be as small
/// as one key. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Crop geometry and analysis settings.
    pub crop: CropConfig,
    /// Output encoding settings.
    pub export: ExportConfig,
    /// Input directory scanning.
    pub scan: ScanConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Size groups by name, each with its allowed print sizes.
    pub size_groups: BTreeMap<String, SizeGroupConfig>,
}

impl AppConfig {
    /// Check every value is usable before anything is built from it.
    ///
    /// Size-group contents are validated when the
    /// [`SizeCatalog`](crate::catalog::SizeCatalog) is built from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tol = self.crop.ratio_tolerance;
        if !(tol.is_finite() && tol > 0.0 && tol < 1.0) {
            return Err(ConfigError::Validation(
                "crop.ratio_tolerance must be between 0 and 1 (exclusive)".into(),
            ));
        }
        if self.crop.min_area == 0 {
            return Err(ConfigError::Validation(
                "crop.min_area must be at least 1".into(),
            ));
        }
        if self.crop.analysis_max_edge == 0 {
            return Err(ConfigError::Validation(
                "crop.analysis_max_edge must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.export.quality) {
            return Err(ConfigError::Validation(
                "export.quality must be 1-100".into(),
            ));
        }
        if self.scan.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "scan.extensions must not be empty".into(),
            ));
        }
        let supported = crate::imaging::supported_input_extensions();
        if let Some(ext) = self
            .scan
            .extensions
            .iter()
            .find(|e| !supported.iter().any(|s| s.eq_ignore_ascii_case(e)))
        {
            return Err(ConfigError::Validation(format!(
                "scan.extensions: no decoder for \"{ext}\" (supported: {})",
                supported.join(", ")
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Crop geometry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    /// Relative ratio error tolerated before a crop counts as mismatched.
    pub ratio_tolerance: f64,
    /// Minimum area of a manual crop after clamping, in image pixels².
    pub min_area: u32,
    /// Longest edge of the downscaled copy handed to saliency scoring.
    pub analysis_max_edge: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            ratio_tolerance: 0.01,
            min_area: 100,
            analysis_max_edge: 600,
        }
    }
}

/// Output encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Decorate every output with the installed stamp.
    pub date_stamp: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            quality: 95,
            date_stamp: false,
        }
    }
}

/// Input directory scanning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// File extensions (case-insensitive, without dot) treated as photos.
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "tif", "tiff", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Export parallelism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on export workers; unset means one per core.
    pub max_processes: Option<usize>,
}

/// Number of export workers to run.
///
/// `None` means one per core; `Some(n)` is capped at the core count.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// One size group: a named album with its allowed print sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizeGroupConfig {
    pub sizes: Vec<SizeEntry>,
}

/// One allowed print size inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeEntry {
    /// Size name, e.g. `"4x6"`. Becomes an output directory name.
    pub name: String,
    /// Display name shown instead of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Width / height. Parsed from a `WxH` name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The built-in defaults as a TOML table.
///
/// Every config file is merged on top of this layer.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base
/// value outright. Keys only present in `base` survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load and layer the given config files on top of stock defaults.
///
/// Files that do not exist are skipped; the rest are merged in order,
/// unknown keys are rejected, and the result is validated.
pub fn load_config(paths: &[PathBuf]) -> Result<AppConfig, ConfigError> {
    let mut overlays = Vec::new();
    for path in paths {
        match load_raw_config(path)? {
            Some(value) => {
                debug!("loaded config layer {}", path.display());
                overlays.push(value);
            }
            None => debug!("no config at {}", path.display()),
        }
    }
    resolve_config(stock_defaults_value()?, overlays)
}

/// Returns a fully-commented stock `printcrop.toml` with all keys and explanations.
///
/// Printed by `printcrop gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# printcrop Configuration
# =======================
# Every key is optional; the values shown are the defaults.
# Delete whatever you do not want to change.
#
# Config layers, lowest priority first:
#   stock defaults
#   <input dir>/printcrop.toml
#   every --config FILE, in the order given
#
# Each layer only needs the keys it wants to override.
# Misspelled or unknown keys are reported as errors.

# ---------------------------------------------------------------------------
# Crop geometry
# ---------------------------------------------------------------------------
[crop]
# Relative error allowed between a crop's aspect ratio and its size's ratio.
# A stored crop further off than this is dropped when the size changes.
ratio_tolerance = 0.01

# Manual crops smaller than this (in full-resolution pixels²) are rejected.
min_area = 100

# Automatic crops are scored on a copy whose longer edge is at most this.
analysis_max_edge = 600

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# JPEG encoding quality (1 = worst, 100 = best).
quality = 95

# Ask the stamp collaborator to decorate every exported image.
date_stamp = false

# ---------------------------------------------------------------------------
# Scanning
# ---------------------------------------------------------------------------
[scan]
# Files in the input directory with these extensions are treated as photos.
extensions = ["jpg", "jpeg", "png", "tif", "tiff", "webp"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel export workers.
# Leave unset to run one worker per CPU core.
# max_processes = 4

# ---------------------------------------------------------------------------
# Size groups
# ---------------------------------------------------------------------------
# Each group is an album with its allowed print sizes. Group and size names
# become output directories: <output>/<group>/<size>/<photo>.jpg
#
# A size's ratio is width / height. When `ratio` is omitted it is parsed from
# a "WxH" name, so "9x6" means 1.5.
#
# [size_groups.Wedding]
# sizes = [
#     { name = "9x6", alias = "Landscape" },
#     { name = "6x9", alias = "Portrait" },
#     { name = "Square", ratio = 1.0 },
# ]
"##
}
