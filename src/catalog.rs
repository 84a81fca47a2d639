//! Size catalog: the immutable size-group → sizes → ratio mapping.
//!
//! Built once from [`AppConfig`](crate::config::AppConfig) and shared as an
//! `Arc<SizeCatalog>`. Reloading configuration means building a new catalog
//! and handing it to [`Project::replace_catalog`](crate::project::Project::replace_catalog);
//! a catalog is never mutated in place.
//!
//! Group and size names become output directory names, so they are
//! validated to be plain path components.

use crate::config::{AppConfig, ConfigError, SizeGroupConfig};
use std::collections::BTreeMap;
use std::fmt;

/// One allowed print size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSpec {
    pub name: String,
    pub alias: Option<String>,
    /// Width / height, always finite and positive.
    pub ratio: f64,
}

impl SizeSpec {
    /// The alias if set, otherwise the name.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} ({}, {:.3})", self.name, alias, self.ratio),
            None => write!(f, "{} ({:.3})", self.name, self.ratio),
        }
    }
}

/// A named size group with its allowed sizes, in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeGroup {
    pub name: String,
    pub sizes: Vec<SizeSpec>,
}

impl SizeGroup {
    pub fn size(&self, name: &str) -> Option<&SizeSpec> {
        self.sizes.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeCatalog {
    groups: BTreeMap<String, SizeGroup>,
}

/// Parse the ratio implied by a `WxH` size name: `"9x6"` → `1.5`.
///
/// The separator is `x` or `X`; both sides must be positive numbers.
///
/// ```
/// # use printcrop::catalog::parse_size_ratio;
/// assert_eq!(parse_size_ratio("9x6"), Some(1.5));
/// assert_eq!(parse_size_ratio("10X8"), Some(1.25));
/// assert_eq!(parse_size_ratio("Square"), None);
/// ```
pub fn parse_size_ratio(name: &str) -> Option<f64> {
    let (w, h) = name.trim().split_once(['x', 'X'])?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    let ratio = w / h;
    (w > 0.0 && h > 0.0 && ratio.is_finite()).then_some(ratio)
}

/// True when `name` can be used as a single path component.
pub(crate) fn is_plain_name(name: &str) -> bool {
    !(name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control))
}

fn validate_name(kind: &str, name: &str) -> Result<(), ConfigError> {
    if !is_plain_name(name) {
        return Err(ConfigError::Validation(format!(
            "{kind} name {name:?} must be a non-empty plain name without path separators"
        )));
    }
    Ok(())
}

fn build_group(name: &str, config: &SizeGroupConfig) -> Result<SizeGroup, ConfigError> {
    validate_name("size group", name)?;
    let mut sizes: Vec<SizeSpec> = Vec::with_capacity(config.sizes.len());
    for entry in &config.sizes {
        validate_name("size", &entry.name)?;
        if sizes.iter().any(|s| s.name == entry.name) {
            return Err(ConfigError::Validation(format!(
                "size {:?} appears twice in group {name:?}",
                entry.name
            )));
        }
        let ratio = entry
            .ratio
            .or_else(|| parse_size_ratio(&entry.name))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "size {:?} in group {name:?} needs a ratio (or a WxH name)",
                    entry.name
                ))
            })?;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(ConfigError::Validation(format!(
                "size {:?} in group {name:?} has invalid ratio {ratio}",
                entry.name
            )));
        }
        sizes.push(SizeSpec {
            name: entry.name.clone(),
            alias: entry.alias.clone(),
            ratio,
        });
    }
    Ok(SizeGroup {
        name: name.to_string(),
        sizes,
    })
}

impl SizeCatalog {
    /// Build and validate the catalog from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let groups = config
            .size_groups
            .iter()
            .map(|(name, group)| Ok((name.clone(), build_group(name, group)?)))
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { groups })
    }

    /// Build a catalog directly from groups (used by tests and embedders).
    pub fn from_groups(groups: impl IntoIterator<Item = SizeGroup>) -> Self {
        Self {
            groups: groups.into_iter().map(|g| (g.name.clone(), g)).collect(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&SizeGroup> {
        self.groups.get(name)
    }

    pub fn size(&self, group: &str, size: &str) -> Option<&SizeSpec> {
        self.group(group)?.size(size)
    }

    /// Ratio of `size` within `group`, if the pair is valid.
    pub fn ratio_of(&self, group: &str, size: &str) -> Option<f64> {
        self.size(group, size).map(|s| s.ratio)
    }

    /// All groups, sorted by name.
    pub fn groups(&self) -> impl Iterator<Item = &SizeGroup> {
        self.groups.values()
    }

    pub fn contains(&self, group: &str, size: &str) -> bool {
        self.size(group, size).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeEntry;

    fn entry(name: &str, alias: Option<&str>, ratio: Option<f64>) -> SizeEntry {
        SizeEntry {
            name: name.into(),
            alias: alias.map(String::from),
            ratio,
        }
    }

    fn config_with(group: &str, sizes: Vec<SizeEntry>) -> AppConfig {
        let mut config = AppConfig::default();
        config
            .size_groups
            .insert(group.into(), SizeGroupConfig { sizes });
        config
    }

    // =========================================================================
    // parse_size_ratio
    // =========================================================================

    #[test]
    fn parse_ratio_is_first_over_second() {
        assert_eq!(parse_size_ratio("9x6"), Some(1.5));
        assert_eq!(parse_size_ratio("6x9"), Some(6.0 / 9.0));
        assert_eq!(parse_size_ratio(" 5 x 5 "), Some(1.0));
        assert_eq!(parse_size_ratio("3.5x5"), Some(0.7));
    }

    #[test]
    fn parse_ratio_rejects_non_sizes() {
        assert_eq!(parse_size_ratio("Square"), None);
        assert_eq!(parse_size_ratio("0x6"), None);
        assert_eq!(parse_size_ratio("6x0"), None);
        assert_eq!(parse_size_ratio("-4x6"), None);
        assert_eq!(parse_size_ratio("x6"), None);
    }

    // =========================================================================
    // from_config
    // =========================================================================

    #[test]
    fn builds_groups_with_explicit_and_parsed_ratios() {
        let config = config_with(
            "Wedding",
            vec![
                entry("9x6", Some("Landscape"), None),
                entry("4x6", None, Some(1.5)),
                entry("Square", None, Some(1.0)),
            ],
        );
        let catalog = SizeCatalog::from_config(&config).unwrap();

        assert_eq!(catalog.ratio_of("Wedding", "9x6"), Some(1.5));
        // explicit ratio wins over the name
        assert_eq!(catalog.ratio_of("Wedding", "4x6"), Some(1.5));
        assert_eq!(catalog.ratio_of("Wedding", "Square"), Some(1.0));
        assert!(catalog.contains("Wedding", "Square"));
        assert!(!catalog.contains("Wedding", "5x7"));
        assert!(!catalog.contains("Travel", "9x6"));
        assert_eq!(
            catalog.size("Wedding", "9x6").unwrap().display_name(),
            "Landscape"
        );
    }

    #[test]
    fn preserves_size_order_within_group() {
        let config = config_with(
            "A",
            vec![entry("8x10", None, None), entry("4x6", None, None)],
        );
        let catalog = SizeCatalog::from_config(&config).unwrap();
        let names: Vec<&str> = catalog
            .group("A")
            .unwrap()
            .sizes
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["8x10", "4x6"]);
    }

    #[test]
    fn rejects_size_without_ratio() {
        let config = config_with("A", vec![entry("Square", None, None)]);
        assert!(SizeCatalog::from_config(&config).is_err());
    }

    #[test]
    fn rejects_non_positive_ratio() {
        let config = config_with("A", vec![entry("Odd", None, Some(0.0))]);
        assert!(SizeCatalog::from_config(&config).is_err());
    }

    #[test]
    fn rejects_duplicate_size() {
        let config = config_with(
            "A",
            vec![entry("4x6", None, None), entry("4x6", Some("again"), None)],
        );
        assert!(SizeCatalog::from_config(&config).is_err());
    }

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", "..", ".", "a/b", "a\\b"] {
            let config = config_with(bad, vec![entry("4x6", None, None)]);
            assert!(SizeCatalog::from_config(&config).is_err(), "group {bad:?}");
            let config = config_with("A", vec![entry(bad, None, Some(1.0))]);
            assert!(SizeCatalog::from_config(&config).is_err(), "size {bad:?}");
        }
    }

    #[test]
    fn empty_config_gives_empty_catalog() {
        let catalog = SizeCatalog::from_config(&AppConfig::default()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.groups().count(), 0);
    }
}
