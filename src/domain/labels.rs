//! The ordered, versioned class list.

use crate::core::constants::{ACNE_CLASSES, ACNE_LABELS_VERSION};
use crate::core::{AcneError, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Ordered class names. Position in the list is the class index used by datasets,
/// the classifier output and predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLabelSet")]
pub struct LabelSet {
    version: u32,
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct RawLabelSet {
    version: u32,
    classes: Vec<String>,
}

impl TryFrom<RawLabelSet> for LabelSet {
    type Error = ConfigError;

    fn try_from(raw: RawLabelSet) -> Result<Self, Self::Error> {
        Self::new(raw.version, raw.classes)
    }
}

impl LabelSet {
    /// Creates a label set, checking that names are non-empty and unique.
    pub fn new(version: u32, classes: Vec<String>) -> Result<Self, ConfigError> {
        if classes.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "label set must contain at least one class".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for name in &classes {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig {
                    message: "class names must not be empty".to_string(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidConfig {
                    message: format!("duplicate class name '{name}'"),
                });
            }
        }
        Ok(Self { version, classes })
    }

    /// The canonical acne label list.
    pub fn acne() -> Self {
        Self {
            version: ACNE_LABELS_VERSION,
            classes: ACNE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Always false for a constructed set; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class name at `index`.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Index of the class called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }

    /// Iterates `(index, name)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.classes.iter().map(String::as_str).enumerate()
    }

    /// Reads a label set from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AcneError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the label set as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), AcneError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::acne()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acne_order_is_canonical() {
        let labels = LabelSet::acne();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.name(0), Some("whitehead"));
        assert_eq!(labels.name(6), Some("normal"));
        assert_eq!(labels.index_of("pustule"), Some(3));
        assert_eq!(labels.index_of("rosacea"), None);
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(LabelSet::new(1, vec![]).is_err());
        assert!(LabelSet::new(1, vec!["a".into(), "".into()]).is_err());
        assert!(LabelSet::new(1, vec!["a".into(), "a".into()]).is_err());
        assert!(LabelSet::new(2, vec!["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: LabelSet =
            serde_json::from_str(r#"{"version": 3, "classes": ["x", "y"]}"#).unwrap();
        assert_eq!(ok.version(), 3);
        assert_eq!(ok.classes(), &["x".to_string(), "y".to_string()]);

        let dup = serde_json::from_str::<LabelSet>(r#"{"version": 1, "classes": ["x", "x"]}"#);
        assert!(dup.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let labels = LabelSet::acne();
        labels.save(&path).unwrap();
        assert_eq!(LabelSet::load(&path).unwrap(), labels);
    }
}
