//! On-disk model artifacts.
//!
//! An artifact is a directory holding `model.json` (manifest), `weights.safetensors`
//! and `labels.json`. Writes go to a staging directory next to the destination and are
//! renamed into place, so readers never see a half-written artifact.

use super::config::HeadArchitecture;
use super::network::ClassifierModel;
use crate::core::constants::{
    ARCHITECTURE_FILE, ARTIFACT_FORMAT_VERSION, LABELS_FILE, WEIGHTS_FILE,
};
use crate::core::AcneError;
use crate::domain::LabelSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Which feature extractor produced the embeddings a head was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorIdentity {
    pub name: String,
    pub embedding_dim: usize,
}

/// Contents of `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub architecture: HeadArchitecture,
    pub extractor: ExtractorIdentity,
    pub weights_file: String,
}

/// A fully loaded artifact.
#[derive(Debug)]
pub struct LoadedArtifact {
    pub model: ClassifierModel,
    pub labels: LabelSet,
    pub extractor: ExtractorIdentity,
}

/// True when `dir` exists at all; a present but incomplete directory is treated as a
/// corrupt artifact by [`load_artifact`], not as a missing one.
pub fn artifact_exists(dir: &Path) -> bool {
    dir.exists()
}

/// Writes `model`, `labels` and `extractor` as an artifact at `dir`.
///
/// Any artifact already at `dir` is moved aside first and restored if the final rename
/// fails; it is removed only once the new artifact is in place.
pub fn save_artifact(
    dir: &Path,
    model: &ClassifierModel,
    labels: &LabelSet,
    extractor: &ExtractorIdentity,
) -> Result<(), AcneError> {
    if model.num_classes() != labels.len() {
        return Err(AcneError::training_error(format!(
            "model has {} outputs but the label set has {} classes",
            model.num_classes(),
            labels.len()
        )));
    }
    if model.input_dim() != extractor.embedding_dim {
        return Err(AcneError::training_error(format!(
            "model expects {}-wide embeddings but extractor '{}' produces {}",
            model.input_dim(),
            extractor.name,
            extractor.embedding_dim
        )));
    }

    let parent = parent_dir(dir);
    fs::create_dir_all(&parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".acne-artifact-")
        .tempdir_in(&parent)?;

    let manifest = ArtifactManifest {
        format_version: ARTIFACT_FORMAT_VERSION,
        architecture: model.architecture().clone(),
        extractor: extractor.clone(),
        weights_file: WEIGHTS_FILE.to_string(),
    };
    fs::write(
        staging.path().join(ARCHITECTURE_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    model.save_weights(&staging.path().join(WEIGHTS_FILE))?;
    labels.save(&staging.path().join(LABELS_FILE))?;
    debug!("staged artifact at {}", staging.path().display());

    let backup = if dir.exists() {
        let backup = sibling_path(dir, "previous");
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }
        fs::rename(dir, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), dir) {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, dir) {
                warn!(
                    "failed to restore previous artifact from {}: {}",
                    backup.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    if let Some(backup) = backup {
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!("failed to remove previous artifact {}: {}", backup.display(), e);
        }
    }
    info!("saved model artifact to {}", dir.display());
    Ok(())
}

/// Loads and validates the artifact at `dir`.
///
/// # Errors
///
/// `ModelLoad` when a file is missing or unreadable, the format version is unknown,
/// the architecture is inconsistent, the weights disagree with it, or the class count
/// differs from the label set.
pub fn load_artifact(dir: &Path) -> Result<LoadedArtifact, AcneError> {
    if !dir.is_dir() {
        return Err(AcneError::model_load_message(
            dir,
            "artifact directory not found",
            Some("train a model first or pass the directory written by acne-train"),
        ));
    }

    let manifest_path = dir.join(ARCHITECTURE_FILE);
    let labels_path = dir.join(LABELS_FILE);
    for required in [&manifest_path, &labels_path] {
        if !required.is_file() {
            return Err(AcneError::model_load_message(
                dir,
                format!("missing {}", file_name(required)),
                Some("the artifact is incomplete; re-run training"),
            ));
        }
    }

    let manifest_text = fs::read_to_string(&manifest_path).map_err(|e| {
        AcneError::model_load_error(&manifest_path, "unreadable manifest", None, Some(e))
    })?;
    let manifest: ArtifactManifest = serde_json::from_str(&manifest_text).map_err(|e| {
        AcneError::model_load_error(&manifest_path, "malformed manifest", None, Some(e))
    })?;

    if manifest.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(AcneError::model_load_message(
            &manifest_path,
            format!(
                "unsupported artifact format version {} (expected {})",
                manifest.format_version, ARTIFACT_FORMAT_VERSION
            ),
            None,
        ));
    }
    manifest.architecture.validate().map_err(|e| {
        AcneError::model_load_error(&manifest_path, "inconsistent architecture", None, Some(e))
    })?;
    if manifest.architecture.input_dim != manifest.extractor.embedding_dim {
        return Err(AcneError::model_load_message(
            &manifest_path,
            format!(
                "head input width {} differs from extractor width {}",
                manifest.architecture.input_dim, manifest.extractor.embedding_dim
            ),
            None,
        ));
    }

    let labels = LabelSet::load(&labels_path).map_err(|e| {
        AcneError::model_load_error(&labels_path, "malformed label set", None, Some(e))
    })?;
    if labels.len() != manifest.architecture.num_classes {
        return Err(AcneError::model_load_message(
            dir,
            format!(
                "model has {} outputs but labels.json lists {} classes",
                manifest.architecture.num_classes,
                labels.len()
            ),
            None,
        ));
    }

    if !is_plain_file_name(&manifest.weights_file) {
        return Err(AcneError::model_load_message(
            &manifest_path,
            format!(
                "weights file '{}' must be a plain file name inside the artifact",
                manifest.weights_file
            ),
            None,
        ));
    }
    let weights_path = dir.join(&manifest.weights_file);
    if !weights_path.is_file() {
        return Err(AcneError::model_load_message(
            dir,
            format!("missing {}", manifest.weights_file),
            Some("the artifact is incomplete; re-run training"),
        ));
    }
    let model = ClassifierModel::load(manifest.architecture, &weights_path)?;

    debug!(
        "loaded artifact {} ({} classes, extractor '{}')",
        dir.display(),
        labels.len(),
        manifest.extractor.name
    );
    Ok(LoadedArtifact {
        model,
        labels,
        extractor: manifest.extractor,
    })
}

fn parent_dir(dir: &Path) -> PathBuf {
    match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// True for a single normal path component, so the file resolves inside the artifact.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `<parent>/.<name>.<suffix>`, used for the backup and lock files next to an artifact.
pub(crate) fn sibling_path(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    parent_dir(dir).join(format!(".{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::head::HeadConfig;

    fn labels(n: usize) -> LabelSet {
        LabelSet::new(1, (0..n).map(|i| format!("class_{i}")).collect()).unwrap()
    }

    fn identity(dim: usize) -> ExtractorIdentity {
        ExtractorIdentity {
            name: "test".into(),
            embedding_dim: dim,
        }
    }

    fn model() -> ClassifierModel {
        ClassifierModel::build(4, 3, &HeadConfig::new().with_hidden_units(vec![6])).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        let model = model();
        save_artifact(&dir, &model, &labels(3), &identity(4)).unwrap();

        for file in [ARCHITECTURE_FILE, WEIGHTS_FILE, LABELS_FILE] {
            assert!(dir.join(file).is_file(), "{file} missing");
        }
        let loaded = load_artifact(&dir).unwrap();
        assert_eq!(loaded.labels, labels(3));
        assert_eq!(loaded.extractor, identity(4));
        let input = [0.5, 0.1, -0.3, 0.9];
        let a = model.predict_proba(&input).unwrap();
        let b = loaded.model.predict_proba(&input).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_overwrite_leaves_no_staging_dirs() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();

        let entries: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("artifact")]);
        assert!(load_artifact(&dir).is_ok());
    }

    #[test]
    fn test_save_rejects_label_mismatch() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        assert!(save_artifact(&dir, &model(), &labels(4), &identity(4)).is_err());
        assert!(save_artifact(&dir, &model(), &labels(3), &identity(5)).is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn test_load_detects_missing_and_corrupt_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        assert!(matches!(
            load_artifact(&dir).unwrap_err(),
            AcneError::ModelLoad { .. }
        ));

        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        fs::remove_file(dir.join(WEIGHTS_FILE)).unwrap();
        assert!(matches!(
            load_artifact(&dir).unwrap_err(),
            AcneError::ModelLoad { .. }
        ));

        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        fs::write(dir.join(ARCHITECTURE_FILE), "{ not json").unwrap();
        assert!(matches!(
            load_artifact(&dir).unwrap_err(),
            AcneError::ModelLoad { .. }
        ));
    }

    #[test]
    fn test_load_rejects_label_count_mismatch() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        labels(5).save(&dir.join(LABELS_FILE)).unwrap();
        assert!(matches!(
            load_artifact(&dir).unwrap_err(),
            AcneError::ModelLoad { .. }
        ));
    }

    #[test]
    fn test_load_rejects_weights_outside_artifact() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        let outside = root.path().join("elsewhere.safetensors");
        fs::copy(dir.join(WEIGHTS_FILE), &outside).unwrap();

        let path = dir.join(ARCHITECTURE_FILE);
        let original: ArtifactManifest =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for weights_file in [
            "../elsewhere.safetensors".to_string(),
            outside.display().to_string(),
            format!("./{WEIGHTS_FILE}"),
        ] {
            let manifest = ArtifactManifest {
                weights_file,
                ..original.clone()
            };
            fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();
            assert!(matches!(
                load_artifact(&dir).unwrap_err(),
                AcneError::ModelLoad { .. }
            ));
        }

        fs::write(&path, serde_json::to_string(&original).unwrap()).unwrap();
        assert!(load_artifact(&dir).is_ok());
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("weights.safetensors"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("nested/weights.safetensors"));
        assert!(!is_plain_file_name("/tmp/weights.safetensors"));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("artifact");
        save_artifact(&dir, &model(), &labels(3), &identity(4)).unwrap();
        let path = dir.join(ARCHITECTURE_FILE);
        let mut manifest: ArtifactManifest =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        manifest.format_version = 99;
        fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();
        assert!(load_artifact(&dir).is_err());
    }
}
