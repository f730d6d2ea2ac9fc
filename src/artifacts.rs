//! Loading of the pre-trained model artifacts.
//!
//! The artifact directory holds the ordered feature-name list, the fitted scaler and one
//! JSON document per ensemble slot. An optional `manifest.json` pins each file to a
//! SHA-256 digest; a mismatch aborts startup rather than serving predictions from a
//! model nobody trained.

use crate::classifiers::{Classifier, ModelArtifact, StandardScaler};
use crate::scoring::ModelSlot;
use anyhow::{anyhow, bail, ensure};
use serde::{de::DeserializeOwned, Deserialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    sha256: BTreeMap<String, String>,
}

/// A loaded artifact file and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFingerprint {
    pub file: String,
    pub sha256: String,
}

/// Everything the ensemble needs, loaded once at startup and shared read-only.
pub struct ModelStore {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub models: Vec<(ModelSlot, Arc<dyn Classifier>)>,
    pub fingerprints: Vec<ArtifactFingerprint>,
}

impl ModelStore {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        ensure!(
            dir.is_dir(),
            "artifact directory {} does not exist",
            dir.display()
        );

        let manifest = read_manifest(dir)?;
        let mut fingerprints = Vec::new();

        let (feature_names, fp) = read_json::<Vec<String>>(dir, FEATURE_NAMES_FILE)?;
        fingerprints.push(fp);
        validate_feature_names(&feature_names)?;

        let (scaler, fp) = read_json::<StandardScaler>(dir, SCALER_FILE)?;
        fingerprints.push(fp);
        scaler.validate()?;
        ensure!(
            scaler.width() == feature_names.len(),
            "scaler covers {} features but {} feature names were loaded",
            scaler.width(),
            feature_names.len()
        );

        let mut models: Vec<(ModelSlot, Arc<dyn Classifier>)> = Vec::new();
        for slot in ModelSlot::ALL {
            let (artifact, fp) = read_json::<ModelArtifact>(dir, slot.artifact_file())?;
            fingerprints.push(fp);
            let classifier = artifact
                .into_classifier(feature_names.len())
                .map_err(|e| anyhow!("{} ({}): {}", slot, slot.artifact_file(), e))?;
            tracing::info!("Loaded {} model ({})", slot, classifier.kind());
            models.push((slot, Arc::from(classifier)));
        }

        if let Some(manifest) = manifest {
            verify_manifest(&manifest, &fingerprints)?;
            tracing::info!("Artifact checksums verified against {}", MANIFEST_FILE);
        }
        for fp in &fingerprints {
            tracing::debug!("Artifact {} sha256={}", fp.file, fp.sha256);
        }

        Ok(Self {
            feature_names,
            scaler,
            models,
            fingerprints,
        })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn artifact_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

fn read_json<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
) -> anyhow::Result<(T, ArtifactFingerprint)> {
    let path = artifact_path(dir, file);
    let bytes = std::fs::read(&path)
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| anyhow!("failed to parse {}: {}", path.display(), e))?;
    Ok((
        value,
        ArtifactFingerprint {
            file: file.to_string(),
            sha256: sha256_hex(&bytes),
        },
    ))
}

fn read_manifest(dir: &Path) -> anyhow::Result<Option<Manifest>> {
    let path = artifact_path(dir, MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    let manifest = serde_json::from_slice(&bytes)
        .map_err(|e| anyhow!("failed to parse {}: {}", path.display(), e))?;
    Ok(Some(manifest))
}

fn verify_manifest(manifest: &Manifest, fingerprints: &[ArtifactFingerprint]) -> anyhow::Result<()> {
    for (file, expected) in &manifest.sha256 {
        let actual = fingerprints
            .iter()
            .find(|fp| &fp.file == file)
            .ok_or_else(|| anyhow!("manifest lists unknown artifact {}", file))?;
        if !actual.sha256.eq_ignore_ascii_case(expected) {
            bail!(
                "checksum mismatch for {}: manifest {}, file {}",
                file,
                expected,
                actual.sha256
            );
        }
    }
    Ok(())
}

fn validate_feature_names(names: &[String]) -> anyhow::Result<()> {
    ensure!(!names.is_empty(), "{} is empty", FEATURE_NAMES_FILE);
    let mut seen = HashSet::new();
    for name in names {
        ensure!(!name.trim().is_empty(), "blank feature name in {}", FEATURE_NAMES_FILE);
        ensure!(seen.insert(name.as_str()), "duplicate feature name '{}'", name);
    }
    Ok(())
}
