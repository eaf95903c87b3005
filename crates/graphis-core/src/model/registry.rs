//! Versioned persistence for trained model artifacts.
//!
//! Layout under the model directory:
//!
//! ```text
//! versions.json                      ← ledger: current version + history
//! weights_v3_20250114_101500.json    ← serialized network weights
//! metadata_v3_20250114_101500.json   ← version, shape, dims, paths
//! ```
//!
//! The ledger is the single source of truth for `current()`. Artifact files
//! are written before the ledger commit (temp file + rename), so a crash in
//! between leaves an orphaned artifact but never a ledger entry pointing at
//! a missing file. A fresh process reconstructs `current()` purely from the
//! ledger.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::network::{Architecture, TwinNetwork};
use crate::error::ModelError;

const LEDGER_FILENAME: &str = "versions.json";

/// Metadata for one committed model version. Immutable once created;
/// superseded, never mutated, by later versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub timestamp: String,
    pub architecture: Architecture,
    pub input_shape: [usize; 3],
    pub embedding_dim: usize,
    pub weights_path: PathBuf,
}

/// A ledger line: enough to list versions and locate their files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u32,
    pub timestamp: String,
    pub weights_path: PathBuf,
    pub metadata_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Ledger {
    current_version: u32,
    models: Vec<VersionInfo>,
}

/// Registry of versioned model artifacts backed by a directory on disk.
///
/// Also caches the deserialized current model so concurrent inference
/// callers share one copy; `save` swaps the cache atomically, so readers
/// never observe partially-updated weights.
pub struct ModelRegistry {
    model_dir: PathBuf,
    ledger: Mutex<Ledger>,
    current: RwLock<Option<Arc<TwinNetwork>>>,
}

impl ModelRegistry {
    /// Open (or initialize) a registry at the given directory.
    pub fn open(model_dir: impl Into<PathBuf>) -> Result<Self, ModelError> {
        let model_dir = model_dir.into();
        std::fs::create_dir_all(&model_dir).map_err(|e| ModelError::ArtifactIo {
            path: model_dir.clone(),
            source: e,
        })?;

        let ledger_path = model_dir.join(LEDGER_FILENAME);
        let ledger = if ledger_path.exists() {
            read_json(&ledger_path)?
        } else {
            Ledger::default()
        };

        Ok(Self {
            model_dir,
            ledger: Mutex::new(ledger),
            current: RwLock::new(None),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Persist a trained network as the next version and make it current.
    ///
    /// Versions are monotonically increasing integers assigned here. The
    /// weights and metadata files land on disk before the ledger commit.
    pub fn save(&self, network: &TwinNetwork) -> Result<ModelArtifact, ModelError> {
        let mut ledger = self.lock_ledger();
        let version = ledger.current_version + 1;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let weights_path = self
            .model_dir
            .join(format!("weights_v{version}_{timestamp}.json"));
        let metadata_path = self
            .model_dir
            .join(format!("metadata_v{version}_{timestamp}.json"));

        let artifact = ModelArtifact {
            version,
            timestamp: timestamp.clone(),
            architecture: network.architecture(),
            input_shape: network.input_shape(),
            embedding_dim: network.embedding_dim(),
            weights_path: weights_path.clone(),
        };

        write_json(&weights_path, network)?;
        write_json(&metadata_path, &artifact)?;

        let mut updated = ledger.clone();
        updated.current_version = version;
        updated.models.push(VersionInfo {
            version,
            timestamp,
            weights_path,
            metadata_path,
        });
        self.commit_ledger(&updated)?;
        *ledger = updated;

        // Swap the serving model only after the ledger committed.
        *self.write_current() = Some(Arc::new(network.clone()));

        tracing::info!(version, "Committed model artifact");
        Ok(artifact)
    }

    /// Load the weights for a specific version.
    pub fn load(&self, version: u32) -> Result<TwinNetwork, ModelError> {
        let entry = self
            .find_entry(|e| e.version == version)
            .ok_or(ModelError::NotFound {
                requested: format!("version {version}"),
            })?;
        read_json(&entry.weights_path)
    }

    /// Load the weights for the version saved at a specific timestamp.
    pub fn load_by_timestamp(&self, timestamp: &str) -> Result<TwinNetwork, ModelError> {
        let entry = self
            .find_entry(|e| e.timestamp == timestamp)
            .ok_or_else(|| ModelError::NotFound {
                requested: format!("timestamp {timestamp}"),
            })?;
        read_json(&entry.weights_path)
    }

    /// Metadata for a specific committed version.
    pub fn artifact(&self, version: u32) -> Result<ModelArtifact, ModelError> {
        let entry = self
            .find_entry(|e| e.version == version)
            .ok_or(ModelError::NotFound {
                requested: format!("version {version}"),
            })?;
        read_json(&entry.metadata_path)
    }

    /// Metadata for the highest successfully committed version.
    pub fn current(&self) -> Result<ModelArtifact, ModelError> {
        let version = self.lock_ledger().current_version;
        if version == 0 {
            return Err(ModelError::NotFound {
                requested: "current model (none trained yet)".to_string(),
            });
        }
        self.artifact(version)
    }

    /// The current model, deserialized once and shared between callers.
    pub fn current_model(&self) -> Result<Arc<TwinNetwork>, ModelError> {
        if let Some(model) = self.read_current().clone() {
            return Ok(model);
        }
        let version = self.lock_ledger().current_version;
        if version == 0 {
            return Err(ModelError::NotFound {
                requested: "current model (none trained yet)".to_string(),
            });
        }
        let model = Arc::new(self.load(version)?);
        *self.write_current() = Some(Arc::clone(&model));
        Ok(model)
    }

    /// All committed versions in commit order.
    pub fn list(&self) -> Vec<VersionInfo> {
        self.lock_ledger().models.clone()
    }

    fn find_entry(&self, pred: impl Fn(&VersionInfo) -> bool) -> Option<VersionInfo> {
        self.lock_ledger().models.iter().find(|e| pred(e)).cloned()
    }

    /// Write the ledger via a temp file and rename, so a crash mid-write
    /// never truncates the committed ledger.
    fn commit_ledger(&self, ledger: &Ledger) -> Result<(), ModelError> {
        let final_path = self.model_dir.join(LEDGER_FILENAME);
        let tmp_path = self.model_dir.join(format!("{LEDGER_FILENAME}.tmp"));
        write_json(&tmp_path, ledger)?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| ModelError::ArtifactIo {
            path: final_path,
            source: e,
        })
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_current(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<TwinNetwork>>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_current(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<TwinNetwork>>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ModelError> {
    let file = std::fs::File::create(path).map_err(|e| ModelError::ArtifactIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::to_writer(std::io::BufWriter::new(file), value).map_err(|e| {
        ModelError::ArtifactEncoding {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let file = std::fs::File::open(path).map_err(|e| ModelError::ArtifactIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
        ModelError::ArtifactEncoding {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
