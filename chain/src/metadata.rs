/// Chain binding guard.
///
/// A node records the chain it was first started against and refuses to
/// start against any other. Orders, block history and contract addresses
/// are all chain specific, so silently switching chains would leave the
/// order set full of records that can never be valid again.
///
/// The check runs once at startup, before any network activity, and is
/// never retried.
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChainId;

pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Persisted per-node record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub chain_id: ChainId,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(
        "ChainID mismatch: node was previously started with chain ID {stored} but is now configured for {configured}"
    )]
    ChainIdMismatch { stored: ChainId, configured: ChainId },

    #[error("metadata at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("metadata store I/O failed: {0}")]
    Io(#[from] io::Error),
}

pub trait MetadataStore {
    fn load(&self) -> Result<Option<ChainMetadata>, MetadataError>;
    fn save(&self, metadata: &ChainMetadata) -> Result<(), MetadataError>;
}

/// Binds the node to `configured`, or verifies the existing binding.
///
/// First start persists the configured chain. Later starts succeed only if
/// the stored chain matches; a mismatch must stop startup.
pub fn init_metadata<S: MetadataStore + ?Sized>(
    configured: ChainId,
    store: &S,
) -> Result<ChainMetadata, MetadataError> {
    match store.load()? {
        None => {
            let metadata = ChainMetadata {
                chain_id: configured,
            };
            store.save(&metadata)?;
            info!(chain_id = %configured, "Initialized chain metadata");
            Ok(metadata)
        }
        Some(stored) if stored.chain_id == configured => {
            info!(chain_id = %configured, "Chain metadata matches configuration");
            Ok(stored)
        }
        Some(stored) => {
            warn!(
                stored = %stored.chain_id,
                configured = %configured,
                "Refusing to start against a different chain"
            );
            Err(MetadataError::ChainIdMismatch {
                stored: stored.chain_id,
                configured,
            })
        }
    }
}

/// Metadata kept as a JSON file inside the node data directory.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    path: PathBuf,
}

impl FileMetadataStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(METADATA_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataStore for FileMetadataStore {
    fn load(&self) -> Result<Option<ChainMetadata>, MetadataError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| MetadataError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    fn save(&self, metadata: &ChainMetadata) -> Result<(), MetadataError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(metadata).map_err(|err| MetadataError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;

        // Write-then-rename so a crash never leaves a half-written record.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Metadata that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<Option<ChainMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self) -> Result<Option<ChainMetadata>, MetadataError> {
        Ok(*self.inner.lock())
    }

    fn save(&self, metadata: &ChainMetadata) -> Result<(), MetadataError> {
        *self.inner.lock() = Some(*metadata);
        Ok(())
    }
}
