#![forbid(unsafe_code)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use canon_kernel_contracts::chunk::ContentHash;

use crate::ledger::StorageError;

const HEX: &[u8; 16] = b"0123456789abcdef";

fn hex_lower(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn digest_of(bytes: &[u8]) -> Result<ContentHash, StorageError> {
    let digest = Sha256::digest(bytes);
    ContentHash::new(hex_lower(&digest)).map_err(StorageError::from)
}

/// Content-addressed file store for phase artifacts. An artifact lives at
/// `<root>/<hh>/<hash>` where `hh` is the first hash byte; reads verify
/// the bytes still match their address.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::Io {
            detail: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(&hash.as_str()[..2]).join(hash.as_str())
    }

    /// Stores bytes under their own hash. Re-putting identical content is
    /// a no-op returning the same address.
    pub fn put(&self, bytes: &[u8]) -> Result<ContentHash, StorageError> {
        let hash = digest_of(bytes)?;
        let path = self.path_for(&hash);
        if path.exists() {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                detail: e.to_string(),
            })?;
        }
        fs::write(&path, bytes).map_err(|e| StorageError::Io {
            detail: e.to_string(),
        })?;
        Ok(hash)
    }

    /// Reads bytes back by address, verifying they still hash to it.
    pub fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(hash);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::Io {
                detail: format!("no artifact at address {hash}"),
            },
            _ => StorageError::Io {
                detail: e.to_string(),
            },
        })?;
        let recomputed = digest_of(&bytes)?;
        if &recomputed != hash {
            return Err(StorageError::IntegrityMismatch {
                expected: hash.as_str().to_string(),
                got: recomputed.as_str().to_string(),
            });
        }
        Ok(bytes)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.path_for(hash).exists()
    }
}
