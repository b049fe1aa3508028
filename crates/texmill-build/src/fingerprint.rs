use crate::artifacts::ArtifactKind;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Content-relevant identity of a file at one point in time.
///
/// Two fingerprints of the same path compare equal only if the file was
/// absent both times, or present both times with the same length and the
/// same SHA-256 digest. Re-running a tool that writes identical bytes
/// therefore yields an unchanged fingerprint even though the mtime moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Missing,
    Present { len: u64, digest: String },
}

impl Fingerprint {
    pub fn of(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => {
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                Fingerprint::Present {
                    len: bytes.len() as u64,
                    digest: hex::encode(hasher.finalize()),
                }
            }
            Err(_) => Fingerprint::Missing,
        }
    }
}

/// Tracks one artifact across loop rounds.
#[derive(Debug)]
pub struct ChangeDetector {
    kind: ArtifactKind,
    path: PathBuf,
    baseline: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            baseline: None,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reports whether the artifact differs from the previous observation and
    /// makes the current state the new baseline.
    ///
    /// The first call always reports a change.
    pub fn observe(&mut self) -> bool {
        let current = Fingerprint::of(&self.path);
        let changed = self.baseline.as_ref() != Some(&current);
        self.baseline = Some(current);
        changed
    }
}
