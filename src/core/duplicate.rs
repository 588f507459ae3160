// Duplicate detection by perceptual fingerprint.
// Two flavours share the hasher:
// - `DuplicateIndex`: live, first-arrival-wins, used while downloading
// - `find_duplicate_groups`: two-phase bulk scan over a directory

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::hash::{Fingerprint, HashError, PerceptualHasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DuplicateStatus {
    Unique,
    Duplicate,
}

/// Live index: the first path registered under a fingerprint is the one kept.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    hasher: PerceptualHasher,
    kept: HashMap<Fingerprint, PathBuf>,
}

impl DuplicateIndex {
    pub fn new(hasher: PerceptualHasher) -> Self {
        Self {
            hasher,
            kept: HashMap::new(),
        }
    }

    /// Fingerprint the image at `path` and register it if unseen.
    ///
    /// Returns `Duplicate` without touching the index when an earlier image
    /// already holds the fingerprint; deleting the file is the caller's job.
    /// Undecodable files fail with `HashError::InvalidImage` and take no slot.
    pub fn classify(&mut self, path: &Path) -> Result<DuplicateStatus, HashError> {
        let fingerprint = self.hasher.hash_path(path)?;
        if self.register(fingerprint, path) {
            Ok(DuplicateStatus::Unique)
        } else {
            Ok(DuplicateStatus::Duplicate)
        }
    }

    /// Record `path` as the representative of `fingerprint`.
    /// Returns false if the fingerprint was already taken.
    pub fn register(&mut self, fingerprint: Fingerprint, path: &Path) -> bool {
        if self.kept.contains_key(&fingerprint) {
            return false;
        }
        self.kept.insert(fingerprint, path.to_path_buf());
        true
    }

    pub fn representative(&self, fingerprint: &Fingerprint) -> Option<&Path> {
        self.kept.get(fingerprint).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// A set of files sharing one fingerprint. `paths[0]` is kept.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn keep(&self) -> &Path {
        &self.paths[0]
    }

    pub fn extras(&self) -> &[PathBuf] {
        &self.paths[1..]
    }
}

/// Outcome of the accumulate phase of a bulk scan.
#[derive(Debug, Default)]
pub struct BulkScan {
    pub groups: Vec<DuplicateGroup>,
    pub undecodable: Vec<PathBuf>,
    pub hashed: usize,
}

/// Hash every file (in parallel) and group paths by fingerprint.
///
/// Group membership keeps the order of `files`, so the first listed member of
/// each group is the one retained no matter which files failed to decode.
/// Only groups with more than one member are returned.
pub fn find_duplicate_groups(files: &[PathBuf], hasher: &PerceptualHasher) -> BulkScan {
    let hashed: Vec<(PathBuf, Result<Fingerprint, HashError>)> = files
        .par_iter()
        .map(|path| (path.clone(), hasher.hash_path(path)))
        .collect();

    let mut scan = BulkScan::default();
    let mut order: Vec<Fingerprint> = Vec::new();
    let mut buckets: HashMap<Fingerprint, Vec<PathBuf>> = HashMap::new();

    for (path, result) in hashed {
        match result {
            Ok(fingerprint) => {
                scan.hashed += 1;
                let bucket = buckets.entry(fingerprint).or_default();
                if bucket.is_empty() {
                    order.push(fingerprint);
                }
                bucket.push(path);
            }
            Err(e) => {
                tracing::debug!("Not hashing {}: {}", path.display(), e);
                scan.undecodable.push(path);
            }
        }
    }

    for fingerprint in order {
        if let Some(paths) = buckets.remove(&fingerprint) {
            if paths.len() > 1 {
                scan.groups.push(DuplicateGroup { fingerprint, paths });
            }
        }
    }

    scan
}
