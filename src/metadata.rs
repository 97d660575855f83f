//! Per-worker, per-repo build metadata file (`<BuildPath>/<repo>/.conflowci.toml`)
//! and the content-checksum it records.
//!
//! The checksum is computed in-process rather than shelled out to
//! `find | sha256sum` — a deliberate divergence from the original
//! implementation called out in spec 9's REDESIGN FLAGS, chosen for
//! portability and determinism. `sha2` is already how the teacher crate
//! derives stable on-disk cache keys (its `Cargo.toml` notes stdlib's
//! `DefaultHasher` isn't guaranteed stable across Rust versions); the same
//! reasoning applies here to repository-tree hashing.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SyncError;

pub const METADATA_FILENAME: &str = ".conflowci.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildMetadata {
    pub repository: RepositorySection,
    pub state: StateSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositorySection {
    pub name: String,
    pub source: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateSection {
    pub cloned_at: DateTime<Utc>,
    pub last_build: DateTime<Utc>,
    /// Hex-encoded SHA-256.
    pub checksum: String,
}

/// Whether `<repo_dir>/.conflowci.toml` exists. Corrupt metadata counts as
/// present — the caller's Fetch path tolerates it (spec 4.3 step 1).
pub fn metadata_present(repo_dir: &Path) -> bool {
    repo_dir.join(METADATA_FILENAME).is_file()
}

pub fn read_metadata(repo_dir: &Path) -> Result<Option<BuildMetadata>, SyncError> {
    let path = repo_dir.join(METADATA_FILENAME);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| SyncError::MetadataEncode {
        cause: e.to_string(),
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| SyncError::MetadataEncode {
            cause: e.to_string(),
        })
}

pub fn write_metadata(repo_dir: &Path, metadata: &BuildMetadata) -> Result<(), SyncError> {
    let path = repo_dir.join(METADATA_FILENAME);
    let serialized = toml::to_string_pretty(metadata).map_err(|e| SyncError::MetadataEncode {
        cause: e.to_string(),
    })?;
    std::fs::write(&path, serialized).map_err(|e| SyncError::MetadataEncode {
        cause: e.to_string(),
    })
}

/// Compute the SHA-256 of the sorted concatenation of SHA-256(file) over
/// every regular, non-VCS, non-metadata file under `repo_dir`.
///
/// Sorting the per-file digests before the outer reduction makes the result
/// invariant to directory-listing order (spec 8's determinism invariant).
pub fn compute_checksum(repo_dir: &Path) -> Result<String, SyncError> {
    let mut digests = Vec::new();
    collect_file_digests(repo_dir, repo_dir, &mut digests)?;
    digests.sort();

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_file_digests(
    root: &Path,
    dir: &Path,
    out: &mut Vec<[u8; 32]>,
) -> Result<(), SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SyncError::Checksum {
        shell_output: format!("reading {}: {e}", dir.display()),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| SyncError::Checksum {
            shell_output: e.to_string(),
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SyncError::Checksum {
            shell_output: e.to_string(),
        })?;

        if file_type.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            collect_file_digests(root, &path, out)?;
            continue;
        }

        if !file_type.is_file() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(METADATA_FILENAME)
            && path.parent() == Some(root)
        {
            continue;
        }

        let contents = std::fs::read(&path).map_err(|e| SyncError::Checksum {
            shell_output: format!("reading {}: {e}", path.display()),
        })?;
        let digest: [u8; 32] = Sha256::digest(&contents).into();
        out.push(digest);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn checksum_is_invariant_under_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"bbb").unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        let first = compute_checksum(dir.path()).unwrap();

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        fs::remove_file(dir.path().join("b.txt")).unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        fs::write(dir.path().join("b.txt"), b"bbb").unwrap();
        let second = compute_checksum(dir.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn checksum_excludes_git_dir_and_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        let baseline = compute_checksum(dir.path()).unwrap();

        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), b"ref: refs/heads/main").unwrap();
        fs::write(dir.path().join(METADATA_FILENAME), b"stale metadata").unwrap();

        let after = compute_checksum(dir.path()).unwrap();
        assert_eq!(baseline, after);
    }

    #[test]
    fn round_trips_through_toml() {
        let metadata = BuildMetadata {
            repository: RepositorySection {
                name: "hello-world".to_string(),
                source: "https://github.com/octocat/hello-world".to_string(),
                version: "pr-6".to_string(),
            },
            state: StateSection {
                cloned_at: Utc::now(),
                last_build: Utc::now(),
                checksum: "deadbeef".to_string(),
            },
        };

        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), &metadata).unwrap();
        let read_back = read_metadata(dir.path()).unwrap().unwrap();
        assert_eq!(read_back.repository.name, metadata.repository.name);
        assert_eq!(read_back.state.checksum, metadata.state.checksum);
    }
}
