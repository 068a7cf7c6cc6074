//! Artifact cache validation.
//!
//! Decides whether the files already in the artifacts cache can be used as
//! they are. Nothing here writes to disk and nothing here is fatal except
//! a descriptor without an expected checksum: a missing, unreadable,
//! mismatching or slow-to-hash file just makes the cache invalid.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;

use crate::artifact::{ArtifactDescriptor, DownloadableArtifacts};
use crate::error::Result;

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

const HASH_CHUNK: usize = 1 << 20;

/// Like [`sha256_file`], but gives up with `None` once `deadline` has passed.
fn sha256_until(path: &Path, deadline: Instant) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        if Instant::now() >= deadline {
            return Ok(None);
        }
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Some(hex::encode(hasher.finalize())))
}

/// State of one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    Valid,
    Missing,
    Mismatch { actual: String },
    Unreadable(String),
    TimedOut,
}

impl ArtifactState {
    pub fn is_valid(&self) -> bool {
        matches!(self, ArtifactState::Valid)
    }
}

fn hash_state(path: &Path, expected: &str, deadline: Option<Instant>) -> ArtifactState {
    let hashed = match deadline {
        Some(deadline) => sha256_until(path, deadline),
        None => sha256_file(path).map(Some),
    };
    match hashed {
        Ok(Some(actual)) if actual == expected => ArtifactState::Valid,
        Ok(Some(actual)) => ArtifactState::Mismatch { actual },
        Ok(None) => ArtifactState::TimedOut,
        Err(e) if e.kind() == io::ErrorKind::NotFound => ArtifactState::Missing,
        Err(e) => ArtifactState::Unreadable(e.to_string()),
    }
}

/// Check a single artifact on the current thread.
pub fn check_artifact(artifact: &ArtifactDescriptor) -> Result<ArtifactState> {
    let expected = artifact.expected_checksum()?;
    Ok(hash_state(&artifact.local_path, expected, None))
}

/// Check every artifact concurrently, one blocking hash task each.
///
/// `timeout` bounds each hash from the moment it starts reading; a hash
/// past its deadline stops and reports [`ArtifactState::TimedOut`]. All
/// tasks are joined before returning. Results come back in the iteration
/// order of `artifacts`.
pub async fn check_all(
    artifacts: &DownloadableArtifacts,
    timeout: Option<Duration>,
) -> Result<Vec<(String, ArtifactState)>> {
    let mut jobs: Vec<(String, PathBuf, String)> = Vec::with_capacity(artifacts.len());
    for artifact in artifacts.iter() {
        let expected = artifact.expected_checksum()?.to_string();
        jobs.push((artifact.id.clone(), artifact.local_path.clone(), expected));
    }

    let mut set = JoinSet::new();
    for (index, (_, path, expected)) in jobs.iter().cloned().enumerate() {
        set.spawn_blocking(move || {
            let deadline = timeout.and_then(|limit| Instant::now().checked_add(limit));
            (index, hash_state(&path, &expected, deadline))
        });
    }

    let mut states = vec![ArtifactState::Missing; jobs.len()];
    while let Some(joined) = set.join_next().await {
        let (index, state) = joined?;
        states[index] = state;
    }

    Ok(jobs
        .into_iter()
        .map(|(id, _, _)| id)
        .zip(states)
        .collect())
}

/// True only if every artifact exists and matches its checksum.
///
/// Returns early, without hashing, when any file is absent.
pub async fn is_cache_valid(
    artifacts: &DownloadableArtifacts,
    timeout: Option<Duration>,
) -> Result<bool> {
    for artifact in artifacts.iter() {
        artifact.expected_checksum()?;
        if !artifact.local_path.exists() {
            tracing::debug!(artifact = %artifact.id, "not in cache");
            return Ok(false);
        }
    }

    let states = check_all(artifacts, timeout).await?;
    let mut valid = true;
    for (id, state) in &states {
        if !state.is_valid() {
            tracing::debug!(artifact = %id, state = ?state, "cache entry rejected");
            valid = false;
        }
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::descriptor;
    use crate::artifact::ArtifactRole;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> (PathBuf, String) {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        let digest = hex::encode(Sha256::digest(content));
        (path, digest)
    }

    fn set_of(dir: &Path, packages: usize, corrupt: Option<usize>) -> DownloadableArtifacts {
        let (host, host_sum) = write(dir, "host.tar.gz", b"host");
        let (lld, lld_sum) = write(dir, "lld.tar.xz", b"lld");
        let os_packages = (0..packages)
            .map(|i| {
                let content = format!("pkg{}", i);
                let (path, sum) = write(dir, &format!("pkg{}.deb", i), content.as_bytes());
                let sum = if corrupt == Some(i) { "0".repeat(64) } else { sum };
                descriptor(&format!("pkg{}", i), ArtifactRole::OsPackage, &path, Some(sum.as_str()))
            })
            .collect();
        DownloadableArtifacts::new(
            descriptor("host", ArtifactRole::HostToolchain, &host, Some(host_sum.as_str())),
            None,
            descriptor("lld", ArtifactRole::Linker, &lld, Some(lld_sum.as_str())),
            os_packages,
        )
        .unwrap()
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempdir().unwrap();
        let (path, _) = write(dir.path(), "abc", b"abc");
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_valid_cache() {
        let dir = tempdir().unwrap();
        let set = set_of(dir.path(), 3, None);
        assert!(is_cache_valid(&set, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_bad_checksum_invalidates() {
        let dir = tempdir().unwrap();
        let set = set_of(dir.path(), 3, Some(1));
        assert!(!is_cache_valid(&set, None).await.unwrap());

        let states = check_all(&set, None).await.unwrap();
        assert_eq!(states[3].0, "pkg1");
        assert!(matches!(states[3].1, ArtifactState::Mismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_invalidates() {
        let dir = tempdir().unwrap();
        let set = set_of(dir.path(), 1, None);
        std::fs::remove_file(dir.path().join("lld.tar.xz")).unwrap();
        assert!(!is_cache_valid(&set, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_deadline_times_out() {
        let dir = tempdir().unwrap();
        let set = set_of(dir.path(), 2, None);

        let states = check_all(&set, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(states.len(), 4);
        for (id, state) in &states {
            assert_eq!(state, &ArtifactState::TimedOut, "{id}");
        }
        assert!(!is_cache_valid(&set, Some(Duration::ZERO)).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        for packages in [0, 1, 7] {
            for corrupt in [None, Some(0)] {
                let dir = tempdir().unwrap();
                let set = set_of(dir.path(), packages, corrupt.filter(|&i| i < packages));

                let sequential = set
                    .iter()
                    .map(|a| check_artifact(a).unwrap().is_valid())
                    .all(|valid| valid);
                let concurrent = is_cache_valid(&set, Some(Duration::from_secs(30)))
                    .await
                    .unwrap();
                assert_eq!(sequential, concurrent, "packages={packages} corrupt={corrupt:?}");
            }
        }
    }
}
