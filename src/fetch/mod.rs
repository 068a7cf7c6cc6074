//! Artifact download.
//!
//! Every artifact is handled by its own task:
//!
//! 1. **Reuse**: the cached file exists and matches its checksum
//! 2. **Probe**: `HEAD` the URL; any answer (or none) is only logged
//! 3. **Download**: stream into `<path>.part`, hashing as we go
//! 4. **Commit**: rename into place once the checksum matches
//!
//! All tasks are joined before the result is decided, and the first error
//! (in artifact order) is returned. The assembly tree is never touched.

pub mod http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use crate::artifact::{ArtifactDescriptor, DownloadableArtifacts};
use crate::cache::sha256_file;
use crate::error::{at, FetchError, Result};
use http::{HttpClient, Probe};

/// Artifacts whose cached files are known to match their checksums.
///
/// Only produced by [`ensure_artifacts`] or by a successful cache
/// validation, so assembly never sees an unverified file.
#[derive(Debug, Clone)]
pub struct ValidatedArtifacts {
    artifacts: DownloadableArtifacts,
}

impl ValidatedArtifacts {
    /// Wrap a set the cache validator has already accepted.
    pub(crate) fn from_valid_cache(artifacts: DownloadableArtifacts) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &DownloadableArtifacts {
        &self.artifacts
    }
}

/// What the fetch phase did, by artifact id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub downloaded: Vec<String>,
    pub reused: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Reused,
    Downloaded,
}

/// `<path>.part`
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Make sure every artifact is present in the cache with the right checksum.
pub async fn ensure_artifacts(
    client: &HttpClient,
    artifacts: DownloadableArtifacts,
    timeout: Option<Duration>,
) -> Result<(ValidatedArtifacts, FetchReport)> {
    let mut set = JoinSet::new();
    for (index, artifact) in artifacts.iter().cloned().enumerate() {
        let client = client.clone();
        set.spawn(async move {
            let id = artifact.id.clone();
            let outcome = match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, ensure_one(&client, &artifact)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let _ = tokio::fs::remove_file(part_path(&artifact.local_path)).await;
                            Err(FetchError::Timeout {
                                artifact: id.clone(),
                                limit,
                            }
                            .into())
                        }
                    }
                }
                None => ensure_one(&client, &artifact).await,
            };
            (index, id, outcome)
        });
    }

    let mut results = Vec::with_capacity(artifacts.len());
    while let Some(joined) = set.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut report = FetchReport::default();
    let mut first_error = None;
    for (_, id, outcome) in results {
        match outcome {
            Ok(Outcome::Reused) => {
                println!("  [SKIP] {} (cached)", id);
                report.reused.push(id);
            }
            Ok(Outcome::Downloaded) => {
                println!("  Downloaded {}", id);
                report.downloaded.push(id);
            }
            Err(e) => {
                tracing::error!(artifact = %id, error = %e, "fetch failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok((ValidatedArtifacts { artifacts }, report)),
    }
}

async fn ensure_one(client: &HttpClient, artifact: &ArtifactDescriptor) -> Result<Outcome> {
    let expected = artifact.expected_checksum()?.to_string();
    let path = artifact.local_path.clone();

    if path.exists() {
        let hashed = path.clone();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&hashed)).await?;
        match actual {
            Ok(actual) if actual == expected => return Ok(Outcome::Reused),
            Ok(actual) => {
                tracing::info!(
                    artifact = %artifact.id,
                    expected = %expected,
                    actual = %actual,
                    "cached file is stale"
                );
            }
            Err(e) => {
                tracing::warn!(artifact = %artifact.id, error = %e, "cached file unreadable");
            }
        }
        tokio::fs::remove_file(&path).await.map_err(at(&path))?;
    }

    download(client, artifact, &expected).await?;
    Ok(Outcome::Downloaded)
}

async fn download(
    client: &HttpClient,
    artifact: &ArtifactDescriptor,
    expected: &str,
) -> Result<()> {
    let path = &artifact.local_path;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(at(parent))?;
    }

    match client.probe(&artifact.url).await {
        Probe::Available { content_length } => {
            tracing::debug!(artifact = %artifact.id, ?content_length, "probe ok");
        }
        Probe::Anomaly(status) => {
            tracing::warn!(
                artifact = %artifact.id,
                %status,
                "probe returned non-success status, downloading anyway"
            );
        }
        Probe::Unreachable(reason) => {
            tracing::warn!(artifact = %artifact.id, %reason, "probe failed, downloading anyway");
        }
    }

    tracing::info!(artifact = %artifact.id, url = %artifact.url, "downloading");
    let transport = |source: reqwest::Error| FetchError::Transport {
        artifact: artifact.id.clone(),
        url: artifact.url.clone(),
        source,
    };
    let mut response = client.get(&artifact.url).await.map_err(transport)?;
    if !response.status().is_success() {
        return Err(FetchError::Status {
            artifact: artifact.id.clone(),
            url: artifact.url.clone(),
            status: response.status(),
        }
        .into());
    }

    let part = part_path(path);
    let written = write_part(&mut response, &part, transport).await;
    let actual = match written {
        Ok(actual) => actual,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if actual != expected {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(FetchError::ChecksumMismatch {
            artifact: artifact.id.clone(),
            expected: expected.to_string(),
            actual,
        }
        .into());
    }

    tokio::fs::rename(&part, path).await.map_err(at(path))?;
    Ok(())
}

/// Stream the body into `part`, returning its SHA-256.
async fn write_part(
    response: &mut reqwest::Response,
    part: &Path,
    transport: impl Fn(reqwest::Error) -> FetchError,
) -> Result<String> {
    let mut file = tokio::fs::File::create(part).await.map_err(at(part))?;
    let mut hasher = Sha256::new();
    while let Some(chunk) = response.chunk().await.map_err(&transport)? {
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(at(part))?;
    }
    file.flush().await.map_err(at(part))?;
    Ok(hex::encode(hasher.finalize()))
}
