//! Error taxonomy for the generator.
//!
//! Configuration problems and transfer failures get their own enums so the
//! caller can tell "fix your flags" apart from "the network let you down".
//! Everything else is a filesystem, archive or external-tool failure and
//! always carries the offending path or command.
//!
//! A checksum mismatch found while *validating the cache* is not an error at
//! all: it only demotes the cache to invalid (see [`crate::cache`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors detected while resolving configuration or artifact descriptors.
///
/// These are raised before any network activity where possible.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported Linux distribution: {name} {version}")]
    UnknownDistribution { name: String, version: String },

    #[error("{distribution} is only supported with --with-docker (no package repository to download from)")]
    DistributionRequiresContainer { distribution: String },

    #[error("unsupported target triple: {0} (expected x86_64-unknown-linux-gnu or aarch64-unknown-linux-gnu)")]
    UnsupportedTriple(String),

    #[error("unsupported host: {0} (only Linux hosts are supported)")]
    UnsupportedHost(String),

    #[error("no expected checksum for artifact '{artifact}' ({file}); add it to the checksums file")]
    MissingChecksum { artifact: String, file: String },

    #[error("artifacts '{first}' and '{second}' share the cache path {}", .path.display())]
    DuplicateCachePath {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error("package '{package}' not found in the {index} package index")]
    PackageNotFound { package: String, index: String },

    #[error("failed to read checksums file {}: {message}", .path.display())]
    Checksums { path: PathBuf, message: String },

    #[error("expected file to patch does not exist: {}", .0.display())]
    MissingPatchTarget(PathBuf),
}

/// Errors from the fetch phase. Always fatal, always names the artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download '{artifact}' from {url}: {source}")]
    Transport {
        artifact: String,
        url: String,
        source: reqwest::Error,
    },

    #[error("failed to download '{artifact}' from {url}: HTTP {status}")]
    Status {
        artifact: String,
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("checksum mismatch for '{artifact}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("{url} does not list {member} for '{artifact}'")]
    UnlistedIndex {
        artifact: String,
        url: String,
        member: String,
    },

    #[error("timed out fetching '{artifact}' after {:.1}s", .limit.as_secs_f64())]
    Timeout { artifact: String, limit: Duration },
}

/// Top-level error for every pipeline stage.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to extract {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("failed to write {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to initialise HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl GeneratorError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Shorthand for `map_err(|e| GeneratorError::io(path, e))`.
pub(crate) fn at(path: &Path) -> impl FnOnce(std::io::Error) -> GeneratorError + '_ {
    move |source| GeneratorError::io(path, source)
}

pub type Result<T, E = GeneratorError> = std::result::Result<T, E>;
