//! Ubuntu package index lookup.
//!
//! The target sysroot is built from a fixed list of `.deb` packages. Their
//! download paths and SHA-256 digests come from the distribution's
//! `Packages.gz` index (release pocket first, then `-updates`, so newer
//! stanzas win). Each compressed index must match the SHA-256 listed for it
//! in its suite's `Release` file; the `Release` signature is not checked.
//! The decompressed index is kept in the artifacts cache and reused on
//! later runs without touching the network.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use super::{ArtifactDescriptor, ArtifactRole};
use crate::config::{Cpu, UbuntuRelease};
use crate::error::{at, ConfigError, FetchError, GeneratorError, Result};
use crate::fetch::http::HttpClient;

pub const UBUNTU_ARCHIVE: &str = "http://archive.ubuntu.com/ubuntu";
pub const UBUNTU_PORTS: &str = "http://ports.ubuntu.com/ubuntu-ports";

/// amd64 lives on the main archive, everything else on ports.
pub fn mirror(cpu: Cpu) -> &'static str {
    match cpu {
        Cpu::X86_64 => UBUNTU_ARCHIVE,
        Cpu::Aarch64 => UBUNTU_PORTS,
    }
}

/// Packages unpacked into the sysroot.
pub fn required_packages(release: UbuntuRelease) -> Vec<String> {
    let (gcc, icu) = match release {
        UbuntuRelease::Focal => ("9", "66"),
        UbuntuRelease::Jammy => ("12", "70"),
    };
    vec![
        "libc6".to_string(),
        "libc6-dev".to_string(),
        "libgcc-s1".to_string(),
        format!("libgcc-{}-dev", gcc),
        format!("libicu{}", icu),
        "libicu-dev".to_string(),
        format!("libstdc++-{}-dev", gcc),
        "libstdc++6".to_string(),
        "linux-libc-dev".to_string(),
        "zlib1g".to_string(),
        "zlib1g-dev".to_string(),
    ]
}

/// One stanza of a `Packages` file, reduced to what we need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    /// Pool path relative to the mirror root.
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    records: HashMap<String, PackageRecord>,
}

impl PackageIndex {
    /// Parse a Debian `Packages` file. Later stanzas override earlier ones
    /// with the same package name; incomplete stanzas are ignored.
    pub fn parse(text: &str) -> Self {
        let mut records = HashMap::new();
        for stanza in text.split("\n\n") {
            let mut name = None;
            let mut filename = None;
            let mut sha256 = None;
            for line in stanza.lines() {
                if let Some(value) = line.strip_prefix("Package:") {
                    name = Some(value.trim());
                } else if let Some(value) = line.strip_prefix("Filename:") {
                    filename = Some(value.trim());
                } else if let Some(value) = line.strip_prefix("SHA256:") {
                    sha256 = Some(value.trim());
                }
            }
            if let (Some(name), Some(filename), Some(sha256)) = (name, filename, sha256) {
                records.insert(
                    name.to_string(),
                    PackageRecord {
                        name: name.to_string(),
                        filename: filename.to_string(),
                        sha256: sha256.to_ascii_lowercase(),
                    },
                );
            }
        }
        Self { records }
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `<cache>/ubuntu-jammy-arm64-Packages`
pub fn index_cache_path(cache: &Path, release: UbuntuRelease, cpu: Cpu) -> PathBuf {
    cache.join(format!(
        "ubuntu-{}-{}-Packages",
        release.codename(),
        cpu.debian_arch()
    ))
}

fn suites(release: UbuntuRelease) -> [String; 2] {
    [
        release.codename().to_string(),
        format!("{}-updates", release.codename()),
    ]
}

/// Path of the index inside a suite, as listed in its `Release` file.
fn index_member(cpu: Cpu) -> String {
    format!("main/binary-{}/Packages.gz", cpu.debian_arch())
}

/// SHA-256 digests from the `SHA256:` section of a `Release` file, keyed
/// by path relative to the suite.
pub fn release_digests(text: &str) -> HashMap<String, String> {
    let mut digests = HashMap::new();
    let mut in_sha256 = false;
    for line in text.lines() {
        if !line.starts_with(' ') {
            in_sha256 = line.trim_end() == "SHA256:";
            continue;
        }
        if !in_sha256 {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let [digest, _size, name] = fields[..] {
            digests.insert(name.to_string(), digest.to_ascii_lowercase());
        }
    }
    digests
}

async fn fetch(client: &HttpClient, artifact: &str, url: &str) -> Result<Vec<u8>> {
    let bytes = client.get_bytes(url).await.map_err(|source| match source.status() {
        Some(status) => FetchError::Status {
            artifact: artifact.to_string(),
            url: url.to_string(),
            status,
        },
        None => FetchError::Transport {
            artifact: artifact.to_string(),
            url: url.to_string(),
            source,
        },
    })?;
    Ok(bytes)
}

/// Download one suite's index and check it against the suite's `Release`.
async fn fetch_suite_index(
    client: &HttpClient,
    index_id: &str,
    mirror: &str,
    suite: &str,
    cpu: Cpu,
) -> Result<String> {
    let release_url = format!("{}/dists/{}/Release", mirror, suite);
    tracing::info!(url = %release_url, "fetching release file");
    let release = fetch(client, index_id, &release_url).await?;
    let member = index_member(cpu);
    let expected = release_digests(&String::from_utf8_lossy(&release))
        .remove(&member)
        .ok_or_else(|| FetchError::UnlistedIndex {
            artifact: index_id.to_string(),
            url: release_url.clone(),
            member: member.clone(),
        })?;

    let url = format!("{}/dists/{}/{}", mirror, suite, member);
    tracing::info!(url = %url, "fetching package index");
    let compressed = fetch(client, index_id, &url).await?;
    let actual = hex::encode(Sha256::digest(&compressed));
    if actual != expected {
        return Err(FetchError::ChecksumMismatch {
            artifact: index_id.to_string(),
            expected,
            actual,
        }
        .into());
    }

    let mut decoded = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut decoded)
        .map_err(|source| GeneratorError::Archive {
            path: PathBuf::from(&url),
            source,
        })?;
    Ok(decoded)
}

/// Load the package index, downloading and caching it on first use.
pub async fn load_index(
    client: &HttpClient,
    mirror: &str,
    cache: &Path,
    release: UbuntuRelease,
    cpu: Cpu,
) -> Result<PackageIndex> {
    let cached = index_cache_path(cache, release, cpu);
    if cached.exists() {
        println!("  [SKIP] Package index cached: {}", cached.display());
        let text = tokio::fs::read_to_string(&cached).await.map_err(at(&cached))?;
        return Ok(PackageIndex::parse(&text));
    }

    let index_id = format!("ubuntu-{}-{}-Packages", release.codename(), cpu.debian_arch());
    let mut text = String::new();
    for suite in suites(release) {
        let decoded = fetch_suite_index(client, &index_id, mirror, &suite, cpu).await?;
        text.push_str(decoded.trim_end());
        text.push_str("\n\n");
    }

    tokio::fs::create_dir_all(cache).await.map_err(at(cache))?;
    let part = cached.with_extension("part");
    tokio::fs::write(&part, &text).await.map_err(at(&part))?;
    tokio::fs::rename(&part, &cached).await.map_err(at(&cached))?;

    Ok(PackageIndex::parse(&text))
}

/// One descriptor per required package, cached under its `.deb` file name.
pub fn descriptors(
    index: &PackageIndex,
    mirror: &str,
    cache: &Path,
    release: UbuntuRelease,
) -> Result<Vec<ArtifactDescriptor>, ConfigError> {
    required_packages(release)
        .into_iter()
        .map(|name| {
            let record = index.get(&name).ok_or_else(|| ConfigError::PackageNotFound {
                package: name.clone(),
                index: format!("Ubuntu {}", release.codename()),
            })?;
            let file_name = record
                .filename
                .rsplit('/')
                .next()
                .unwrap_or(&record.filename);
            Ok(ArtifactDescriptor {
                id: name,
                role: ArtifactRole::OsPackage,
                url: format!("{}/{}", mirror, record.filename),
                local_path: cache.join(file_name),
                checksum: Some(record.sha256.clone()),
            })
        })
        .collect()
}
