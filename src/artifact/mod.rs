//! The set of files a bundle is assembled from.
//!
//! - `catalog` - upstream URLs and file names
//! - `packages` - Ubuntu package index lookup
//!
//! A [`DownloadableArtifacts`] value is the only way artifacts reach the
//! cache validator and the fetcher. Its constructor guarantees that every
//! descriptor has an expected checksum and a cache path of its own.
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = HttpClient::new()?;
//! let artifacts = artifact::resolve(&config, &client).await?;
//! for artifact in artifacts.iter() {
//!     println!("{} -> {}", artifact.id, artifact.local_path.display());
//! }
//! ```

pub mod catalog;
pub mod packages;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Cpu, GeneratorConfig, LinuxDistribution, TargetSource};
use crate::error::{ConfigError, Result};
use crate::fetch::http::HttpClient;

/// What an artifact is used for during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    HostToolchain,
    TargetToolchain,
    Linker,
    OsPackage,
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactRole::HostToolchain => "host toolchain",
            ArtifactRole::TargetToolchain => "target toolchain",
            ArtifactRole::Linker => "linker",
            ArtifactRole::OsPackage => "OS package",
        })
    }
}

/// One downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    /// Short name used in progress output and errors.
    pub id: String,
    pub role: ArtifactRole,
    pub url: String,
    /// Where the file lives in the artifacts cache.
    pub local_path: PathBuf,
    /// Expected SHA-256, lowercase hex.
    pub checksum: Option<String>,
}

impl ArtifactDescriptor {
    /// Last path segment of the URL.
    pub fn remote_file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    pub fn expected_checksum(&self) -> Result<&str, ConfigError> {
        self.checksum
            .as_deref()
            .ok_or_else(|| ConfigError::MissingChecksum {
                artifact: self.id.clone(),
                file: self.remote_file_name().to_string(),
            })
    }
}

/// Every artifact needed for one bundle, one field per role.
#[derive(Debug, Clone)]
pub struct DownloadableArtifacts {
    host_toolchain: ArtifactDescriptor,
    /// Absent when the target comes from a container image.
    target_toolchain: Option<ArtifactDescriptor>,
    linker: ArtifactDescriptor,
    os_packages: Vec<ArtifactDescriptor>,
}

impl DownloadableArtifacts {
    /// Build the set, rejecting descriptors without a checksum and
    /// descriptors that would share a cache file.
    pub fn new(
        host_toolchain: ArtifactDescriptor,
        target_toolchain: Option<ArtifactDescriptor>,
        linker: ArtifactDescriptor,
        os_packages: Vec<ArtifactDescriptor>,
    ) -> Result<Self, ConfigError> {
        let set = Self {
            host_toolchain,
            target_toolchain,
            linker,
            os_packages,
        };

        let mut seen: Vec<&ArtifactDescriptor> = Vec::with_capacity(set.len());
        for artifact in set.iter() {
            artifact.expected_checksum()?;
            if let Some(first) = seen.iter().find(|a| a.local_path == artifact.local_path) {
                return Err(ConfigError::DuplicateCachePath {
                    first: first.id.clone(),
                    second: artifact.id.clone(),
                    path: artifact.local_path.clone(),
                });
            }
            seen.push(artifact);
        }

        Ok(set)
    }

    pub fn host_toolchain(&self) -> &ArtifactDescriptor {
        &self.host_toolchain
    }

    pub fn target_toolchain(&self) -> Option<&ArtifactDescriptor> {
        self.target_toolchain.as_ref()
    }

    pub fn linker(&self) -> &ArtifactDescriptor {
        &self.linker
    }

    pub fn os_packages(&self) -> &[ArtifactDescriptor] {
        &self.os_packages
    }

    /// Host, target, linker, then packages.
    pub fn iter(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        std::iter::once(&self.host_toolchain)
            .chain(self.target_toolchain.as_ref())
            .chain(std::iter::once(&self.linker))
            .chain(self.os_packages.iter())
    }

    pub fn len(&self) -> usize {
        2 + usize::from(self.target_toolchain.is_some()) + self.os_packages.len()
    }

    /// Always false; host toolchain and linker are mandatory.
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn swift_toolchain(
    config: &GeneratorConfig,
    id: &str,
    role: ArtifactRole,
    cpu: Cpu,
) -> ArtifactDescriptor {
    let versions = &config.versions;
    let file_name = catalog::swift_archive_name(versions, cpu);
    ArtifactDescriptor {
        id: id.to_string(),
        role,
        url: catalog::swift_archive_url(versions, cpu),
        local_path: config.paths.artifacts_cache.join(format!("{}.tar.gz", id)),
        checksum: config.checksums.get(&file_name).map(str::to_owned),
    }
}

fn linker(config: &GeneratorConfig, cache: &Path) -> ArtifactDescriptor {
    let versions = &config.versions;
    ArtifactDescriptor {
        id: "host_lld".to_string(),
        role: ArtifactRole::Linker,
        url: catalog::lld_archive_url(versions),
        local_path: cache.join("host_lld.tar.xz"),
        checksum: config
            .checksums
            .get(&catalog::lld_archive_name(versions))
            .map(str::to_owned),
    }
}

/// Swift and LLD descriptors for a run: host toolchain, target toolchain
/// (download mode only) and linker. Checksums are not validated here.
pub fn toolchain_descriptors(
    config: &GeneratorConfig,
) -> (ArtifactDescriptor, Option<ArtifactDescriptor>, ArtifactDescriptor) {
    let versions = &config.versions;
    let host = swift_toolchain(
        config,
        "host_swift",
        ArtifactRole::HostToolchain,
        versions.host.cpu,
    );
    let target = match config.target_source {
        TargetSource::Download => Some(swift_toolchain(
            config,
            "target_swift",
            ArtifactRole::TargetToolchain,
            versions.target.cpu,
        )),
        TargetSource::Container { .. } => None,
    };
    (host, target, linker(config, &config.paths.artifacts_cache))
}

/// Derive the artifact set for a run.
///
/// Swift and LLD checksums are checked before anything touches the
/// network. In download mode the Ubuntu package index is then loaded
/// (from the cache when present) to describe the OS packages.
pub async fn resolve(
    config: &GeneratorConfig,
    client: &HttpClient,
) -> Result<DownloadableArtifacts> {
    let (host, target, linker) = toolchain_descriptors(config);
    for artifact in std::iter::once(&host).chain(target.as_ref()).chain(Some(&linker)) {
        artifact.expected_checksum()?;
    }

    let os_packages = match config.target_source {
        TargetSource::Container { .. } => Vec::new(),
        TargetSource::Download => {
            let release = match config.versions.distribution {
                LinuxDistribution::Ubuntu(release) => release,
                other => {
                    return Err(ConfigError::DistributionRequiresContainer {
                        distribution: other.to_string(),
                    }
                    .into())
                }
            };
            let cpu = config.versions.target.cpu;
            let cache = &config.paths.artifacts_cache;
            let mirror = packages::mirror(cpu);
            let index = packages::load_index(client, mirror, cache, release, cpu).await?;
            packages::descriptors(&index, mirror, cache, release)?
        }
    };

    Ok(DownloadableArtifacts::new(host, target, linker, os_packages)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn descriptor(
        id: &str,
        role: ArtifactRole,
        path: &Path,
        checksum: Option<&str>,
    ) -> ArtifactDescriptor {
        ArtifactDescriptor {
            id: id.to_string(),
            role,
            url: format!("https://example.invalid/{}.tar", id),
            local_path: path.to_path_buf(),
            checksum: checksum.map(str::to_owned),
        }
    }

    #[test]
    fn test_iteration_order() {
        let set = DownloadableArtifacts::new(
            descriptor("host", ArtifactRole::HostToolchain, Path::new("/c/host"), Some("aa")),
            Some(descriptor(
                "target",
                ArtifactRole::TargetToolchain,
                Path::new("/c/target"),
                Some("bb"),
            )),
            descriptor("lld", ArtifactRole::Linker, Path::new("/c/lld"), Some("cc")),
            vec![descriptor(
                "libc6",
                ArtifactRole::OsPackage,
                Path::new("/c/libc6.deb"),
                Some("dd"),
            )],
        )
        .unwrap();

        let ids: Vec<_> = set.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["host", "target", "lld", "libc6"]);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_missing_checksum_rejected() {
        let err = DownloadableArtifacts::new(
            descriptor("host", ArtifactRole::HostToolchain, Path::new("/c/host"), Some("aa")),
            None,
            descriptor("lld", ArtifactRole::Linker, Path::new("/c/lld"), None),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingChecksum { ref artifact, .. } if artifact == "lld"
        ));
    }

    #[test]
    fn test_duplicate_cache_path_rejected() {
        let shared = Path::new("/c/swift.tar.gz");
        let err = DownloadableArtifacts::new(
            descriptor("host", ArtifactRole::HostToolchain, shared, Some("aa")),
            Some(descriptor("target", ArtifactRole::TargetToolchain, shared, Some("aa"))),
            descriptor("lld", ArtifactRole::Linker, Path::new("/c/lld"), Some("cc")),
            Vec::new(),
        )
        .unwrap_err();
        match err {
            ConfigError::DuplicateCachePath { first, second, .. } => {
                assert_eq!(first, "host");
                assert_eq!(second, "target");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_container_mode_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GeneratorConfig::for_tests(dir.path());
        config.versions.distribution = LinuxDistribution::RhelUbi9;
        config.target_source = TargetSource::Container {
            image: "swift:5.9.2-rhel-ubi9".into(),
        };
        config.checksums = crate::config::Checksums::from_entries([
            (catalog::swift_archive_name(&config.versions, Cpu::X86_64), "11".to_string()),
            (catalog::lld_archive_name(&config.versions), "22".to_string()),
        ]);

        let client = HttpClient::new().unwrap();
        let set = resolve(&config, &client).await.unwrap();
        let ids: Vec<_> = set.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["host_swift", "host_lld"]);
        assert_eq!(
            set.host_toolchain().local_path,
            config.paths.artifacts_cache.join("host_swift.tar.gz")
        );
    }

    #[tokio::test]
    async fn test_resolve_reports_missing_swift_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneratorConfig::for_tests(dir.path());

        let client = HttpClient::new().unwrap();
        let err = resolve(&config, &client).await.unwrap_err();
        assert!(err.to_string().contains("host_swift"));
    }
}
