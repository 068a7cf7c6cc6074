//! Generator configuration.
//!
//! Everything a run needs to know is resolved once into a [`GeneratorConfig`]
//! and then passed by reference to every stage. Nothing in here is mutated
//! after [`GeneratorConfig::resolve`] returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use sdkgen::config::{GeneratorConfig, GeneratorOptions};
//!
//! let config = GeneratorConfig::resolve(GeneratorOptions::default())?;
//! assert_eq!(config.versions.artifact_id(), "5.9.2-RELEASE_ubuntu_jammy_aarch64");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::artifact::catalog;
use crate::error::ConfigError;

pub const DEFAULT_SWIFT_VERSION: &str = "5.9.2-RELEASE";
pub const DEFAULT_LLD_VERSION: &str = "17.0.5";
pub const DEFAULT_TARGET: &str = "aarch64-unknown-linux-gnu";
pub const DEFAULT_CHECKSUMS_FILE: &str = "checksums.json";

/// CPU architectures the generator can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cpu {
    X86_64,
    Aarch64,
}

impl Cpu {
    /// Name used in Linux triples and in Swift's resource directories.
    pub fn linux_name(self) -> &'static str {
        match self {
            Cpu::X86_64 => "x86_64",
            Cpu::Aarch64 => "aarch64",
        }
    }

    /// Debian architecture name used by the Ubuntu package archive.
    pub fn debian_arch(self) -> &'static str {
        match self {
            Cpu::X86_64 => "amd64",
            Cpu::Aarch64 => "arm64",
        }
    }

    /// `--platform` value for `docker create`.
    pub fn docker_platform(self) -> &'static str {
        match self {
            Cpu::X86_64 => "linux/amd64",
            Cpu::Aarch64 => "linux/arm64",
        }
    }
}

impl FromStr for Cpu {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" | "amd64" => Ok(Cpu::X86_64),
            "aarch64" | "arm64" => Ok(Cpu::Aarch64),
            other => Err(ConfigError::UnsupportedTriple(other.to_string())),
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.linux_name())
    }
}

/// A `<cpu>-unknown-linux-gnu` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    pub cpu: Cpu,
}

impl Triple {
    pub fn linux(cpu: Cpu) -> Self {
        Self { cpu }
    }

    /// Triple of the machine running the generator.
    pub fn host() -> Result<Self, ConfigError> {
        if std::env::consts::OS != "linux" {
            return Err(ConfigError::UnsupportedHost(format!(
                "{}-{}",
                std::env::consts::ARCH,
                std::env::consts::OS
            )));
        }
        let cpu = std::env::consts::ARCH
            .parse()
            .map_err(|_| ConfigError::UnsupportedHost(std::env::consts::ARCH.to_string()))?;
        Ok(Self { cpu })
    }
}

impl FromStr for Triple {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || ConfigError::UnsupportedTriple(s.to_string());
        let (cpu, rest) = s.split_once('-').ok_or_else(unsupported)?;
        if rest != "unknown-linux-gnu" && rest != "linux-gnu" {
            return Err(unsupported());
        }
        let cpu = cpu.parse().map_err(|_| unsupported())?;
        Ok(Self { cpu })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-unknown-linux-gnu", self.cpu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UbuntuRelease {
    Focal,
    Jammy,
}

impl UbuntuRelease {
    pub fn version(self) -> &'static str {
        match self {
            UbuntuRelease::Focal => "20.04",
            UbuntuRelease::Jammy => "22.04",
        }
    }

    pub fn codename(self) -> &'static str {
        match self {
            UbuntuRelease::Focal => "focal",
            UbuntuRelease::Jammy => "jammy",
        }
    }
}

/// Linux distribution the SDK targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinuxDistribution {
    Ubuntu(UbuntuRelease),
    /// Red Hat Universal Base Image 9. Only available from container images.
    RhelUbi9,
}

impl LinuxDistribution {
    pub fn parse(name: &str, version: &str) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownDistribution {
            name: name.to_string(),
            version: version.to_string(),
        };
        match name.to_ascii_lowercase().as_str() {
            "ubuntu" => match version {
                "20.04" | "focal" => Ok(Self::Ubuntu(UbuntuRelease::Focal)),
                "22.04" | "jammy" => Ok(Self::Ubuntu(UbuntuRelease::Jammy)),
                _ => Err(unknown()),
            },
            "rhel" => match version {
                "ubi9" | "9" => Ok(Self::RhelUbi9),
                _ => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ubuntu(_) => "ubuntu",
            Self::RhelUbi9 => "rhel",
        }
    }

    pub fn release(self) -> &'static str {
        match self {
            Self::Ubuntu(release) => release.codename(),
            Self::RhelUbi9 => "ubi9",
        }
    }

    /// Directory name of the sysroot inside the bundle, e.g. `ubuntu-jammy.sdk`.
    pub fn sdk_dir_name(self) -> String {
        format!("{}-{}.sdk", self.name(), self.release())
    }
}

impl fmt::Display for LinuxDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ubuntu(release) => {
                write!(f, "Ubuntu {} ({})", release.version(), release.codename())
            }
            Self::RhelUbi9 => f.write_str("RHEL UBI 9"),
        }
    }
}

/// Resolved version and platform identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionsConfiguration {
    /// Swift release tag, e.g. `5.9.2-RELEASE`.
    pub swift_version: String,
    pub lld_version: String,
    pub distribution: LinuxDistribution,
    pub host: Triple,
    pub target: Triple,
}

impl VersionsConfiguration {
    /// `5.9.2-RELEASE` -> `5.9.2`
    pub fn swift_base_version(&self) -> &str {
        self.swift_version
            .strip_suffix("-RELEASE")
            .unwrap_or(&self.swift_version)
    }

    /// `5.9.2-RELEASE` -> `swift-5.9.2-release`
    pub fn swift_branch(&self) -> String {
        format!("swift-{}", self.swift_version.to_ascii_lowercase())
    }

    /// Identifier of the generated bundle, e.g. `5.9.2-RELEASE_ubuntu_jammy_aarch64`.
    pub fn artifact_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.swift_version,
            self.distribution.name(),
            self.distribution.release(),
            self.target.cpu
        )
    }
}

/// Every path the pipeline reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfiguration {
    /// Downloaded artifacts, one file per artifact.
    pub artifacts_cache: PathBuf,
    /// `<bundles>/<artifact-id>.artifactbundle`
    pub bundle: PathBuf,
    /// `<bundle>/<artifact-id>/<target-triple>`; holds the descriptors.
    pub sdk_root: PathBuf,
    /// Target sysroot, `<sdk_root>/<distribution>.sdk`.
    pub sdk_dir: PathBuf,
    /// `<bundle>/<artifact-id>/swift.xctoolchain`
    pub toolchain_dir: PathBuf,
    pub toolchain_bin_dir: PathBuf,
}

impl PathsConfiguration {
    pub fn new(
        artifacts_cache: &Path,
        bundles_dir: &Path,
        versions: &VersionsConfiguration,
    ) -> Self {
        let artifact_id = versions.artifact_id();
        let bundle = bundles_dir.join(format!("{}.artifactbundle", artifact_id));
        let sdk_root = bundle.join(&artifact_id).join(versions.target.to_string());
        let sdk_dir = sdk_root.join(versions.distribution.sdk_dir_name());
        let toolchain_dir = bundle.join(&artifact_id).join("swift.xctoolchain");
        let toolchain_bin_dir = toolchain_dir.join("usr").join("bin");

        Self {
            artifacts_cache: artifacts_cache.to_path_buf(),
            bundle,
            sdk_root,
            sdk_dir,
            toolchain_dir,
            toolchain_bin_dir,
        }
    }

    pub fn toolset_path(&self) -> PathBuf {
        self.sdk_root.join("toolset.json")
    }

    /// The destination descriptor.
    pub fn swift_sdk_path(&self) -> PathBuf {
        self.sdk_root.join("swift-sdk.json")
    }

    pub fn bundle_manifest_path(&self) -> PathBuf {
        self.bundle.join("info.json")
    }

    /// `<sdk>/usr/lib/swift/linux/<arch>/glibc.modulemap`
    pub fn glibc_modulemap_path(&self, cpu: Cpu) -> PathBuf {
        self.sdk_dir
            .join("usr/lib/swift/linux")
            .join(cpu.linux_name())
            .join("glibc.modulemap")
    }
}

/// How the target toolchain and sysroot are acquired. Chosen once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// Download the target Swift archive and the distribution's OS packages.
    Download,
    /// Copy the sysroot and Swift runtime out of a container image.
    Container { image: String },
}

/// Expected SHA-256 digests keyed by remote file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    /// Where the table came from, for error messages.
    pub source: PathBuf,
    entries: HashMap<String, String>,
}

impl Checksums {
    /// Load a JSON object of `{"file-name": "sha256-hex"}`.
    ///
    /// A missing file yields an empty table; descriptors that need an entry
    /// then fail with [`ConfigError::MissingChecksum`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<HashMap<String, String>>(&content).map_err(|e| {
                ConfigError::Checksums {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(ConfigError::Checksums {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        Ok(Self {
            source: path.to_path_buf(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k, v.to_ascii_lowercase()))
                .collect(),
        })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            source: PathBuf::from(DEFAULT_CHECKSUMS_FILE),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().to_ascii_lowercase()))
                .collect(),
        }
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.entries.get(file_name).map(String::as_str)
    }
}

/// Raw, unvalidated inputs (usually straight from the CLI).
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub target: String,
    /// Host triple; detected when absent.
    pub host: Option<String>,
    pub swift_version: String,
    pub lld_version: String,
    pub distribution_name: String,
    pub distribution_version: String,
    pub with_docker: bool,
    pub from_container_image: Option<String>,
    pub generate_from_scratch: bool,
    pub artifacts_cache: PathBuf,
    pub bundles_dir: PathBuf,
    pub checksums: PathBuf,
    pub artifact_timeout: Option<Duration>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            host: None,
            swift_version: DEFAULT_SWIFT_VERSION.to_string(),
            lld_version: DEFAULT_LLD_VERSION.to_string(),
            distribution_name: "ubuntu".to_string(),
            distribution_version: "22.04".to_string(),
            with_docker: false,
            from_container_image: None,
            generate_from_scratch: false,
            artifacts_cache: PathBuf::from("Artifacts"),
            bundles_dir: PathBuf::from("Bundles"),
            checksums: PathBuf::from(DEFAULT_CHECKSUMS_FILE),
            artifact_timeout: None,
        }
    }
}

/// The immutable configuration threaded through every stage.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub versions: VersionsConfiguration,
    pub paths: PathsConfiguration,
    pub target_source: TargetSource,
    pub generate_from_scratch: bool,
    /// Applied to each artifact's validation and download separately.
    pub artifact_timeout: Option<Duration>,
    pub checksums: Checksums,
}

impl GeneratorConfig {
    /// Validate options and compute versions and paths.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]: unknown distribution, unsupported triple,
    /// a distribution that needs `--with-docker`, or an unreadable checksums file.
    pub fn resolve(options: GeneratorOptions) -> Result<Self, ConfigError> {
        let distribution =
            LinuxDistribution::parse(&options.distribution_name, &options.distribution_version)?;
        let target: Triple = options.target.parse()?;
        let host = match &options.host {
            Some(host) => host.parse()?,
            None => Triple::host()?,
        };

        let versions = VersionsConfiguration {
            swift_version: options.swift_version,
            lld_version: options.lld_version,
            distribution,
            host,
            target,
        };

        let target_source = if options.with_docker || options.from_container_image.is_some() {
            let image = options
                .from_container_image
                .unwrap_or_else(|| catalog::container_image(&versions));
            TargetSource::Container { image }
        } else {
            if distribution == LinuxDistribution::RhelUbi9 {
                return Err(ConfigError::DistributionRequiresContainer {
                    distribution: distribution.to_string(),
                });
            }
            TargetSource::Download
        };

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let artifacts_cache = absolute(&cwd, &options.artifacts_cache);
        let bundles_dir = absolute(&cwd, &options.bundles_dir);
        let paths = PathsConfiguration::new(&artifacts_cache, &bundles_dir, &versions);
        let checksums = Checksums::load(&absolute(&cwd, &options.checksums))?;

        Ok(Self {
            versions,
            paths,
            target_source,
            generate_from_scratch: options.generate_from_scratch,
            artifact_timeout: options.artifact_timeout,
            checksums,
        })
    }

    pub fn artifact_id(&self) -> String {
        self.versions.artifact_id()
    }
}

#[cfg(test)]
impl GeneratorConfig {
    /// Jammy aarch64 download-mode config with cache and bundles under `root`.
    pub(crate) fn for_tests(root: &Path) -> Self {
        let versions = VersionsConfiguration {
            swift_version: DEFAULT_SWIFT_VERSION.to_string(),
            lld_version: DEFAULT_LLD_VERSION.to_string(),
            distribution: LinuxDistribution::Ubuntu(UbuntuRelease::Jammy),
            host: Triple::linux(Cpu::X86_64),
            target: Triple::linux(Cpu::Aarch64),
        };
        Self {
            paths: PathsConfiguration::new(
                &root.join("Artifacts"),
                &root.join("Bundles"),
                &versions,
            ),
            versions,
            target_source: TargetSource::Download,
            generate_from_scratch: false,
            artifact_timeout: None,
            checksums: Checksums::default(),
        }
    }
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(dir: &Path) -> GeneratorOptions {
        GeneratorOptions {
            host: Some("x86_64-unknown-linux-gnu".into()),
            artifacts_cache: dir.join("Artifacts"),
            bundles_dir: dir.join("Bundles"),
            checksums: dir.join("checksums.json"),
            ..Default::default()
        }
    }

    #[test]
    fn test_triple_parse() {
        let triple: Triple = "aarch64-unknown-linux-gnu".parse().unwrap();
        assert_eq!(triple.cpu, Cpu::Aarch64);
        assert_eq!(triple.to_string(), "aarch64-unknown-linux-gnu");

        let triple: Triple = "arm64-linux-gnu".parse().unwrap();
        assert_eq!(triple.cpu, Cpu::Aarch64);

        assert!("riscv64-unknown-linux-gnu".parse::<Triple>().is_err());
        assert!("x86_64-apple-macosx".parse::<Triple>().is_err());
    }

    #[test]
    fn test_distribution_parse() {
        assert_eq!(
            LinuxDistribution::parse("ubuntu", "22.04").unwrap(),
            LinuxDistribution::Ubuntu(UbuntuRelease::Jammy)
        );
        assert_eq!(
            LinuxDistribution::parse("Ubuntu", "focal").unwrap(),
            LinuxDistribution::Ubuntu(UbuntuRelease::Focal)
        );
        assert_eq!(LinuxDistribution::parse("rhel", "ubi9").unwrap(), LinuxDistribution::RhelUbi9);
        assert!(LinuxDistribution::parse("ubuntu", "18.04").is_err());
        assert!(LinuxDistribution::parse("debian", "12").is_err());
    }

    #[test]
    fn test_artifact_id_and_paths() {
        let dir = tempdir().unwrap();
        let config = GeneratorConfig::resolve(options(dir.path())).unwrap();

        assert_eq!(config.artifact_id(), "5.9.2-RELEASE_ubuntu_jammy_aarch64");
        assert_eq!(config.versions.swift_branch(), "swift-5.9.2-release");
        assert_eq!(config.versions.swift_base_version(), "5.9.2");

        let paths = &config.paths;
        let bundle = dir.path().join("Bundles/5.9.2-RELEASE_ubuntu_jammy_aarch64.artifactbundle");
        assert_eq!(paths.bundle, bundle);
        assert_eq!(
            paths.sdk_dir,
            bundle
                .join("5.9.2-RELEASE_ubuntu_jammy_aarch64/aarch64-unknown-linux-gnu")
                .join("ubuntu-jammy.sdk")
        );
        assert_eq!(
            paths.toolchain_bin_dir,
            bundle.join("5.9.2-RELEASE_ubuntu_jammy_aarch64/swift.xctoolchain/usr/bin")
        );
        assert_eq!(
            paths.glibc_modulemap_path(Cpu::Aarch64),
            paths.sdk_dir.join("usr/lib/swift/linux/aarch64/glibc.modulemap")
        );
        assert_eq!(config.target_source, TargetSource::Download);
    }

    #[test]
    fn test_rhel_requires_container() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.distribution_name = "rhel".into();
        opts.distribution_version = "ubi9".into();

        let err = GeneratorConfig::resolve(opts.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::DistributionRequiresContainer { .. }));

        opts.with_docker = true;
        let config = GeneratorConfig::resolve(opts).unwrap();
        assert_eq!(
            config.target_source,
            TargetSource::Container {
                image: "swift:5.9.2-rhel-ubi9".into()
            }
        );
    }

    #[test]
    fn test_checksums_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let checksums = Checksums::load(&dir.path().join("nope.json")).unwrap();
        assert!(checksums.get("anything").is_none());
    }

    #[test]
    fn test_checksums_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        std::fs::write(&path, r#"{"swift.tar.gz": "ABCDEF"}"#).unwrap();
        let checksums = Checksums::load(&path).unwrap();
        assert_eq!(checksums.get("swift.tar.gz"), Some("abcdef"));
    }

    #[test]
    fn test_checksums_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Checksums::load(&path),
            Err(ConfigError::Checksums { .. })
        ));
    }
}
