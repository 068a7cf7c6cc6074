//! Preflight checks for SDK generation.
//!
//! This module validates that all prerequisites are met BEFORE starting
//! expensive operations like downloading or unpacking toolchains.
//!
//! # Checks Performed
//!
//! - **Host tools**: `dpkg-deb` (download mode) or `docker` (container mode)
//! - **Disk space**: room for the artifacts cache and the bundle
//! - **Network**: every artifact host answers a `HEAD` probe
//! - **Checksums**: every Swift/LLD artifact has an expected checksum
//! - **Cache status**: reports what's already downloaded
//!
//! # Usage
//!
//! ```rust,ignore
//! use sdkgen::preflight::PreflightChecker;
//!
//! let checker = PreflightChecker::new(config, client);
//! let report = checker.run_all().await;
//! report.print_summary();
//! ```

mod disk_space;
mod host_tools;
mod network;

pub use disk_space::check_disk_space;
pub use host_tools::check_host_tools;
pub use network::check_network;

use std::path::PathBuf;

use crate::artifact::{self, packages, ArtifactDescriptor};
use crate::cache::{self, ArtifactState};
use crate::config::{GeneratorConfig, LinuxDistribution, TargetSource};
use crate::fetch::http::HttpClient;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a warning check result (passes but with a note).
    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: format!("Warning: {}", message.into()),
            suggestion: None,
        }
    }
}

/// Comprehensive preflight report.
#[derive(Debug, Default)]
pub struct PreflightReport {
    /// All check results
    pub checks: Vec<CheckResult>,
    /// Cached artifacts found
    pub cache_status: CacheStatus,
}

impl PreflightReport {
    /// Check if all preflight checks passed.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Get all failing checks.
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Print a summary of the preflight checks.
    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        println!("=== Cache Status ===\n");
        self.cache_status.print();

        println!();
        if self.is_ok() {
            println!(
                "All preflight checks passed ({}/{})",
                self.passed_count(),
                self.total_count()
            );
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.total_count()
            );
        }
    }
}

/// Cache state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Valid,
    Missing,
    /// Present but failing verification.
    Invalid(String),
    /// Present, but there is no checksum to verify it against.
    Unverified,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,
    pub path: PathBuf,
    pub state: EntryState,
}

/// Status of cached downloads.
#[derive(Debug, Default)]
pub struct CacheStatus {
    pub entries: Vec<CacheEntry>,
    /// Cached Ubuntu package index, if the run uses one.
    pub package_index: Option<(PathBuf, bool)>,
}

impl CacheStatus {
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.state == EntryState::Valid)
            && self.package_index.as_ref().map_or(true, |(_, cached)| *cached)
    }

    /// Print cache status.
    pub fn print(&self) {
        if let Some((path, cached)) = &self.package_index {
            let status = if *cached { "[cached]" } else { "[missing]" };
            println!("{}  package index ({})", status, path.display());
        }
        for entry in &self.entries {
            let status = match &entry.state {
                EntryState::Valid => "[cached]".to_string(),
                EntryState::Missing => "[missing]".to_string(),
                EntryState::Invalid(reason) => format!("[invalid: {}]", reason),
                EntryState::Unverified => "[no checksum]".to_string(),
            };
            println!("{}  {} ({})", status, entry.id, entry.path.display());
        }
    }
}

fn entry_state(artifact: &ArtifactDescriptor) -> EntryState {
    if !artifact.local_path.exists() {
        return EntryState::Missing;
    }
    match cache::check_artifact(artifact) {
        Ok(ArtifactState::Valid) => EntryState::Valid,
        Ok(ArtifactState::Missing) => EntryState::Missing,
        Ok(ArtifactState::Mismatch { .. }) => EntryState::Invalid("checksum mismatch".into()),
        Ok(ArtifactState::Unreadable(reason)) => EntryState::Invalid(reason),
        Ok(ArtifactState::TimedOut) => EntryState::Invalid("timed out".into()),
        Err(_) => EntryState::Unverified,
    }
}

/// Artifacts known without touching the network: Swift and LLD always,
/// OS packages only once the package index is cached.
pub fn cache_status(config: &GeneratorConfig) -> CacheStatus {
    let (host, target, linker) = artifact::toolchain_descriptors(config);
    let mut artifacts: Vec<ArtifactDescriptor> = std::iter::once(host)
        .chain(target)
        .chain(Some(linker))
        .collect();

    let mut package_index = None;
    if let (TargetSource::Download, LinuxDistribution::Ubuntu(release)) =
        (&config.target_source, config.versions.distribution)
    {
        let cache = &config.paths.artifacts_cache;
        let cpu = config.versions.target.cpu;
        let index_path = packages::index_cache_path(cache, release, cpu);
        let cached = index_path.exists();
        if cached {
            let index = std::fs::read_to_string(&index_path)
                .map(|text| packages::PackageIndex::parse(&text))
                .unwrap_or_default();
            let mirror = packages::mirror(cpu);
            if let Ok(found) = packages::descriptors(&index, mirror, cache, release) {
                artifacts.extend(found);
            }
        }
        package_index = Some((index_path, cached));
    }

    CacheStatus {
        entries: artifacts
            .iter()
            .map(|a| CacheEntry {
                id: a.id.clone(),
                path: a.local_path.clone(),
                state: entry_state(a),
            })
            .collect(),
        package_index,
    }
}

/// Every URL the run will fetch first from each host.
fn probe_urls(config: &GeneratorConfig) -> Vec<String> {
    let (host, target, linker) = artifact::toolchain_descriptors(config);
    let mut urls: Vec<String> = std::iter::once(host)
        .chain(target)
        .chain(Some(linker))
        .map(|a| a.url)
        .collect();
    if config.target_source == TargetSource::Download {
        urls.push(packages::mirror(config.versions.target.cpu).to_string());
    }
    urls
}

fn check_checksums(config: &GeneratorConfig) -> Vec<CheckResult> {
    let (host, target, linker) = artifact::toolchain_descriptors(config);
    std::iter::once(host)
        .chain(target)
        .chain(Some(linker))
        .map(|a| match a.expected_checksum() {
            Ok(_) => CheckResult::pass(format!("{} checksum", a.id), "Known"),
            Err(e) => CheckResult::fail(
                format!("{} checksum", a.id),
                e.to_string(),
                format!(
                    "Add \"{}\" to {}",
                    a.remote_file_name(),
                    config.checksums.source.display()
                ),
            ),
        })
        .collect()
}

/// Preflight checker for SDK generation prerequisites.
pub struct PreflightChecker {
    config: GeneratorConfig,
    client: HttpClient,
}

impl PreflightChecker {
    pub fn new(config: GeneratorConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    /// Run all preflight checks and return a comprehensive report.
    pub async fn run_all(&self) -> PreflightReport {
        let mut report = PreflightReport::default();

        // Check host tools
        report
            .checks
            .extend(check_host_tools(&self.config.target_source));

        // Check disk space where the bundle goes
        report.checks.push(check_disk_space(&self.config.paths.bundle));

        // Check checksums
        report.checks.extend(check_checksums(&self.config));

        // Check network (async)
        report
            .checks
            .extend(check_network(&self.client, &probe_urls(&self.config)).await);

        report.cache_status = cache_status(&self.config);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Checksums;
    use tempfile::tempdir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", "passed");
        assert!(result.passed);
        assert!(result.suggestion.is_none());
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("test", "failed", "fix it");
        assert!(!result.passed);
        assert!(result.suggestion.is_some());
    }

    #[test]
    fn test_preflight_report_is_ok() {
        let mut report = PreflightReport::default();
        assert!(report.is_ok()); // Empty is OK

        report.checks.push(CheckResult::warn("probe", "403"));
        assert!(report.is_ok());

        report.checks.push(CheckResult::fail("test2", "bad", "fix"));
        assert!(!report.is_ok());
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_missing_checksums_fail() {
        let dir = tempdir().unwrap();
        let config = GeneratorConfig::for_tests(dir.path());
        let results = check_checksums(&config);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.passed));
    }

    #[test]
    fn test_cache_status() {
        let dir = tempdir().unwrap();
        let mut config = GeneratorConfig::for_tests(dir.path());
        let (host, _, linker) = artifact::toolchain_descriptors(&config);
        std::fs::create_dir_all(&config.paths.artifacts_cache).unwrap();
        std::fs::write(&host.local_path, b"host").unwrap();
        std::fs::write(&linker.local_path, b"lld").unwrap();
        config.checksums = Checksums::from_entries([
            (
                host.remote_file_name().to_string(),
                crate::cache::sha256_file(&host.local_path).unwrap(),
            ),
            (linker.remote_file_name().to_string(), "0".repeat(64)),
        ]);

        let status = cache_status(&config);
        let states: Vec<_> = status
            .entries
            .iter()
            .map(|e| (e.id.as_str(), e.state.clone()))
            .collect();
        assert_eq!(
            states,
            vec![
                ("host_swift", EntryState::Valid),
                ("target_swift", EntryState::Missing),
                ("host_lld", EntryState::Invalid("checksum mismatch".into())),
            ]
        );
        assert_eq!(status.package_index.as_ref().map(|(_, cached)| *cached), Some(false));
        assert!(!status.is_complete());
    }

    #[test]
    fn test_probe_urls_include_mirror() {
        let dir = tempdir().unwrap();
        let config = GeneratorConfig::for_tests(dir.path());
        let urls = probe_urls(&config);
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[3], packages::UBUNTU_PORTS);
    }
}
