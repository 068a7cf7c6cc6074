//! End-to-end bundle generation.
//!
//! ```text
//! resolve -> validate cache -> fetch (if needed) -> prepare
//!         -> assemble -> patch -> emit
//! ```
//!
//! Fetching is the only concurrent phase. Everything after it runs on one
//! blocking task, in order.

use std::fs;
use std::path::Path;

use crate::artifact::{self, DownloadableArtifacts};
use crate::cache;
use crate::config::GeneratorConfig;
use crate::error::{at, GeneratorError, Result};
use crate::extract::{self, AssemblyStep};
use crate::fetch::http::HttpClient;
use crate::fetch::{self, FetchReport, ValidatedArtifacts};
use crate::manifest::{self, ManifestPaths};
use crate::patch::{self, PatchReport};
use crate::Timer;

/// What a generation run did.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub fetch: FetchReport,
    pub steps: Vec<AssemblyStep>,
    pub patch: PatchReport,
    pub manifests: ManifestPaths,
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        println!("  Removing {}", path.display());
        fs::remove_dir_all(path).map_err(at(path))?;
    }
    Ok(())
}

/// Create the bundle directories, wiping the SDK and toolchain first when
/// generating from scratch.
pub fn prepare(config: &GeneratorConfig) -> Result<()> {
    let paths = &config.paths;
    if config.generate_from_scratch {
        remove_dir_if_exists(&paths.sdk_dir)?;
        remove_dir_if_exists(&paths.toolchain_dir)?;
    }
    for dir in [&paths.artifacts_cache, &paths.sdk_dir, &paths.toolchain_bin_dir] {
        fs::create_dir_all(dir).map_err(at(dir))?;
    }
    Ok(())
}

/// Validate or fetch `artifacts`, then assemble, patch and describe the bundle.
pub async fn run(
    config: &GeneratorConfig,
    client: &HttpClient,
    artifacts: DownloadableArtifacts,
) -> Result<GenerationSummary> {
    let cache = &config.paths.artifacts_cache;
    fs::create_dir_all(cache).map_err(at(cache))?;

    println!("Checking cached artifacts...");
    let t = Timer::start("Cache check");
    let cache_valid = cache::is_cache_valid(&artifacts, config.artifact_timeout).await?;
    t.finish();

    let (validated, fetch_report) = if cache_valid {
        println!("[SKIP] All {} artifacts cached and verified", artifacts.len());
        let report = FetchReport {
            downloaded: Vec::new(),
            reused: artifacts.iter().map(|a| a.id.clone()).collect(),
        };
        (ValidatedArtifacts::from_valid_cache(artifacts), report)
    } else {
        println!("\nDownloading artifacts...");
        let t = Timer::start("Download");
        let fetched = fetch::ensure_artifacts(client, artifacts, config.artifact_timeout).await?;
        t.finish();
        fetched
    };

    prepare(config)?;

    let stage_config = config.clone();
    let (steps, patch, manifests) = tokio::task::spawn_blocking(move || {
        let config = &stage_config;

        println!("\nAssembling bundle...");
        let t = Timer::start("Assemble");
        let assembled = extract::assemble(config, &validated)?;
        t.finish();

        println!("\nPatching bundle...");
        let t = Timer::start("Patch");
        let patched = patch::patch(config, assembled)?;
        t.finish();

        println!("\nWriting descriptors...");
        let manifests = manifest::emit(config, &patched)?;

        Ok::<_, GeneratorError>((
            patched.assembled().steps().to_vec(),
            patched.report().clone(),
            manifests,
        ))
    })
    .await??;

    Ok(GenerationSummary {
        fetch: fetch_report,
        steps,
        patch,
        manifests,
    })
}

/// Resolve the artifact set for `config` and generate the bundle.
pub async fn generate(config: &GeneratorConfig) -> Result<GenerationSummary> {
    let client = HttpClient::new().map_err(GeneratorError::HttpClient)?;

    println!("Resolving artifacts for {}...", config.artifact_id());
    let artifacts = artifact::resolve(config, &client).await?;
    tracing::info!(count = artifacts.len(), "artifacts resolved");

    run(config, &client, artifacts).await
}
