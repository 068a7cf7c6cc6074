//! Swift SDK Generator CLI
//!
//! Builds a Swift cross-compilation SDK bundle for a Linux target: host
//! toolchain, target sysroot and Swift runtime, and LLD.
//!
//! # Usage
//!
//! ```bash
//! # Check host tools, disk space, network and cache
//! sdkgen preflight
//!
//! # Show configuration and cache status
//! sdkgen status
//!
//! # Generate an aarch64 Ubuntu 22.04 bundle
//! sdkgen generate --target aarch64-unknown-linux-gnu
//!
//! # Take the sysroot from a container image instead
//! sdkgen generate --with-docker --linux-distribution-name rhel --linux-distribution-version ubi9
//! ```
//!
//! # Acquisition modes
//!
//! | Mode | Target runtime | Sysroot |
//! |------|----------------|---------|
//! | Download | target Swift tarball | Ubuntu `.deb` packages |
//! | Container | from the image | `docker cp` from the image |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sdkgen::config::{self, GeneratorConfig, GeneratorOptions, TargetSource};
use sdkgen::fetch::http::HttpClient;
use sdkgen::preflight::{self, PreflightChecker};

#[derive(Parser)]
#[command(name = "sdkgen")]
#[command(author, version, about = "Swift cross-compilation SDK generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, assemble and describe an SDK bundle
    Generate(GeneratorArgs),

    /// Check host prerequisites without generating anything
    Preflight(GeneratorArgs),

    /// Show configuration, cache and bundle status
    Status(GeneratorArgs),
}

#[derive(Args, Debug)]
struct GeneratorArgs {
    /// Target triple
    #[arg(long, default_value = config::DEFAULT_TARGET)]
    target: String,

    /// Host triple (detected when omitted)
    #[arg(long)]
    host: Option<String>,

    /// Swift release tag
    #[arg(long, default_value = config::DEFAULT_SWIFT_VERSION)]
    swift_version: String,

    /// LLVM release providing lld
    #[arg(long, default_value = config::DEFAULT_LLD_VERSION)]
    lld_version: String,

    /// `ubuntu` or `rhel`
    #[arg(long, default_value = "ubuntu")]
    linux_distribution_name: String,

    /// `20.04`, `22.04` or `ubi9`
    #[arg(long, default_value = "22.04")]
    linux_distribution_version: String,

    /// Copy the sysroot out of a Swift container image
    #[arg(long)]
    with_docker: bool,

    /// Container image to copy from (implies --with-docker)
    #[arg(long)]
    from_container_image: Option<String>,

    /// Remove the SDK and toolchain directories before assembly
    #[arg(long)]
    generate_from_scratch: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Artifacts cache directory
    #[arg(long, env = "SDKGEN_ARTIFACTS_CACHE", default_value = "Artifacts")]
    cache_dir: PathBuf,

    /// Directory the bundle is written to
    #[arg(long, default_value = "Bundles")]
    bundles_dir: PathBuf,

    /// JSON file of expected SHA-256 digests by file name
    #[arg(long, default_value = config::DEFAULT_CHECKSUMS_FILE)]
    checksums: PathBuf,

    /// Per-artifact timeout in seconds for validation and download
    #[arg(long)]
    artifact_timeout: Option<u64>,
}

impl GeneratorArgs {
    fn into_config(self) -> Result<GeneratorConfig> {
        let options = GeneratorOptions {
            target: self.target,
            host: self.host,
            swift_version: self.swift_version,
            lld_version: self.lld_version,
            distribution_name: self.linux_distribution_name,
            distribution_version: self.linux_distribution_version,
            with_docker: self.with_docker,
            from_container_image: self.from_container_image,
            generate_from_scratch: self.generate_from_scratch,
            artifacts_cache: self.cache_dir,
            bundles_dir: self.bundles_dir,
            checksums: self.checksums,
            artifact_timeout: self.artifact_timeout.map(Duration::from_secs),
        };
        Ok(GeneratorConfig::resolve(options)?)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => cmd_generate(args).await,
        Commands::Preflight(args) => cmd_preflight(args).await,
        Commands::Status(args) => cmd_status(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn cmd_generate(args: GeneratorArgs) -> Result<()> {
    use std::time::Instant;

    init_tracing(args.verbose);
    let config = args.into_config()?;
    let start = Instant::now();

    println!("=== Swift SDK Generation ===\n");
    println!("  Swift:   {}", config.versions.swift_version);
    println!("  Target:  {} ({})", config.versions.target, config.versions.distribution);
    println!("  Host:    {}", config.versions.host);
    println!();

    let summary = sdkgen::pipeline::generate(&config).await?;
    tracing::debug!(?summary, "generation finished");

    let total = start.elapsed().as_secs_f64();
    if total >= 60.0 {
        println!("\n=== Generation Complete ({:.1}m) ===", total / 60.0);
    } else {
        println!("\n=== Generation Complete ({:.1}s) ===", total);
    }
    println!(
        "  Downloaded: {}, reused: {}",
        summary.fetch.downloaded.len(),
        summary.fetch.reused.len()
    );
    println!("  Bundle: {}", config.paths.bundle.display());
    println!("\nInstall with:");
    println!("  swift experimental-sdk install {}", config.paths.bundle.display());
    println!("\nThen build with:");
    println!("  swift build --experimental-swift-sdk {}", config.artifact_id());

    Ok(())
}

async fn cmd_preflight(args: GeneratorArgs) -> Result<()> {
    init_tracing(args.verbose);
    let config = args.into_config()?;
    let client = HttpClient::new()?;

    let report = PreflightChecker::new(config, client).run_all().await;
    report.print_summary();

    if !report.is_ok() {
        anyhow::bail!("{} preflight check(s) failed", report.errors().len());
    }
    Ok(())
}

fn cmd_status(args: GeneratorArgs) -> Result<()> {
    init_tracing(args.verbose);
    let config = args.into_config()?;
    let paths = &config.paths;

    println!("Swift SDK Generator Status");
    println!("==========================");
    println!();
    println!("Configuration:");
    println!("  Swift:        {}", config.versions.swift_version);
    println!("  LLD:          {}", config.versions.lld_version);
    println!("  Distribution: {}", config.versions.distribution);
    println!("  Host:         {}", config.versions.host);
    println!("  Target:       {}", config.versions.target);
    match &config.target_source {
        TargetSource::Download => println!("  Source:       download"),
        TargetSource::Container { image } => println!("  Source:       container {}", image),
    }
    println!();
    println!("Artifact id:    {}", config.artifact_id());
    println!("Cache:          {}", paths.artifacts_cache.display());
    println!("Checksums:      {}", config.checksums.source.display());
    println!();

    println!("Artifacts:");
    let status = preflight::cache_status(&config);
    status.print();
    println!();

    println!("Bundle:");
    if paths.bundle_manifest_path().exists() {
        println!("  GENERATED at {}", paths.bundle.display());
    } else if paths.bundle.exists() {
        println!("  INCOMPLETE at {} (no info.json)", paths.bundle.display());
    } else {
        println!("  NOT GENERATED");
    }
    println!();

    println!("Next steps:");
    if !paths.bundle_manifest_path().exists() {
        if !status.is_complete() {
            println!("  1. Run 'sdkgen preflight' to check prerequisites");
            println!("  2. Run 'sdkgen generate' to download and assemble");
        } else {
            println!("  1. Run 'sdkgen generate' (all artifacts cached)");
        }
    } else {
        println!("  swift experimental-sdk install {}", paths.bundle.display());
    }

    Ok(())
}
