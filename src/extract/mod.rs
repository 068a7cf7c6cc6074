//! Bundle assembly.
//!
//! Unpacks validated artifacts into the bundle in a fixed order:
//!
//! ```text
//! 1. Host toolchain      host_swift.tar.gz -> swift.xctoolchain/
//! 2. Target sysroot      OS packages (dpkg-deb -x) or container copy -> <dist>.sdk/
//! 3. Target toolchain    usr/lib/swift{,_static}/ only -> <dist>.sdk/
//! 4. Linker              bin/lld -> swift.xctoolchain/usr/bin/ld.lld
//! ```
//!
//! Everything here is blocking; the pipeline runs it on a blocking task.

pub mod archive;
pub mod container;

use std::fs;
use std::path::Path;

use crate::config::{GeneratorConfig, TargetSource};
use crate::error::{at, Result};
use crate::fetch::ValidatedArtifacts;
use crate::process::Cmd;

/// Entries of the target Swift archive that belong in the SDK.
pub const TARGET_RUNTIME_PREFIXES: &[&str] = &["usr/lib/swift", "usr/lib/swift_static"];

/// One completed assembly step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyStep {
    HostToolchain,
    OsPackages { count: usize },
    ContainerSysroot { image: String },
    TargetToolchain,
    Linker,
}

/// The bundle tree after assembly. Only [`assemble`] produces one.
#[derive(Debug, Clone)]
pub struct AssembledTree {
    steps: Vec<AssemblyStep>,
}

impl AssembledTree {
    /// Steps in the order they ran.
    pub fn steps(&self) -> &[AssemblyStep] {
        &self.steps
    }
}

/// External programs assembly runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTools {
    pub dpkg_deb: String,
    pub container_runtime: String,
}

impl Default for HostTools {
    fn default() -> Self {
        Self {
            dpkg_deb: "dpkg-deb".to_string(),
            container_runtime: "docker".to_string(),
        }
    }
}

/// Unpack one `.deb` into the sysroot.
fn unpack_deb(dpkg_deb: &str, deb: &Path, sdk_dir: &Path) -> Result<()> {
    Cmd::new(dpkg_deb)
        .arg("-x")
        .arg_path(deb)
        .arg_path(sdk_dir)
        .error_msg("failed to unpack package")
        .run()?;
    Ok(())
}

/// Assemble the toolchain and SDK trees from validated artifacts.
pub fn assemble(config: &GeneratorConfig, validated: &ValidatedArtifacts) -> Result<AssembledTree> {
    assemble_with(config, validated, &HostTools::default())
}

/// [`assemble`] with explicit external programs.
pub fn assemble_with(
    config: &GeneratorConfig,
    validated: &ValidatedArtifacts,
    tools: &HostTools,
) -> Result<AssembledTree> {
    let paths = &config.paths;
    let artifacts = validated.artifacts();
    let mut steps = Vec::new();

    fs::create_dir_all(&paths.toolchain_dir).map_err(at(&paths.toolchain_dir))?;
    fs::create_dir_all(&paths.sdk_dir).map_err(at(&paths.sdk_dir))?;

    println!("Unpacking host toolchain...");
    let host = &artifacts.host_toolchain().local_path;
    let count = archive::extract(host, &paths.toolchain_dir, 1, &[])?;
    tracing::debug!(
        entries = count,
        dest = %paths.toolchain_dir.display(),
        "host toolchain unpacked"
    );
    steps.push(AssemblyStep::HostToolchain);

    match &config.target_source {
        TargetSource::Download => {
            let packages = artifacts.os_packages();
            if !packages.is_empty() {
                println!("Unpacking {} OS packages...", packages.len());
                for package in packages {
                    tracing::debug!(package = %package.id, "unpacking");
                    unpack_deb(&tools.dpkg_deb, &package.local_path, &paths.sdk_dir)?;
                }
                steps.push(AssemblyStep::OsPackages {
                    count: packages.len(),
                });
            }
        }
        TargetSource::Container { image } => {
            println!("Copying sysroot from {}...", image);
            container::copy_sysroot(
                &tools.container_runtime,
                image,
                config.versions.target.cpu,
                &paths.sdk_dir,
            )?;
            steps.push(AssemblyStep::ContainerSysroot {
                image: image.clone(),
            });
        }
    }

    if let Some(target) = artifacts.target_toolchain() {
        println!("Unpacking target Swift runtime...");
        let count =
            archive::extract(&target.local_path, &paths.sdk_dir, 1, TARGET_RUNTIME_PREFIXES)?;
        tracing::debug!(
            entries = count,
            dest = %paths.sdk_dir.display(),
            "target runtime unpacked"
        );
        steps.push(AssemblyStep::TargetToolchain);
    }

    println!("Installing ld.lld...");
    archive::extract_member(
        &artifacts.linker().local_path,
        1,
        "bin/lld",
        &paths.toolchain_bin_dir.join("ld.lld"),
    )?;
    steps.push(AssemblyStep::Linker);

    Ok(AssembledTree { steps })
}
