//! Post-assembly fix-ups.
//!
//! - `symlinks` - absolute links become relative
//! - `modulemap` - `glibc.modulemap` header paths and multiarch dirs
//! - `tools` - `swift-autolink-extract` link
//!
//! Each step is idempotent; running [`patch`] on an already patched tree
//! changes nothing.

pub mod modulemap;
pub mod symlinks;
pub mod tools;

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::extract::AssembledTree;
use symlinks::LinkScope;

/// Summary of what patching changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub sdk_links_rewritten: usize,
    pub toolchain_links_rewritten: usize,
    /// Toolchain links pointing outside the bundle, left as they were.
    pub toolchain_links_outside: usize,
    pub modulemap_changed: bool,
    pub autolink_extract_created: bool,
}

/// The bundle tree after patching. Only [`patch`] produces one.
#[derive(Debug, Clone)]
pub struct PatchedTree {
    assembled: AssembledTree,
    report: PatchReport,
}

impl PatchedTree {
    pub fn assembled(&self) -> &AssembledTree {
        &self.assembled
    }

    pub fn report(&self) -> &PatchReport {
        &self.report
    }
}

/// Apply every fix-up to an assembled tree.
pub fn patch(config: &GeneratorConfig, assembled: AssembledTree) -> Result<PatchedTree> {
    let paths = &config.paths;

    println!("Rewriting absolute symlinks...");
    let sdk = symlinks::rewrite_absolute_symlinks(&paths.sdk_dir, LinkScope::Sysroot)?;
    let toolchain = symlinks::rewrite_absolute_symlinks(&paths.toolchain_dir, LinkScope::Tree)?;
    for link in &toolchain.outside {
        println!("  Warning: {} points outside the bundle", link.display());
    }

    let modulemap = paths.glibc_modulemap_path(config.versions.target.cpu);
    let modulemap_changed = modulemap::fix_glibc_modulemap(&modulemap, config.versions.target.cpu)?;
    if !modulemap_changed {
        println!("  [SKIP] {} already patched", modulemap.display());
    }

    let autolink_extract_created = tools::ensure_autolink_extract(&paths.toolchain_bin_dir)?;

    Ok(PatchedTree {
        assembled,
        report: PatchReport {
            sdk_links_rewritten: sdk.rewritten,
            toolchain_links_rewritten: toolchain.rewritten,
            toolchain_links_outside: toolchain.outside.len(),
            modulemap_changed,
            autolink_extract_created,
        },
    })
}
