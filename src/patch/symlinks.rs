//! Absolute symlink rewriting.
//!
//! Package payloads and container copies are full of links like
//! `libm.so -> /lib/aarch64-linux-gnu/libm.so.6`. Inside the bundle they
//! must point at the bundled file, so each absolute target is replaced by
//! the equivalent path relative to the link's directory.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{at, GeneratorError, Result};

/// How absolute link targets are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScope {
    /// The tree is a sysroot: `/x` means `<root>/x`.
    Sysroot,
    /// Only targets already inside the tree are rewritten.
    Tree,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    /// Links whose absolute target lies outside the tree; left unchanged.
    pub outside: Vec<PathBuf>,
}

/// Rewrite every absolute symlink under `root`.
pub fn rewrite_absolute_symlinks(root: &Path, scope: LinkScope) -> Result<RewriteReport> {
    let mut report = RewriteReport::default();
    if !root.exists() {
        return Ok(report);
    }

    let mut links = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            GeneratorError::io(&path, e.into())
        })?;
        if entry.path_is_symlink() {
            links.push(entry.into_path());
        }
    }

    for link in &links {
        let target = fs::read_link(link).map_err(at(link))?;
        if !target.is_absolute() {
            continue;
        }

        let resolved = match scope {
            LinkScope::Sysroot => root.join(target.strip_prefix("/").unwrap_or(&target)),
            LinkScope::Tree if target.starts_with(root) => target.clone(),
            LinkScope::Tree => {
                tracing::warn!(
                    link = %link.display(),
                    target = %target.display(),
                    "absolute symlink points outside the bundle"
                );
                report.outside.push(link.to_path_buf());
                continue;
            }
        };

        let link_dir = link.parent().unwrap_or(root);
        let Some(relative) = pathdiff::diff_paths(&resolved, link_dir) else {
            tracing::warn!(link = %link.display(), "no relative path to symlink target");
            continue;
        };
        fs::remove_file(link).map_err(at(link))?;
        symlink(&relative, link).map_err(at(link))?;
        tracing::debug!(link = %link.display(), target = %relative.display(), "rewrote symlink");
        report.rewritten += 1;
    }

    Ok(report)
}
