//! Disk space check.
//!
//! Verifies there is room for the artifacts cache and the unpacked bundle.

use super::CheckResult;
use crate::process::Cmd;
use std::path::Path;

/// Minimum required disk space in bytes (4 GiB).
///
/// Breakdown:
/// - Host and target Swift archives: ~1.5 GB
/// - LLVM release archive: ~1 GB
/// - Unpacked toolchain and sysroot: ~1.5 GB
pub const MIN_DISK_SPACE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Closest ancestor of `path` that exists; `df` fails on missing paths.
fn existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"))
}

/// Available bytes on the filesystem holding `path`.
pub fn available_space(path: &Path) -> Option<u64> {
    Cmd::new("df")
        .args(["--output=avail", "-B1"])
        .arg_path(existing_ancestor(path))
        .allow_fail()
        .run()
        .ok()
        .filter(|r| r.success())
        .and_then(|r| {
            r.stdout
                .lines()
                .nth(1)
                .and_then(|line| line.trim().parse::<u64>().ok())
        })
}

/// Check that sufficient disk space is available under `path`.
pub fn check_disk_space(path: &Path) -> CheckResult {
    let required_gb = MIN_DISK_SPACE_BYTES as f64 / (1024.0 * 1024.0 * 1024.0);
    match available_space(path) {
        Some(available) => {
            let available_gb = available as f64 / (1024.0 * 1024.0 * 1024.0);
            if available >= MIN_DISK_SPACE_BYTES {
                CheckResult::pass(
                    "Disk space",
                    format!("{:.1} GB available (need {:.1} GB)", available_gb, required_gb),
                )
            } else {
                CheckResult::fail(
                    "Disk space",
                    format!(
                        "Only {:.1} GB available, need {:.1} GB",
                        available_gb, required_gb
                    ),
                    "Free up disk space or pass --cache-dir/--bundles-dir on a larger volume",
                )
            }
        }
        None => CheckResult::fail(
            "Disk space",
            "Failed to check available disk space",
            "Ensure the df command is available",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("Bundles/x.artifactbundle");
        assert_eq!(existing_ancestor(&missing), dir.path());
    }

    #[test]
    fn test_available_space_for_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let space = available_space(&dir.path().join("not/yet/created"));
        assert!(space.is_some_and(|bytes| bytes > 0));
    }

    #[test]
    fn test_check_disk_space_names_check() {
        let result = check_disk_space(Path::new("."));
        assert_eq!(result.name, "Disk space");
    }
}
