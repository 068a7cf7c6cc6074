//! Sysroot acquisition from a container image.
//!
//! Creates (never starts) a container for the target platform, copies the
//! system include and library directories out of it and removes the
//! container again, even when a copy fails.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Cpu;
use crate::error::{at, GeneratorError, Result};
use crate::process::Cmd;

/// Directories copied into the SDK, in order.
pub const SYSROOT_PATHS: &[&str] = &["/usr/include", "/usr/lib", "/lib", "/lib64"];

/// Not every image has these (e.g. `/lib64` on arm64).
const OPTIONAL_PATHS: &[&str] = &["/lib64"];

/// Copy the sysroot directories of `image` into `sdk_dir` with the
/// container `runtime` (normally `docker`).
pub fn copy_sysroot(runtime: &str, image: &str, cpu: Cpu, sdk_dir: &Path) -> Result<()> {
    let created = Cmd::new(runtime)
        .args(["create", "--platform", cpu.docker_platform()])
        .arg(image)
        .error_msg(format!("failed to create a container from {}", image))
        .run()?;
    let container = created.stdout.trim().to_string();
    tracing::debug!(container = %container, image = %image, "created container");

    let copied = copy_paths(runtime, &container, sdk_dir);

    let removed = Cmd::new(runtime)
        .args(["rm", "--force"])
        .arg(&container)
        .allow_fail()
        .run();
    match removed {
        Ok(result) if result.success() => {}
        Ok(result) => tracing::warn!(
            container = %container,
            stderr = %result.stderr.trim(),
            "failed to remove container"
        ),
        Err(e) => tracing::warn!(container = %container, error = %e, "failed to remove container"),
    }

    copied
}

/// Directory `docker cp` copies `source` into, e.g. `/usr/lib` -> `<sdk>/usr`.
fn copy_destination(sdk_dir: &Path, source: &str) -> PathBuf {
    let relative = Path::new(source.trim_start_matches('/'));
    match relative.parent() {
        Some(parent) => sdk_dir.join(parent),
        None => sdk_dir.to_path_buf(),
    }
}

fn copy_paths(runtime: &str, container: &str, sdk_dir: &Path) -> Result<()> {
    for source in SYSROOT_PATHS {
        let dest = copy_destination(sdk_dir, source);
        fs::create_dir_all(&dest).map_err(at(&dest))?;

        let cmd = Cmd::new(runtime)
            .arg("cp")
            .arg(format!("{}:{}", container, source))
            .arg_path(&dest);
        let display = cmd.display();
        let result = cmd.allow_fail().run()?;
        if result.success() {
            println!("  Copied {}", source);
        } else if OPTIONAL_PATHS.contains(source) {
            println!("  [SKIP] {} not present in image", source);
        } else {
            return Err(GeneratorError::Command {
                command: display,
                message: result.stderr.trim().to_string(),
            });
        }
    }
    Ok(())
}
