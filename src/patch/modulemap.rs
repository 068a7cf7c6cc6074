//! `glibc.modulemap` fix-up.
//!
//! The module map shipped with a Linux Swift toolchain names headers by
//! absolute path (`header "/usr/include/stdio.h"`). In the SDK those paths
//! must resolve inside the sysroot, five levels above the module map, and
//! any multiarch directory must be the target's.

use std::fs;
use std::path::Path;

use crate::config::Cpu;
use crate::error::{at, ConfigError, Result};

/// From `<sdk>/usr/lib/swift/linux/<arch>/` back to `<sdk>/`.
const SYSROOT_FROM_MODULEMAP: &str = "../../../../../";

const ALL_CPUS: &[Cpu] = &[Cpu::X86_64, Cpu::Aarch64];

/// Turn `header "//usr/include/x"` into `header "../../../../../usr/include/x"`.
fn relativize_headers(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(pos) = rest.find("header") {
        let (before, from_keyword) = rest.split_at(pos);
        out.push_str(before);
        out.push_str("header");
        let after_keyword = &from_keyword["header".len()..];

        let trimmed = after_keyword.trim_start();
        let whitespace = &after_keyword[..after_keyword.len() - trimmed.len()];
        let rewritten = trimmed.strip_prefix('"').and_then(|quoted| {
            let path = quoted.trim_start_matches('/');
            let slashes = quoted.len() - path.len();
            (slashes > 0 && path.starts_with("usr/include")).then_some(path)
        });

        match rewritten {
            Some(path) if !whitespace.is_empty() => {
                out.push_str(whitespace);
                out.push('"');
                out.push_str(SYSROOT_FROM_MODULEMAP);
                rest = path;
            }
            _ => rest = after_keyword,
        }
    }
    out.push_str(rest);
    out
}

/// Rewrite the module map for `target`. Returns whether the file changed.
pub fn fix_glibc_modulemap(path: &Path, target: Cpu) -> Result<bool> {
    if !path.is_file() {
        return Err(ConfigError::MissingPatchTarget(path.to_path_buf()).into());
    }

    let original = fs::read_to_string(path).map_err(at(path))?;
    let mut content = relativize_headers(&original);
    for other in ALL_CPUS.iter().filter(|&&cpu| cpu != target) {
        content = content.replace(
            &format!("{}-linux-gnu", other.linux_name()),
            &format!("{}-linux-gnu", target.linux_name()),
        );
    }

    if content == original {
        return Ok(false);
    }
    fs::write(path, content).map_err(at(path))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeneratorError;
    use tempfile::tempdir;

    const SHIPPED: &str = r#"module SwiftGlibc [system] {
    link "m"
    header "/usr/include/x86_64-linux-gnu/sys/ioctl.h"
    header "///usr/include/stdio.h"
    header "SwiftGlibc.h"
    export *
}
"#;

    #[test]
    fn test_relativize_headers() {
        let out = relativize_headers(SHIPPED);
        let ioctl = r#"header "../../../../../usr/include/x86_64-linux-gnu/sys/ioctl.h""#;
        assert!(out.contains(ioctl));
        assert!(out.contains(r#"header "../../../../../usr/include/stdio.h""#));
        assert!(out.contains(r#"header "SwiftGlibc.h""#));
        assert!(out.contains(r#"link "m""#));
    }

    #[test]
    fn test_fix_for_aarch64() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("glibc.modulemap");
        fs::write(&path, SHIPPED).unwrap();

        assert!(fix_glibc_modulemap(&path, Cpu::Aarch64).unwrap());
        let patched = fs::read_to_string(&path).unwrap();
        let ioctl = r#"header "../../../../../usr/include/aarch64-linux-gnu/sys/ioctl.h""#;
        assert!(patched.contains(ioctl));
        assert!(!patched.contains("x86_64-linux-gnu"));
        assert!(!patched.contains(r#""/usr/include"#));

        assert!(!fix_glibc_modulemap(&path, Cpu::Aarch64).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), patched);
    }

    #[test]
    fn test_missing_modulemap_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("glibc.modulemap");
        let err = fix_glibc_modulemap(&path, Cpu::X86_64).unwrap_err();
        assert!(matches!(err, GeneratorError::Config(ConfigError::MissingPatchTarget(_))));
    }
}
