//! Missing tool links in the toolchain.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use crate::error::{at, Result};

/// Some Linux toolchains ship without `swift-autolink-extract`, which is
/// just the `swift` driver under another name.
pub const AUTOLINK_EXTRACT: &str = "swift-autolink-extract";

/// Create `<bin_dir>/swift-autolink-extract -> swift` unless something
/// (even a dangling link) is already there. Returns whether it was created.
pub fn ensure_autolink_extract(bin_dir: &Path) -> Result<bool> {
    let link = bin_dir.join(AUTOLINK_EXTRACT);
    if fs::symlink_metadata(&link).is_ok() {
        return Ok(false);
    }

    fs::create_dir_all(bin_dir).map_err(at(bin_dir))?;
    symlink("swift", &link).map_err(at(&link))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_creates_link_once() {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("usr/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("swift"), b"driver").unwrap();

        assert!(ensure_autolink_extract(&bin).unwrap());
        assert!(!ensure_autolink_extract(&bin).unwrap());
        assert_eq!(fs::read_link(bin.join(AUTOLINK_EXTRACT)).unwrap(), PathBuf::from("swift"));
    }

    #[test]
    fn test_existing_file_is_kept() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(AUTOLINK_EXTRACT), b"real tool").unwrap();

        assert!(!ensure_autolink_extract(dir.path()).unwrap());
        assert_eq!(fs::read(dir.path().join(AUTOLINK_EXTRACT)).unwrap(), b"real tool");
    }

    #[test]
    fn test_dangling_link_counts_as_existing() {
        let dir = tempdir().unwrap();
        symlink("nowhere", dir.path().join(AUTOLINK_EXTRACT)).unwrap();

        assert!(!ensure_autolink_extract(dir.path()).unwrap());
        assert_eq!(
            fs::read_link(dir.path().join(AUTOLINK_EXTRACT)).unwrap(),
            PathBuf::from("nowhere")
        );
    }
}
