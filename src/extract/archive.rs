//! Tarball extraction.
//!
//! Compression is picked from the file name. Entries are streamed straight
//! from the decoder into the destination; nothing is buffered in memory.
//! Entries with `..`, absolute paths or nothing left after stripping are
//! skipped. Existing files are overwritten.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::EntryType;
use xz2::read::XzDecoder;

use crate::error::{at, GeneratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Xz,
    None,
}

impl Compression {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }
}

fn archive_error(path: &Path) -> impl Fn(io::Error) -> GeneratorError + '_ {
    move |source| GeneratorError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

fn open(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let compression = Compression::from_path(path).ok_or_else(|| GeneratorError::Archive {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "unrecognised archive extension"),
    })?;
    let file = BufReader::new(File::open(path).map_err(at(path))?);
    let reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::None => Box::new(file),
    };

    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);
    Ok(archive)
}

/// Entry path with `strip` leading components removed, or `None` if the
/// entry must be skipped.
fn stripped(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(strip)
    {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => fs::remove_file(path).map_err(at(path)),
        Err(_) => Ok(()),
    }
}

/// Extract `archive` into `dest`.
///
/// Only entries whose stripped path lies under one of `include` are
/// extracted; an empty `include` extracts everything. Returns the number
/// of entries written.
pub fn extract(archive: &Path, dest: &Path, strip: usize, include: &[&str]) -> Result<usize> {
    let to_archive_error = archive_error(archive);
    fs::create_dir_all(dest).map_err(at(dest))?;

    let mut tar = open(archive)?;
    let mut written = 0;
    for entry in tar.entries().map_err(&to_archive_error)? {
        let mut entry = entry.map_err(&to_archive_error)?;
        let path = entry.path().map_err(&to_archive_error)?.into_owned();
        let Some(relative) = stripped(&path, strip) else {
            tracing::debug!(entry = %path.display(), "skipping entry");
            continue;
        };
        if !include.is_empty() && !include.iter().any(|prefix| relative.starts_with(prefix)) {
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(at(parent))?;
        }

        if entry.header().entry_type() == EntryType::Link {
            let link = entry
                .link_name()
                .map_err(&to_archive_error)?
                .map(|l| l.into_owned());
            let Some(source) = link.as_deref().and_then(|l| stripped(l, strip)) else {
                tracing::debug!(entry = %path.display(), "skipping hard link");
                continue;
            };
            let source = dest.join(source);
            remove_existing(&target)?;
            if fs::hard_link(&source, &target).is_err() {
                fs::copy(&source, &target).map_err(at(&target))?;
            }
        } else {
            if !entry.header().entry_type().is_dir() {
                remove_existing(&target)?;
            }
            entry.unpack(&target).map_err(&to_archive_error)?;
        }
        written += 1;
    }

    Ok(written)
}

/// Extract the single entry `member` (after stripping) to `dest_file`.
pub fn extract_member(archive: &Path, strip: usize, member: &str, dest_file: &Path) -> Result<()> {
    let to_archive_error = archive_error(archive);
    let mut tar = open(archive)?;
    for entry in tar.entries().map_err(&to_archive_error)? {
        let mut entry = entry.map_err(&to_archive_error)?;
        let path = entry.path().map_err(&to_archive_error)?.into_owned();
        if stripped(&path, strip).as_deref() != Some(Path::new(member)) {
            continue;
        }

        if let Some(parent) = dest_file.parent() {
            fs::create_dir_all(parent).map_err(at(parent))?;
        }
        remove_existing(dest_file)?;
        entry.unpack(dest_file).map_err(&to_archive_error)?;
        return Ok(());
    }

    Err(GeneratorError::Archive {
        path: archive.to_path_buf(),
        source: io::Error::new(
            io::ErrorKind::NotFound,
            format!("archive has no entry {}", member),
        ),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// Entry of a test tarball.
    pub(crate) enum TestEntry<'a> {
        File(&'a str, &'a [u8]),
        Symlink(&'a str, &'a str),
    }

    pub(crate) fn write_tar(path: &Path, entries: &[TestEntry<'_>]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for entry in entries {
            let mut header = tar::Header::new_gnu();
            match entry {
                TestEntry::File(name, content) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(content.len() as u64);
                    header.set_mode(0o755);
                    header.set_mtime(1_700_000_000);
                    header.set_cksum();
                    builder.append_data(&mut header, name, *content).unwrap();
                }
                TestEntry::Symlink(name, target) => {
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    header.set_mtime(1_700_000_000);
                    builder.append_link(&mut header, name, target).unwrap();
                }
            }
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_compression_from_path() {
        assert_eq!(
            Compression::from_path(Path::new("a/host_swift.tar.gz")),
            Some(Compression::Gzip)
        );
        assert_eq!(Compression::from_path(Path::new("lld.tar.xz")), Some(Compression::Xz));
        assert_eq!(Compression::from_path(Path::new("x.tar")), Some(Compression::None));
        assert_eq!(Compression::from_path(Path::new("libc6.deb")), None);
    }

    #[test]
    fn test_stripped() {
        assert_eq!(
            stripped(Path::new("swift-5.9/usr/bin/swift"), 1),
            Some(PathBuf::from("usr/bin/swift"))
        );
        assert_eq!(stripped(Path::new("./swift-5.9/usr"), 1), Some(PathBuf::from("usr")));
        assert_eq!(stripped(Path::new("swift-5.9/"), 1), None);
        assert_eq!(stripped(Path::new("swift-5.9/../etc/passwd"), 1), None);
    }

    #[test]
    fn test_extract_strips_and_filters() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("target.tar");
        write_tar(
            &archive,
            &[
                TestEntry::File("swift/usr/bin/swift", b"compiler"),
                TestEntry::File("swift/usr/lib/swift/linux/libswiftCore.so", b"core"),
                TestEntry::File("swift/usr/lib/swift_static/linux/libswiftCore.a", b"static"),
                TestEntry::File("swift/usr/lib/swiftish/other", b"no"),
            ],
        );

        let dest = dir.path().join("sdk");
        let count =
            extract(&archive, &dest, 1, &["usr/lib/swift", "usr/lib/swift_static"]).unwrap();
        assert_eq!(count, 2);
        assert!(dest.join("usr/lib/swift/linux/libswiftCore.so").exists());
        assert!(dest.join("usr/lib/swift_static/linux/libswiftCore.a").exists());
        assert!(!dest.join("usr/bin/swift").exists());
        assert!(!dest.join("usr/lib/swiftish").exists());
    }

    #[test]
    fn test_extract_overwrites_and_keeps_mode() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("host.tar");
        write_tar(
            &archive,
            &[
                TestEntry::File("swift/usr/bin/swift", b"compiler"),
                TestEntry::Symlink("swift/usr/bin/swiftc", "swift"),
            ],
        );

        let dest = dir.path().join("toolchain");
        extract(&archive, &dest, 1, &[]).unwrap();
        std::fs::write(dest.join("usr/bin/swift"), b"stale").unwrap();
        extract(&archive, &dest, 1, &[]).unwrap();

        let swift = dest.join("usr/bin/swift");
        assert_eq!(std::fs::read(&swift).unwrap(), b"compiler");
        assert_ne!(std::fs::metadata(&swift).unwrap().permissions().mode() & 0o111, 0);
        assert_eq!(
            std::fs::read_link(dest.join("usr/bin/swiftc")).unwrap(),
            PathBuf::from("swift")
        );
    }

    #[test]
    fn test_extract_member() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("lld.tar");
        write_tar(
            &archive,
            &[
                TestEntry::File("clang+llvm/bin/clang", b"clang"),
                TestEntry::File("clang+llvm/bin/lld", b"lld"),
            ],
        );

        let dest = dir.path().join("bin/ld.lld");
        extract_member(&archive, 1, "bin/lld", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"lld");
        assert!(!dir.path().join("bin/clang").exists());

        let err = extract_member(&archive, 1, "bin/ld64.lld", &dest).unwrap_err();
        assert!(err.to_string().contains("bin/ld64.lld"));
    }
}
