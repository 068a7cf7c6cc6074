//! Where the upstream artifacts live.
//!
//! URL and file-name conventions for swift.org toolchain archives, LLVM
//! release archives and the official Swift container images.

use crate::config::{Cpu, LinuxDistribution, UbuntuRelease, VersionsConfiguration};

pub const SWIFT_DOWNLOAD_BASE: &str = "https://download.swift.org";
pub const LLVM_RELEASES_BASE: &str = "https://github.com/llvm/llvm-project/releases/download";

/// Platform directory and file suffix used by swift.org for a distribution/CPU pair.
///
/// `(ubuntu2204-aarch64, ubuntu22.04-aarch64)`
pub fn swift_platform(distribution: LinuxDistribution, cpu: Cpu) -> (String, String) {
    let (dir, suffix) = match distribution {
        LinuxDistribution::Ubuntu(UbuntuRelease::Focal) => ("ubuntu2004", "ubuntu20.04"),
        LinuxDistribution::Ubuntu(UbuntuRelease::Jammy) => ("ubuntu2204", "ubuntu22.04"),
        LinuxDistribution::RhelUbi9 => ("ubi9", "ubi9"),
    };
    match cpu {
        Cpu::X86_64 => (dir.to_string(), suffix.to_string()),
        Cpu::Aarch64 => (format!("{}-aarch64", dir), format!("{}-aarch64", suffix)),
    }
}

/// `swift-5.9.2-RELEASE-ubuntu22.04-aarch64.tar.gz`
pub fn swift_archive_name(versions: &VersionsConfiguration, cpu: Cpu) -> String {
    let (_, suffix) = swift_platform(versions.distribution, cpu);
    format!("swift-{}-{}.tar.gz", versions.swift_version, suffix)
}

pub fn swift_archive_url(versions: &VersionsConfiguration, cpu: Cpu) -> String {
    let (dir, _) = swift_platform(versions.distribution, cpu);
    format!(
        "{}/{}/{}/swift-{}/{}",
        SWIFT_DOWNLOAD_BASE,
        versions.swift_branch(),
        dir,
        versions.swift_version,
        swift_archive_name(versions, cpu)
    )
}

/// LLVM release archive containing `bin/lld` for the host.
pub fn lld_archive_name(versions: &VersionsConfiguration) -> String {
    let platform = match versions.host.cpu {
        Cpu::X86_64 => "x86_64-linux-gnu-ubuntu-22.04",
        Cpu::Aarch64 => "aarch64-linux-gnu",
    };
    format!("clang+llvm-{}-{}.tar.xz", versions.lld_version, platform)
}

pub fn lld_archive_url(versions: &VersionsConfiguration) -> String {
    format!(
        "{}/llvmorg-{}/{}",
        LLVM_RELEASES_BASE,
        versions.lld_version,
        lld_archive_name(versions)
    )
}

/// Default image for `--with-docker`, e.g. `swift:5.9.2-jammy`.
pub fn container_image(versions: &VersionsConfiguration) -> String {
    let tag = match versions.distribution {
        LinuxDistribution::Ubuntu(release) => release.codename().to_string(),
        LinuxDistribution::RhelUbi9 => "rhel-ubi9".to_string(),
    };
    format!("swift:{}-{}", versions.swift_base_version(), tag)
}
