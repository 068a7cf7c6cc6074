//! Bundle descriptors.
//!
//! Writes `toolset.json` and `swift-sdk.json` next to the SDK and
//! `info.json` at the bundle root. All paths inside the descriptors are
//! relative, so the bundle can be moved or installed anywhere.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::GeneratorConfig;
use crate::error::{at, GeneratorError, Result};
use crate::patch::PatchedTree;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Toolset {
    schema_version: &'static str,
    root_path: String,
    swift_compiler: ToolProperties,
    cxx_compiler: ToolProperties,
    linker: ToolProperties,
    librarian: ToolProperties,
}

#[derive(Debug, Default, Serialize)]
struct ToolProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(rename = "extraCLIOptions", skip_serializing_if = "Vec::is_empty")]
    extra_cli_options: Vec<String>,
}

impl ToolProperties {
    fn options(options: &[&str]) -> Self {
        Self {
            path: None,
            extra_cli_options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    fn path(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            extra_cli_options: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwiftSdk {
    schema_version: &'static str,
    target_triples: BTreeMap<String, TargetTriple>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetTriple {
    sdk_root_path: String,
    swift_resources_path: String,
    swift_static_resources_path: String,
    toolset_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleInfo {
    schema_version: &'static str,
    artifacts: BTreeMap<String, BundleArtifact>,
}

#[derive(Debug, Serialize)]
struct BundleArtifact {
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
    variants: Vec<Variant>,
}

#[derive(Debug, Serialize)]
struct Variant {
    path: String,
}

/// Where the three descriptors were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub toolset: PathBuf,
    pub swift_sdk: PathBuf,
    pub bundle_info: PathBuf,
}

impl ManifestPaths {
    pub fn all(&self) -> [&Path; 3] {
        [
            self.toolset.as_path(),
            self.swift_sdk.as_path(),
            self.bundle_info.as_path(),
        ]
    }
}

fn to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `path` relative to `base`, or `path` itself when no relative form exists.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value).map_err(|source| GeneratorError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(at(parent))?;
    }
    fs::write(path, json).map_err(at(path))?;
    tracing::debug!(path = %path.display(), "wrote descriptor");
    Ok(())
}

fn toolset(config: &GeneratorConfig) -> Toolset {
    let paths = &config.paths;
    Toolset {
        schema_version: "1.0",
        root_path: to_string(&relative_to(&paths.toolchain_bin_dir, &paths.sdk_root)),
        swift_compiler: ToolProperties::options(&[
            "-use-ld=lld",
            "-Xlinker",
            "-R/usr/lib/swift/linux/",
        ]),
        cxx_compiler: ToolProperties::options(&["-lstdc++"]),
        linker: ToolProperties::path("ld.lld"),
        librarian: ToolProperties::path("llvm-ar"),
    }
}

fn swift_sdk(config: &GeneratorConfig) -> SwiftSdk {
    let paths = &config.paths;
    let sdk = relative_to(&paths.sdk_dir, &paths.sdk_root);
    let triple = TargetTriple {
        sdk_root_path: to_string(&sdk),
        swift_resources_path: to_string(&sdk.join("usr/lib/swift")),
        swift_static_resources_path: to_string(&sdk.join("usr/lib/swift_static")),
        toolset_paths: vec!["toolset.json".to_string()],
    };
    SwiftSdk {
        schema_version: "4.0",
        target_triples: BTreeMap::from([(config.versions.target.to_string(), triple)]),
    }
}

fn bundle_info(config: &GeneratorConfig) -> BundleInfo {
    let id = config.artifact_id();
    let variant = Variant {
        path: format!("{}/{}", id, config.versions.target),
    };
    BundleInfo {
        schema_version: "1.0",
        artifacts: BTreeMap::from([(
            id,
            BundleArtifact {
                kind: "swiftSDK",
                version: "0.0.1",
                variants: vec![variant],
            },
        )]),
    }
}

/// Write all descriptors for a patched tree.
pub fn emit(config: &GeneratorConfig, _tree: &PatchedTree) -> Result<ManifestPaths> {
    let paths = &config.paths;
    let manifests = ManifestPaths {
        toolset: paths.toolset_path(),
        swift_sdk: paths.swift_sdk_path(),
        bundle_info: paths.bundle_manifest_path(),
    };

    write_json(&manifests.toolset, &toolset(config))?;
    write_json(&manifests.swift_sdk, &swift_sdk(config))?;
    write_json(&manifests.bundle_info, &bundle_info(config))?;

    Ok(manifests)
}
