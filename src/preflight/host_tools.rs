//! Host tool validation.
//!
//! Checks that the external tools needed by the selected acquisition mode
//! are installed and executable.

use super::CheckResult;
use crate::config::TargetSource;
use crate::process::which;

/// Tool, purpose and install suggestion for download mode.
const DOWNLOAD_TOOLS: &[(&str, &str, &str)] = &[(
    "dpkg-deb",
    "Unpack Ubuntu packages into the sysroot",
    "sudo apt install dpkg (or dnf install dpkg)",
)];

/// Tool, purpose and install suggestion for container mode.
const CONTAINER_TOOLS: &[(&str, &str, &str)] = &[(
    "docker",
    "Copy the sysroot out of a Swift container image",
    "Install Docker Engine: https://docs.docker.com/engine/install/",
)];

fn required_tools(source: &TargetSource) -> &'static [(&'static str, &'static str, &'static str)] {
    match source {
        TargetSource::Download => DOWNLOAD_TOOLS,
        TargetSource::Container { .. } => CONTAINER_TOOLS,
    }
}

/// Check that all tools for `source` are installed.
pub fn check_host_tools(source: &TargetSource) -> Vec<CheckResult> {
    required_tools(source)
        .iter()
        .map(|(tool, purpose, install)| check_tool(tool, purpose, install))
        .collect()
}

fn check_tool(tool: &str, purpose: &str, install_cmd: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(
            format!("{} tool", tool),
            format!("Found at {} ({})", path.display(), purpose),
        ),
        None => CheckResult::fail(
            format!("{} tool", tool),
            format!("Not found (needed to: {})", purpose),
            install_cmd,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_follow_mode() {
        let download = check_host_tools(&TargetSource::Download);
        assert_eq!(download.len(), 1);
        assert_eq!(download[0].name, "dpkg-deb tool");

        let container = check_host_tools(&TargetSource::Container {
            image: "swift:5.9.2-jammy".into(),
        });
        assert_eq!(container[0].name, "docker tool");
    }

    #[test]
    fn test_check_tool_existing_and_missing() {
        assert!(check_tool("sh", "run scripts", "n/a").passed);
        let missing = check_tool("definitely_not_a_real_command_12345", "nothing", "n/a");
        assert!(!missing.passed);
        assert_eq!(missing.suggestion.as_deref(), Some("n/a"));
    }
}
