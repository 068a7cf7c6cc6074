//! Network reachability check.
//!
//! Sends one `HEAD` probe per artifact host. Some hosts answer probes with
//! 403 or 405 while serving the file fine, so a non-success status is only
//! a warning; an unreachable host is a failure.

use super::CheckResult;
use crate::fetch::http::{HttpClient, Probe};

/// Host part of a URL, for grouping and display.
fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .host_str()
        .map(str::to_owned)
}

/// Probe the first URL of every distinct host in `urls`.
pub async fn check_network(client: &HttpClient, urls: &[String]) -> Vec<CheckResult> {
    let mut seen = Vec::new();
    let mut results = Vec::new();
    for url in urls {
        let Some(host) = host_of(url) else {
            results.push(CheckResult::fail(
                "Network",
                format!("Invalid artifact URL: {}", url),
                "Check the configured versions",
            ));
            continue;
        };
        if seen.contains(&host) {
            continue;
        }

        let name = format!("Network ({})", host);
        results.push(match client.probe(url).await {
            Probe::Available { .. } => CheckResult::pass(name, "Reachable"),
            Probe::Anomaly(status) => CheckResult::warn(
                name,
                format!(
                    "Reachable, but HEAD answered {} (download will still be attempted)",
                    status
                ),
            ),
            Probe::Unreachable(reason) => CheckResult::fail(
                name,
                format!("Unreachable: {}", reason),
                "Check your internet connection or proxy settings",
            ),
        });
        seen.push(host);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://download.swift.org/swift-5.9.2-release/x.tar.gz").as_deref(),
            Some("download.swift.org")
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[tokio::test]
    async fn test_one_probe_per_host_and_4xx_is_warning() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let urls = vec![
            format!("{}/host_swift.tar.gz", server.uri()),
            format!("{}/target_swift.tar.gz", server.uri()),
        ];
        let results = check_network(&client, &urls).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].passed);
        assert!(results[0].message.contains("403"));
    }
}
