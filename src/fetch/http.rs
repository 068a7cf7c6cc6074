//! HTTP transport for artifact downloads.
//!
//! A shared `reqwest` client restricted to HTTP/1.1 (some artifact hosts
//! answer existence probes incorrectly over HTTP/2) with a redirect policy
//! of at most [`MAX_REDIRECTS`] hops that refuses to revisit a URL.

use reqwest::header::CONTENT_LENGTH;
use reqwest::redirect::Policy;
use reqwest::{Response, StatusCode};

/// Maximum number of redirects to follow.
pub const MAX_REDIRECTS: usize = 5;

/// Outcome of a `HEAD` probe. Never an error: callers decide what to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Available { content_length: Option<u64> },
    /// The host answered with a non-success status.
    Anomaly(StatusCode),
    Unreachable(String),
}

impl Probe {
    pub fn is_available(&self) -> bool {
        matches!(self, Probe::Available { .. })
    }
}

/// Cheaply cloneable client handle; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .http1_only()
            .redirect(redirect_policy())
            .user_agent(concat!("sdkgen/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { inner })
    }

    /// Lightweight existence check.
    pub async fn probe(&self, url: &str) -> Probe {
        match self.inner.head(url).send().await {
            Ok(response) if response.status().is_success() => Probe::Available {
                content_length: response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()),
            },
            Ok(response) => Probe::Anomaly(response.status()),
            Err(e) => Probe::Unreachable(e.to_string()),
        }
    }

    /// Start a GET request; the caller checks the status and streams the body.
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.inner.get(url).send().await
    }

    /// GET and collect the whole body, failing on a non-success status.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.get(url).await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if attempt.previous().contains(attempt.url()) {
            attempt.error("redirect cycle")
        } else {
            attempt.follow()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn redirect_to(location: String) -> ResponseTemplate {
        ResponseTemplate::new(302).insert_header("Location", location.as_str())
    }

    #[tokio::test]
    async fn test_probe_available() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/swift.tar.gz"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "1234"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let probe = client.probe(&format!("{}/swift.tar.gz", server.uri())).await;
        assert!(probe.is_available());
    }

    #[tokio::test]
    async fn test_probe_anomaly_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let probe = client.probe(&format!("{}/lld.tar.xz", server.uri())).await;
        assert_eq!(probe, Probe::Anomaly(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_follows_up_to_five_redirects() {
        let server = MockServer::start().await;
        for hop in 0..MAX_REDIRECTS {
            Mock::given(method("GET"))
                .and(path(format!("/hop{}", hop)))
                .respond_with(redirect_to(format!("{}/hop{}", server.uri(), hop + 1)))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/hop{}", MAX_REDIRECTS)))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let body = client.get_bytes(&format!("{}/hop0", server.uri())).await.unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn test_rejects_sixth_redirect() {
        let server = MockServer::start().await;
        for hop in 0..=MAX_REDIRECTS {
            Mock::given(method("GET"))
                .and(path(format!("/hop{}", hop)))
                .respond_with(redirect_to(format!("{}/hop{}", server.uri(), hop + 1)))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("/hop{}", MAX_REDIRECTS + 1)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client.get_bytes(&format!("{}/hop0", server.uri())).await.unwrap_err();
        assert!(err.is_redirect());
    }

    #[tokio::test]
    async fn test_rejects_redirect_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(redirect_to(format!("{}/b", server.uri())))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(redirect_to(format!("{}/a", server.uri())))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client.get_bytes(&format!("{}/a", server.uri())).await.unwrap_err();
        assert!(err.is_redirect());
    }
}
