//! Remote headless browser fetcher
//!
//! Talks to a Browserless-compatible rendering service. One fetcher (and so one remote
//! session pool) is shared by discovery and extraction for the whole run. When the
//! service stops answering, every call reports [`FetchError::Session`] so the pipeline
//! can stop the batch instead of burning attempts on healthy listings.

use super::{build_http_client, FetchError, PageFetcher, RenderedPage};
use crate::config::{BrowserConfig, HttpConfig};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};

/// Response fragments that mean the remote browser session is gone
const SESSION_MARKERS: &[&str] = &["invalid session id", "session deleted", "Target closed"];

pub struct BrowserlessFetcher {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessFetcher {
    /// Creates the fetcher and checks that the service answers
    pub async fn connect(browser: &BrowserConfig, http: &HttpConfig) -> Result<Self, FetchError> {
        let client = build_http_client(http).map_err(|e| FetchError::Session(e.to_string()))?;
        let fetcher = Self::with_client(client, &browser.endpoint, browser.token());
        fetcher.health_check().await?;
        tracing::info!("Connected to rendering service at {}", fetcher.base_url);
        Ok(fetcher)
    }

    pub fn with_client(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Builds a request to the service, passing the token as an encoded query parameter
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.token {
            Some(ref token) => request.query(&[("token", token)]),
            None => request,
        }
    }

    async fn health_check(&self) -> Result<(), FetchError> {
        let response = self
            .request(Method::GET, "/json/version")
            .send()
            .await
            .map_err(|e| FetchError::Session(format!("rendering service unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(FetchError::Session(format!(
                "rendering service health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn post(&self, path: &str, target: &str) -> Result<reqwest::Response, FetchError> {
        let body = serde_json::json!({ "url": target });

        let response = self
            .request(Method::POST, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FetchError::Session(format!("rendering service unreachable: {e}"))
                } else {
                    FetchError::from_reqwest(target, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if is_session_message(&message) {
                return Err(FetchError::Session(message));
            }
            return Err(FetchError::Status {
                url: target.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn is_session_message(message: &str) -> bool {
    SESSION_MARKERS.iter().any(|marker| message.contains(marker))
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        // JSON endpoints need no rendering
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        tracing::debug!("Rendering {}", url);
        let response = self.post("/content", url).await?;
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(RenderedPage::new(url, html))
    }

    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("Screenshot {}", url);
        let response = self.post("/screenshot", url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config() -> HttpConfig {
        HttpConfig {
            user_agent: "TestIngest/1.0".to_string(),
            timeout_secs: 5,
        }
    }

    fn browser_config(endpoint: String) -> BrowserConfig {
        BrowserConfig {
            endpoint,
            token_env: None,
        }
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Browser": "Chrome"})))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_session_markers() {
        assert!(is_session_message("Protocol error: Target closed."));
        assert!(is_session_message("invalid session id"));
        assert!(!is_session_message("navigation timeout"));
    }

    #[tokio::test]
    async fn test_connect_fails_when_service_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = BrowserlessFetcher::connect(&browser_config(server.uri()), &http_config()).await;
        assert!(matches!(result, Err(FetchError::Session(_))));
    }

    #[tokio::test]
    async fn test_render_posts_target_url() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(body_json(serde_json::json!({"url": "https://carsandbids.com/auctions/abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("<div class=\"end-time\">Ended</div>"))
            .mount(&server)
            .await;

        let fetcher = BrowserlessFetcher::connect(&browser_config(server.uri()), &http_config())
            .await
            .unwrap();
        let page = fetcher
            .render("https://carsandbids.com/auctions/abc")
            .await
            .unwrap();
        assert!(page.html.contains("end-time"));
    }

    #[tokio::test]
    async fn test_token_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/screenshot"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;

        let fetcher = BrowserlessFetcher::with_client(
            build_http_client(&http_config()).unwrap(),
            &server.uri(),
            Some("secret".to_string()),
        );
        let png = fetcher.screenshot("https://www.ebay.com/itm/1").await.unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[tokio::test]
    async fn test_token_is_query_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .and(query_param("token", "a&b=c d"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = BrowserlessFetcher::with_client(
            build_http_client(&http_config()).unwrap(),
            &server.uri(),
            Some("a&b=c d".to_string()),
        );
        fetcher.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_session_is_reported() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Protocol error: Target closed."))
            .mount(&server)
            .await;

        let fetcher = BrowserlessFetcher::connect(&browser_config(server.uri()), &http_config())
            .await
            .unwrap();
        let err = fetcher.render("https://www.ebay.com/itm/1").await.unwrap_err();
        assert!(matches!(err, FetchError::Session(_)));
    }

    #[tokio::test]
    async fn test_other_failures_are_not_session_failures() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .respond_with(ResponseTemplate::new(408).set_body_string("navigation timeout"))
            .mount(&server)
            .await;

        let fetcher = BrowserlessFetcher::connect(&browser_config(server.uri()), &http_config())
            .await
            .unwrap();
        let err = fetcher.render("https://www.ebay.com/itm/1").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 408, .. }));
    }
}
