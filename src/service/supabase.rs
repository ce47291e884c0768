//! Shared HTTP plumbing for the Supabase auth, storage, and REST APIs.
//!
//! Every request carries the caller's `apikey` and bearer token, so the
//! backend evaluates access as the caller rather than as this service.

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::base::{
    config::Config,
    types::{Res, Session},
};

/// Thin HTTP client bound to a Supabase project URL.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct SupabaseHttp {
    client: reqwest::Client,
    base_url: Url,
}

impl SupabaseHttp {
    /// Create a new client for the configured project.
    pub fn new(config: &Config) -> Res<Self> {
        let client = reqwest::Client::builder().user_agent(concat!("review-parser/", env!("CARGO_PKG_VERSION"))).build()?;
        let base_url = Url::parse(&config.supabase_url)?;

        Ok(Self { client, base_url })
    }

    /// Build a URL below the project root from path segments.
    ///
    /// Segments are percent-encoded individually, so a storage object path
    /// can be passed in pieces without its separators being escaped.
    pub fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Res<Url> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Supabase URL `{}` cannot be used as a base.", self.base_url))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    /// Start a request authenticated as the session's user.
    pub fn request(&self, method: Method, url: Url, session: &Session) -> RequestBuilder {
        debug!("{} {}", method, url.path());

        self.client.request(method, url).header("apikey", &session.api_key).bearer_auth(&session.access_token)
    }
}

/// Pass a successful response through, or turn the error body into an error.
pub async fn check_response(response: Response) -> Res<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(anyhow::anyhow!(error_message(status, &body)))
}

/// Extract a human readable message from a Supabase error body.
///
/// The auth, storage, and REST APIs each name the field differently.
fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| ["message", "msg", "error_description", "error"].iter().find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string)));

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => body.trim().to_string(),
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::base::config::ConfigInner;

    fn create_test_http(url: &str) -> SupabaseHttp {
        let config = Config {
            inner: Arc::new(ConfigInner {
                supabase_url: url.to_string(),
                ..Default::default()
            }),
        };

        SupabaseHttp::new(&config).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let http = create_test_http("http://127.0.0.1:54321/");
        let url = http.url(["storage", "v1", "object", "authenticated", "reviews", "u1", "page 1.png"]).unwrap();

        assert_eq!(url.as_str(), "http://127.0.0.1:54321/storage/v1/object/authenticated/reviews/u1/page%201.png");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let http = create_test_http("https://example.com/project");
        let url = http.url(["rest", "v1", "parsed_reviews"]).unwrap();

        assert_eq!(url.as_str(), "https://example.com/project/rest/v1/parsed_reviews");
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"message":"duplicate key"}"#), "duplicate key");
        assert_eq!(error_message(StatusCode::UNAUTHORIZED, r#"{"msg":"invalid JWT"}"#), "invalid JWT");
        assert_eq!(error_message(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#), "not_found");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "HTTP 502 Bad Gateway");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down\n"), "upstream down");
    }
}
