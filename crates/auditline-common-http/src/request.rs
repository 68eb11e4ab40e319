//! Request helpers shared by the HTTP-backed sinks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

/// Common HTTP headers.
pub mod headers {
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    /// Content type expected by Kafka REST proxy v2 for JSON-embedded records.
    pub const CONTENT_TYPE_KAFKA_JSON_V2: &str = "application/vnd.kafka.json.v2+json";
    pub const API_KEY_SCHEME: &str = "ApiKey";
}

/// Credentials attached to every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum HttpAuth {
    /// No authentication.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// Bearer token.
    Bearer(String),
    /// Elasticsearch-style `Authorization: ApiKey <key>`.
    ApiKey(String),
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Self::Bearer(_) => write!(f, "Bearer(***)"),
            Self::ApiKey(_) => write!(f, "ApiKey(***)"),
        }
    }
}

impl HttpAuth {
    /// Default headers carrying these credentials.
    pub(crate) fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = match self {
            Self::None => None,
            Self::Basic { username, password } => {
                Some(format!("Basic {}", basic_token(username, password)))
            }
            Self::Bearer(token) => Some(format!("Bearer {token}")),
            Self::ApiKey(key) => Some(format!("{} {key}", headers::API_KEY_SCHEME)),
        };
        if let Some(Ok(mut value)) = value.map(HeaderValue::try_from) {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }
}

/// Join path segments onto a base endpoint, percent-encoding each segment.
pub fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        path.pop_if_empty();
        path.extend(segments.iter().copied());
    }
    Ok(url)
}

fn basic_token(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_segments() {
        let url = endpoint_url("http://es:9200", &["audit-logs", "_doc", "abc"]).unwrap();
        assert_eq!(url.as_str(), "http://es:9200/audit-logs/_doc/abc");
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let url = endpoint_url("http://proxy:8082/kafka/", &["topics", "audit-logs"]).unwrap();
        assert_eq!(url.as_str(), "http://proxy:8082/kafka/topics/audit-logs");
    }

    #[test]
    fn test_endpoint_url_encodes_segments() {
        let url = endpoint_url("http://es:9200", &["audit logs", "_doc", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://es:9200/audit%20logs/_doc/a%2Fb");
    }

    #[test]
    fn test_endpoint_url_rejects_relative() {
        assert!(endpoint_url("/relative", &["y"]).is_err());
    }

    #[test]
    fn test_basic_token() {
        assert_eq!(basic_token("elastic", "changeme"), "ZWxhc3RpYzpjaGFuZ2VtZQ==");
        assert_eq!(basic_token("a", "b"), "YTpi");
    }

    #[test]
    fn test_auth_headers() {
        let headers = HttpAuth::ApiKey("k".into()).default_headers();
        assert_eq!(headers[AUTHORIZATION], "ApiKey k");
        assert!(HttpAuth::None.default_headers().is_empty());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = HttpAuth::Basic { username: "elastic".into(), password: "hunter2".into() };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
