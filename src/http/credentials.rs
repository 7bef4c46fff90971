//! Client credential extraction and redaction.
//!
//! # Responsibilities
//! - Read the client credential (header first, query parameter second)
//! - Remove the query form from URIs forwarded upstream
//! - Redact credential values before a URI is logged
//!
//! # Design Decisions
//! - Empty values count as absent, in either position
//! - Query rewriting drops only the credential pair; every other pair is
//!   forwarded byte-for-byte

use axum::http::{HeaderMap, HeaderName, Uri};
use url::form_urlencoded;

use crate::config::{ProxyConfig, ValidationError};

/// Where the gateway reads client credentials and writes upstream ones.
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    client_header: HeaderName,
    query_param: String,
    upstream_header: HeaderName,
}

impl CredentialPolicy {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ValidationError> {
        let header = |field: &'static str, value: &str| {
            HeaderName::from_bytes(value.as_bytes())
                .map_err(|_| ValidationError::new(field, format!("'{value}' is not a valid header name")))
        };

        Ok(Self {
            client_header: header("proxy.client_header", &config.client_header)?,
            query_param: config.client_query_param.clone(),
            upstream_header: header("proxy.upstream_header", &config.upstream_header)?,
        })
    }

    pub fn client_header(&self) -> &HeaderName {
        &self.client_header
    }

    pub fn upstream_header(&self) -> &HeaderName {
        &self.upstream_header
    }

    /// The client credential, if one was supplied.
    ///
    /// A non-empty header is authoritative: if it is not valid text the
    /// request has no usable credential and the query is not consulted.
    pub fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        if let Some(value) = headers.get(&self.client_header).filter(|value| !value.is_empty()) {
            return value.to_str().ok().map(str::to_string);
        }

        let query = uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.query_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// `query` without the credential parameter, `None` if nothing remains.
    pub fn strip_query(&self, query: &str) -> Option<String> {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty() && !self.is_credential_pair(pair))
            .collect();

        if kept.is_empty() {
            None
        } else {
            Some(kept.join("&"))
        }
    }

    /// Path and query suitable for logs, credential value redacted.
    pub fn sanitize_uri(&self, uri: &Uri) -> String {
        let Some(query) = uri.query() else {
            return uri.path().to_string();
        };

        let pairs: Vec<String> = query
            .split('&')
            .map(|pair| {
                if !self.is_credential_pair(pair) {
                    return pair.to_string();
                }
                let value = decode_pair(pair).map(|(_, value)| value).unwrap_or_default();
                let redacted: String = form_urlencoded::byte_serialize(redact(&value).as_bytes()).collect();
                format!("{}={redacted}", self.query_param)
            })
            .collect();

        format!("{}?{}", uri.path(), pairs.join("&"))
    }

    fn is_credential_pair(&self, pair: &str) -> bool {
        decode_pair(pair).is_some_and(|(key, _)| key == self.query_param)
    }
}

fn decode_pair(pair: &str) -> Option<(String, String)> {
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
}

/// Keep the first and last seven characters of a long secret.
///
/// Values too short to be shown partially are fully hidden.
pub fn redact(value: &str) -> String {
    const VISIBLE: usize = 7;

    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 16 {
        return "...".to_string();
    }

    let head: String = chars[..VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy() -> CredentialPolicy {
        CredentialPolicy::from_config(&ProxyConfig::default()).unwrap()
    }

    fn headers(key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert("x-api-key", HeaderValue::from_str(key).unwrap());
        }
        headers
    }

    #[test]
    fn test_header_takes_precedence_over_query() {
        let uri: Uri = "/api/v3/queue?apikey=fromquery".parse().unwrap();
        assert_eq!(policy().resolve(&headers(Some("fromheader")), &uri).as_deref(), Some("fromheader"));
    }

    #[test]
    fn test_unreadable_header_does_not_fall_back_to_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        let uri: Uri = "/api/v3/queue?apikey=fromquery".parse().unwrap();

        assert_eq!(policy().resolve(&headers, &uri), None);
    }

    #[test]
    fn test_query_fallback() {
        let uri: Uri = "/api/v3/queue?page=2&apikey=abc%20123".parse().unwrap();
        assert_eq!(policy().resolve(&headers(None), &uri).as_deref(), Some("abc 123"));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let uri: Uri = "/api/v3/queue?apikey=".parse().unwrap();
        assert_eq!(policy().resolve(&headers(Some("")), &uri), None);
        assert_eq!(policy().resolve(&headers(None), &"/".parse().unwrap()), None);
    }

    #[test]
    fn test_strip_query_keeps_other_pairs_verbatim() {
        let policy = policy();
        assert_eq!(
            policy.strip_query("term=a%20b&apikey=secret&sort=title+asc").as_deref(),
            Some("term=a%20b&sort=title+asc")
        );
        assert_eq!(policy.strip_query("apikey=secret"), None);
        assert_eq!(policy.strip_query("ApiKey=x").as_deref(), Some("ApiKey=x"));
    }

    #[test]
    fn test_sanitize_uri_redacts_credential() {
        let uri: Uri = "/api/v3/queue?page=1&apikey=0123456789abcdefghij".parse().unwrap();
        assert_eq!(policy().sanitize_uri(&uri), "/api/v3/queue?page=1&apikey=0123456...defghij");

        let short: Uri = "/api?apikey=abc123".parse().unwrap();
        assert_eq!(policy().sanitize_uri(&short), "/api?apikey=...");

        let plain: Uri = "/api/v3/queue".parse().unwrap();
        assert_eq!(policy().sanitize_uri(&plain), "/api/v3/queue");
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("0123456789abcdef"), "0123456...9abcdef");
        assert_eq!(redact("short"), "...");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let config = ProxyConfig {
            client_header: "bad header".into(),
            ..Default::default()
        };
        let err = CredentialPolicy::from_config(&config).unwrap_err();
        assert_eq!(err.field, "proxy.client_header");
    }
}
