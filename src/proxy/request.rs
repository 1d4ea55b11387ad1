use bytes::Bytes;
use http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use url::Url;

/// The request value travelling down a proxy pipeline.
///
/// It is built once at the edge; middlewares that rewrite it (URL, method)
/// receive their own copy, so mutations never leak back to the caller. The
/// body is buffered, which keeps clones cheap and makes racing duplicated
/// calls safe for any method.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// path after template substitution; empty until the request-builder runs
    pub path: String,
    /// absolute URL, filled by the load-balance layer
    pub url: Option<Url>,
    pub headers: HeaderMap,
    pub query: HashMap<String, Vec<String>>,
    pub body: Bytes,
    /// placeholder name -> value, keys stored with the first letter
    /// upper-cased to align with path substitution
    pub params: HashMap<String, String>,
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-zA-Z0-9_\-]+)\}").unwrap());

impl Request {
    /// Substitute every `{Key}` in the pattern with the matching param and
    /// store the outcome as this request's path. Missing keys substitute an
    /// empty string.
    pub fn generate_path(&mut self, url_pattern: &str) {
        self.path = PLACEHOLDER
            .replace_all(url_pattern, |caps: &regex::Captures| {
                self.params.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned();
    }
}
