use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::encoding::Encoding;

/// Root configuration: the whole service as parsed from the config file.
/// It is normalized once by [`ServiceConfig::init`] and read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// version code of the configuration, must be 1
    #[serde(default)]
    pub version: u32,
    /// port to bind the service
    #[serde(default)]
    pub port: u16,
    /// default timeout
    #[serde(default, with = "duration_serde")]
    pub timeout: Duration,
    /// default TTL for the Cache-Control header of GET endpoints
    #[serde(default, with = "duration_serde")]
    pub cache_ttl: Duration,
    /// default set of hosts
    #[serde(default)]
    pub host: Vec<String>,
    /// set of endpoint definitions
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// run in debug mode
    #[serde(default)]
    pub debug: bool,
}

/// A single endpoint exposed by the service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// url pattern to be registered and exposed to the world
    pub endpoint: String,
    /// HTTP method of the endpoint (GET, POST, PUT, etc)
    #[serde(default)]
    pub method: String,
    /// set of definitions of the backends to be linked to this endpoint
    #[serde(default)]
    pub backend: Vec<Backend>,
    /// number of concurrent calls this endpoint must send to its backends
    #[serde(default)]
    pub concurrent_calls: u32,
    /// timeout of this endpoint
    #[serde(default, with = "duration_serde")]
    pub timeout: Duration,
    /// duration of the cache header
    #[serde(default, with = "duration_serde")]
    pub cache_ttl: Duration,
    /// list of query string params to be forwarded to the backends
    #[serde(default, rename = "querystring_params")]
    pub query_string: Vec<String>,
}

/// How to connect to a backend service and how to process its response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Backend {
    /// set of hosts of the API; inherits the service hosts when empty
    #[serde(default)]
    pub host: Vec<String>,
    /// URL pattern to use to locate the resource to be consumed
    #[serde(default)]
    pub url_pattern: String,
    /// HTTP method of the request to send to the backend
    #[serde(default)]
    pub method: String,
    /// the encoding format of the response body
    #[serde(default)]
    pub encoding: Encoding,
    /// name of the field to extract to the root
    #[serde(default)]
    pub target: Option<String>,
    /// the name of the group the response should be moved to
    #[serde(default)]
    pub group: Option<String>,
    /// set of response fields to allow
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// set of response fields to remove
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// map of response fields to be renamed and their new names
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    /// number of concurrent calls to send to this backend
    #[serde(default)]
    pub concurrent_calls: u32,

    /// list of keys to be replaced in the url_pattern, derived at init
    #[serde(skip)]
    pub url_keys: Vec<String>,
    /// timeout of this backend, derived at init
    #[serde(skip, default)]
    pub timeout: Duration,
}

static HOST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://)?([a-zA-Z0-9._\-]+)(:[0-9]{2,6})?/?$").unwrap());
static URL_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-zA-Z0-9_\-]+)\}").unwrap());

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_METHOD: &str = "GET";

impl ServiceConfig {
    /// Load a configuration file, picking the parser by extension, and
    /// normalize it. YAML is the default for unknown extensions.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let mut config: ServiceConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?,
        };

        config.init()?;
        Ok(config)
    }

    /// Normalize the parsed configuration: fill defaults, propagate
    /// endpoint values down to their backends and clean every host.
    /// Must be called exactly once before the config is shared.
    pub fn init(&mut self) -> Result<()> {
        if self.version != 1 {
            bail!("unsupported version: {}", self.version);
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        self.host = clean_hosts(&self.host)?;

        for endpoint in &mut self.endpoints {
            if endpoint.method.is_empty() {
                endpoint.method = DEFAULT_METHOD.to_string();
            }
            endpoint.method = endpoint.method.to_uppercase();
            if endpoint.timeout == Duration::ZERO {
                endpoint.timeout = self.timeout;
            }
            if endpoint.cache_ttl == Duration::ZERO {
                endpoint.cache_ttl = self.cache_ttl;
            }

            for backend in &mut endpoint.backend {
                if backend.host.is_empty() {
                    backend.host = self.host.clone();
                } else {
                    backend.host = clean_hosts(&backend.host)?;
                }
                if backend.method.is_empty() {
                    backend.method = endpoint.method.clone();
                }
                backend.method = backend.method.to_uppercase();
                if backend.concurrent_calls == 0 {
                    backend.concurrent_calls = endpoint.concurrent_calls;
                }
                backend.timeout = endpoint.timeout;
                backend.url_keys = URL_KEY_PATTERN
                    .captures_iter(&backend.url_pattern)
                    .map(|c| c[1].to_string())
                    .collect();
            }
        }
        Ok(())
    }
}

/// Normalize a host to `scheme://authority[:port]`: the scheme defaults to
/// `http://` and any trailing slash is stripped. Fails on anything that does
/// not look like a host.
pub fn clean_host(host: &str) -> Result<String> {
    let captures = match HOST_PATTERN.captures(host) {
        Some(c) => c,
        None => bail!("malformed host: {}", host),
    };
    let scheme = captures
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or("http://");
    let authority = &captures[2];
    let port = captures.get(3).map(|m| m.as_str()).unwrap_or("");
    Ok(format!("{}{}{}", scheme, authority, port))
}

fn clean_hosts(hosts: &[String]) -> Result<Vec<String>> {
    hosts.iter().map(|h| clean_host(h)).collect()
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let parse = |v: &str| {
            v.parse::<u64>()
                .map_err(|e| format!("invalid duration {:?}: {}", s, e))
        };
        if let Some(v) = s.strip_suffix("ms") {
            return Ok(Duration::from_millis(parse(v)?));
        }
        if let Some(v) = s.strip_suffix('s') {
            return Ok(Duration::from_secs(parse(v)?));
        }
        if let Some(v) = s.strip_suffix('m') {
            return Ok(Duration::from_secs(parse(v)? * 60));
        }
        if let Some(v) = s.strip_suffix('h') {
            return Ok(Duration::from_secs(parse(v)? * 3600));
        }
        // a bare number is taken as milliseconds
        Ok(Duration::from_millis(parse(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ServiceConfig {
        ServiceConfig {
            version: 1,
            timeout: Duration::from_millis(100),
            cache_ttl: Duration::from_secs(300),
            host: vec!["supu.local:8080".to_string()],
            endpoints: vec![EndpointConfig {
                endpoint: "/users/{id}".to_string(),
                backend: vec![Backend {
                    url_pattern: "/registry/{Id}/{Tenant}".to_string(),
                    ..Backend::default()
                }],
                ..EndpointConfig::default()
            }],
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn test_init_fills_defaults_and_inherits() {
        let mut cfg = sample_config();
        cfg.init().unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, vec!["http://supu.local:8080".to_string()]);

        let endpoint = &cfg.endpoints[0];
        assert_eq!(endpoint.method, "GET");
        assert_eq!(endpoint.timeout, Duration::from_millis(100));
        assert_eq!(endpoint.cache_ttl, Duration::from_secs(300));

        let backend = &endpoint.backend[0];
        assert_eq!(backend.host, cfg.host);
        assert_eq!(backend.method, "GET");
        assert_eq!(backend.timeout, Duration::from_millis(100));
        assert_eq!(backend.url_keys, vec!["Id".to_string(), "Tenant".to_string()]);
        assert_eq!(backend.encoding, Encoding::Json);
    }

    #[test]
    fn test_init_rejects_unknown_version() {
        let mut cfg = sample_config();
        cfg.version = 2;
        let err = cfg.init().unwrap_err();
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn test_backend_overrides_survive_init() {
        let mut cfg = sample_config();
        cfg.endpoints[0].concurrent_calls = 3;
        cfg.endpoints[0].backend[0].host = vec!["https://tupu.local".to_string()];
        cfg.endpoints[0].backend[0].method = "post".to_string();
        cfg.init().unwrap();

        let backend = &cfg.endpoints[0].backend[0];
        assert_eq!(backend.host, vec!["https://tupu.local".to_string()]);
        assert_eq!(backend.method, "POST");
        assert_eq!(backend.concurrent_calls, 3);
    }

    #[test]
    fn test_clean_host() {
        for (input, expected) in [
            ("supu.local", "http://supu.local"),
            ("supu.local/", "http://supu.local"),
            ("supu.local:8080", "http://supu.local:8080"),
            ("http://supu.local:8080/", "http://supu.local:8080"),
            ("https://supu.local", "https://supu.local"),
        ] {
            assert_eq!(clean_host(input).unwrap(), expected);
        }
    }

    #[test]
    fn test_clean_host_is_idempotent() {
        let once = clean_host("supu.local:8080/").unwrap();
        assert_eq!(clean_host(&once).unwrap(), once);
    }

    #[test]
    fn test_clean_host_rejects_malformed() {
        for input in ["ftp://supu.local", "supu local", "http://", "supu.local:8080/path"] {
            assert!(clean_host(input).is_err(), "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_parse_duration() {
        use super::duration_serde::parse_duration;
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_from_file_parses_yaml() {
        let dir = std::env::temp_dir().join("porta-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("service.yaml");
        std::fs::write(
            &path,
            concat!(
                "version: 1\n",
                "timeout: 2s\n",
                "host: [\"supu.local\"]\n",
                "endpoints:\n",
                "  - endpoint: /a\n",
                "    backend:\n",
                "      - url_pattern: /x\n",
            ),
        )
        .unwrap();

        let cfg = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.timeout, Duration::from_secs(2));
        assert_eq!(cfg.endpoints[0].backend[0].host, vec!["http://supu.local"]);
    }
}
