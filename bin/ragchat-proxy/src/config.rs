//! Proxy configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Default order in which upstream JSON fields are probed for reply text.
pub const DEFAULT_CONTENT_FIELDS: &[&str] = &["output", "content", "response", "message", "text"];

/// Runtime configuration for ragchat-proxy.
///
/// Every field has a default so the proxy starts without any environment
/// variables; it answers 503 on `/chat` until an upstream URL is set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// RAG webhook that receives `{query, sessionId}`.
    pub upstream_url: Option<String>,

    /// Hard limit on the upstream call (default: 60 s).
    pub upstream_timeout: Duration,

    /// Requests allowed per client within one window (default: 30).
    pub rate_limit: u32,

    /// Length of a rate-limit window (default: 60 s).
    pub rate_window: Duration,

    /// Maximum number of client keys tracked at once (default: 10 000).
    pub rate_max_keys: usize,

    /// Largest accepted `/chat` request body (default: 1 MiB).
    pub max_body_bytes: usize,

    /// Field names tried, in order, to pull text out of a JSON reply.
    pub content_fields: Vec<String>,

    /// Value of `Access-Control-Allow-Origin` (default: `"*"`).
    pub cors_allow_origin: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,hyper=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let parse = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let content_fields = lookup("RAGCHAT_CONTENT_FIELDS")
            .map(|v| parse_list(&v))
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_FIELDS.iter().map(|s| s.to_string()).collect());

        Self {
            bind_address: get("RAGCHAT_BIND", "0.0.0.0:3000"),
            upstream_url: lookup("RAGCHAT_UPSTREAM_URL")
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty()),
            upstream_timeout: Duration::from_secs(parse("RAGCHAT_UPSTREAM_TIMEOUT_SECS", 60)),
            rate_limit: parse("RAGCHAT_RATE_LIMIT", 30).min(u32::MAX as u64) as u32,
            rate_window: Duration::from_secs(parse("RAGCHAT_RATE_WINDOW_SECS", 60)),
            rate_max_keys: parse("RAGCHAT_RATE_MAX_KEYS", 10_000) as usize,
            max_body_bytes: parse("RAGCHAT_MAX_BODY_BYTES", 1024 * 1024) as usize,
            content_fields,
            cors_allow_origin: get("RAGCHAT_CORS_ORIGIN", "*"),
            log_level: get("RAGCHAT_LOG", "info"),
            log_json: lookup("RAGCHAT_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.upstream_url, None);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit, 30);
        assert_eq!(cfg.rate_window, Duration::from_secs(60));
        assert_eq!(cfg.max_body_bytes, 1_048_576);
        assert_eq!(cfg.content_fields, ["output", "content", "response", "message", "text"]);
        assert_eq!(cfg.cors_allow_origin, "*");
        assert!(!cfg.log_json);
    }

    #[test]
    fn content_fields_are_configurable() {
        let cfg = config_with(&[("RAGCHAT_CONTENT_FIELDS", " answer , text ,")]);
        assert_eq!(cfg.content_fields, ["answer", "text"]);
    }

    #[test]
    fn blank_values_fall_back() {
        let cfg = config_with(&[
            ("RAGCHAT_UPSTREAM_URL", "  "),
            ("RAGCHAT_CONTENT_FIELDS", ","),
            ("RAGCHAT_RATE_LIMIT", "lots"),
        ]);
        assert_eq!(cfg.upstream_url, None);
        assert_eq!(cfg.content_fields.len(), DEFAULT_CONTENT_FIELDS.len());
        assert_eq!(cfg.rate_limit, 30);
    }

    #[test]
    fn body_limit_is_configurable() {
        assert_eq!(config_with(&[("RAGCHAT_MAX_BODY_BYTES", "4096")]).max_body_bytes, 4096);
        assert_eq!(config_with(&[("RAGCHAT_MAX_BODY_BYTES", "-1")]).max_body_bytes, 1_048_576);
    }

    #[test]
    fn log_json_accepts_true_and_one() {
        assert!(config_with(&[("RAGCHAT_LOG_JSON", "TRUE")]).log_json);
        assert!(config_with(&[("RAGCHAT_LOG_JSON", "1")]).log_json);
        assert!(!config_with(&[("RAGCHAT_LOG_JSON", "yes")]).log_json);
    }
}
