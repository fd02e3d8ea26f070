//! Environment configuration

use crate::core::dispatcher::{BackpressurePolicy, DispatcherConfig, MAX_CAPACITY};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the RAG/LLM backend, without a trailing slash.
    pub llm_base_url: String,
    /// HTTP timeout of a single backend request.
    pub request_timeout: Duration,
    pub dispatcher: DispatcherConfig,
    /// How long a caller waits for its reply before giving up on it.
    pub reply_timeout: Option<Duration>,
    pub listen_addr: SocketAddr,
}

impl AppConfig {
    /// Reads the configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig, ConfigError> {
        let llm_base_url = lookup("LLM_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_owned())
            .trim_end_matches('/')
            .to_owned();
        if !(llm_base_url.starts_with("http://") || llm_base_url.starts_with("https://")) {
            return Err(ConfigError {
                name: "LLM_BASE_URL",
                value: llm_base_url,
                reason: "expected an http(s) URL".to_owned(),
            });
        }

        let capacity: usize = parse(&lookup, "LLM_QUEUE_CAPACITY")?.unwrap_or(10_000);
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(ConfigError {
                name: "LLM_QUEUE_CAPACITY",
                value: capacity.to_string(),
                reason: format!("capacity must be between 1 and {MAX_CAPACITY}"),
            });
        }

        Ok(AppConfig {
            llm_base_url,
            request_timeout: Duration::from_secs(
                parse(&lookup, "LLM_REQUEST_TIMEOUT_SECS")?.unwrap_or(300),
            ),
            dispatcher: DispatcherConfig {
                capacity,
                policy: parse::<BackpressurePolicy>(&lookup, "LLM_BACKPRESSURE")?
                    .unwrap_or_default(),
            },
            reply_timeout: parse(&lookup, "LLM_REPLY_TIMEOUT_SECS")?.map(Duration::from_secs),
            listen_addr: parse(&lookup, "LISTEN_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000))),
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => Err(ConfigError {
                name,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.llm_base_url, "http://localhost:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert_eq!(config.dispatcher.capacity, 10_000);
        assert_eq!(config.dispatcher.policy, BackpressurePolicy::Reject);
        assert_eq!(config.reply_timeout, None);
        assert_eq!(config.listen_addr.port(), 3000);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("LLM_BASE_URL", "http://rag.internal:9000/"),
            ("LLM_QUEUE_CAPACITY", "16"),
            ("LLM_BACKPRESSURE", "block"),
            ("LLM_REPLY_TIMEOUT_SECS", "30"),
            ("LISTEN_ADDR", "127.0.0.1:4000"),
        ])
        .unwrap();

        assert_eq!(config.llm_base_url, "http://rag.internal:9000");
        assert_eq!(config.dispatcher.capacity, 16);
        assert_eq!(config.dispatcher.policy, BackpressurePolicy::Block);
        assert_eq!(config.reply_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.listen_addr, "127.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = config(&[("LLM_QUEUE_CAPACITY", "0")]).unwrap_err();
        assert_eq!(err.name, "LLM_QUEUE_CAPACITY");

        let err = config(&[("LLM_QUEUE_CAPACITY", "lots")]).unwrap_err();
        assert_eq!(err.name, "LLM_QUEUE_CAPACITY");

        let err = config(&[("LLM_QUEUE_CAPACITY", "4611686018427387904")]).unwrap_err();
        assert_eq!(err.name, "LLM_QUEUE_CAPACITY");
        assert!(err.reason.contains(&MAX_CAPACITY.to_string()));

        let too_large = (MAX_CAPACITY + 1).to_string();
        let err = config(&[("LLM_QUEUE_CAPACITY", too_large.as_str())]).unwrap_err();
        assert_eq!(err.name, "LLM_QUEUE_CAPACITY");

        let max = MAX_CAPACITY.to_string();
        let largest = config(&[("LLM_QUEUE_CAPACITY", max.as_str())]).unwrap();
        assert_eq!(largest.dispatcher.capacity, MAX_CAPACITY);

        let err = config(&[("LLM_BACKPRESSURE", "drop-oldest")]).unwrap_err();
        assert_eq!(err.name, "LLM_BACKPRESSURE");

        let err = config(&[("LLM_BASE_URL", "localhost:8080")]).unwrap_err();
        assert_eq!(err.name, "LLM_BASE_URL");
    }
}
