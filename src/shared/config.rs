use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_BACKEND_URL: &str = "CREATORSPACE_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "CREATORSPACE_ANON_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub heartbeat_interval: u64,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    #[default]
    ExactId,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub dedup_mode: DedupMode,
    pub dedup_window_secs: u64,
    pub mutation_timeout: u64,
    pub initial_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub discovery_ttl: u64,
    pub profile_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub story_bucket: String,
    pub message_image_bucket: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: String::new(),
                anon_key: String::new(),
                request_timeout: 30,
            },
            realtime: RealtimeConfig {
                heartbeat_interval: 30,
                reconnect: ReconnectConfig::default(),
            },
            sync: SyncConfig {
                dedup_mode: DedupMode::ExactId,
                dedup_window_secs: 10,
                mutation_timeout: 20,
                initial_page_size: 200,
            },
            cache: CacheConfig {
                discovery_ttl: 300, // 5 minutes
                profile_capacity: 512,
            },
            storage: StorageConfig {
                story_bucket: "stories".to_string(),
                message_image_bucket: "message-images".to_string(),
            },
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl AppConfig {
    /// Reads `CREATORSPACE_*` variables. The backend URL and anon key are required.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        cfg.backend.url = lookup(ENV_BACKEND_URL)
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Configuration(format!("{ENV_BACKEND_URL} is not set")))?;
        cfg.backend.anon_key = lookup(ENV_ANON_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Configuration(format!("{ENV_ANON_KEY} is not set")))?;

        if let Some(value) = lookup("CREATORSPACE_REQUEST_TIMEOUT_SECS").and_then(|v| parse_u64(&v))
        {
            cfg.backend.request_timeout = value.max(1);
        }
        if let Some(value) =
            lookup("CREATORSPACE_HEARTBEAT_INTERVAL_SECS").and_then(|v| parse_u64(&v))
        {
            cfg.realtime.heartbeat_interval = value.max(1);
        }
        if let Some(v) = lookup("CREATORSPACE_RECONNECT_ENABLED") {
            cfg.realtime.reconnect.enabled = parse_bool(&v, cfg.realtime.reconnect.enabled);
        }
        if let Some(value) =
            lookup("CREATORSPACE_RECONNECT_MAX_ATTEMPTS").and_then(|v| parse_u64(&v))
        {
            cfg.realtime.reconnect.max_attempts = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) =
            lookup("CREATORSPACE_RECONNECT_INITIAL_BACKOFF_MS").and_then(|v| parse_u64(&v))
        {
            cfg.realtime.reconnect.initial_backoff_ms = value.max(1);
        }
        if let Some(value) =
            lookup("CREATORSPACE_RECONNECT_MAX_BACKOFF_MS").and_then(|v| parse_u64(&v))
        {
            cfg.realtime.reconnect.max_backoff_ms = value.max(1);
        }
        if let Some(v) = lookup("CREATORSPACE_DEDUP_MODE") {
            cfg.sync.dedup_mode = match v.trim().to_ascii_lowercase().as_str() {
                "heuristic" => DedupMode::Heuristic,
                _ => DedupMode::ExactId,
            };
        }
        if let Some(value) = lookup("CREATORSPACE_DEDUP_WINDOW_SECS").and_then(|v| parse_u64(&v)) {
            cfg.sync.dedup_window_secs = value;
        }
        if let Some(value) =
            lookup("CREATORSPACE_MUTATION_TIMEOUT_SECS").and_then(|v| parse_u64(&v))
        {
            cfg.sync.mutation_timeout = value.max(1);
        }
        if let Some(value) = lookup("CREATORSPACE_DISCOVERY_TTL_SECS").and_then(|v| parse_u64(&v))
        {
            cfg.cache.discovery_ttl = value;
        }
        if let Some(v) = lookup("CREATORSPACE_STORY_BUCKET") {
            if !v.trim().is_empty() {
                cfg.storage.story_bucket = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("CREATORSPACE_MESSAGE_IMAGE_BUCKET") {
            if !v.trim().is_empty() {
                cfg.storage.message_image_bucket = v.trim().to_string();
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.backend.url.starts_with("http://") || self.backend.url.starts_with("https://"))
        {
            return Err(AppError::Configuration(
                "Backend url must start with http:// or https://".to_string(),
            ));
        }
        if self.backend.anon_key.is_empty() {
            return Err(AppError::Configuration(
                "Backend anon_key must not be empty".to_string(),
            ));
        }
        if self.realtime.heartbeat_interval == 0 {
            return Err(AppError::Configuration(
                "Realtime heartbeat_interval must be greater than 0".to_string(),
            ));
        }
        if self.realtime.reconnect.initial_backoff_ms > self.realtime.reconnect.max_backoff_ms {
            return Err(AppError::Configuration(
                "Reconnect initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        if self.sync.mutation_timeout == 0 {
            return Err(AppError::Configuration(
                "Sync mutation_timeout must be greater than 0".to_string(),
            ));
        }
        if self.cache.profile_capacity == 0 {
            return Err(AppError::Configuration(
                "Cache profile_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.mutation_timeout)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.realtime.heartbeat_interval.max(1))
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_backend_url_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[(ENV_ANON_KEY, "anon")])).unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains(ENV_BACKEND_URL)));
    }

    #[test]
    fn missing_anon_key_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            ENV_BACKEND_URL,
            "https://example.supabase.co",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains(ENV_ANON_KEY)));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            (ENV_BACKEND_URL, "https://example.supabase.co/"),
            (ENV_ANON_KEY, " anon "),
            ("CREATORSPACE_RECONNECT_ENABLED", "off"),
            ("CREATORSPACE_DEDUP_MODE", "Heuristic"),
            ("CREATORSPACE_DEDUP_WINDOW_SECS", "5"),
            ("CREATORSPACE_MUTATION_TIMEOUT_SECS", "0"),
        ]))
        .expect("config");

        assert_eq!(cfg.backend.url, "https://example.supabase.co");
        assert_eq!(cfg.backend.anon_key, "anon");
        assert!(!cfg.realtime.reconnect.enabled);
        assert_eq!(cfg.sync.dedup_mode, DedupMode::Heuristic);
        assert_eq!(cfg.sync.dedup_window_secs, 5);
        assert_eq!(cfg.sync.mutation_timeout, 1);
    }

    #[test]
    fn rejects_non_http_url() {
        let err = AppConfig::from_lookup(lookup_from(&[
            (ENV_BACKEND_URL, "ftp://example"),
            (ENV_ANON_KEY, "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
