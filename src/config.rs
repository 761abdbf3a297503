use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub max_commit_retries: u32,
    pub retry_backoff: Duration,
    pub cache_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("BANK_PORT", defaults.port),
            max_commit_retries: env_parse("BANK_MAX_COMMIT_RETRIES", defaults.max_commit_retries),
            retry_backoff: Duration::from_millis(env_parse(
                "BANK_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )),
            cache_ttl: Duration::from_secs(env_parse(
                "BANK_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_commit_retries: 3,
            retry_backoff: Duration::from_millis(50),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
