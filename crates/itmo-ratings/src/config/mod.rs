use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::ratings::cache::CacheConfig;
use crate::ratings::scraper::{RetryPolicy, ScraperConfig};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub ratings: RatingsConfig,
    pub telegram: TelegramConfig,
    pub defaults: DefaultTargets,
    pub build: BuildInfo,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let rate_limit = RateLimitConfig {
            per_second: positive_var("APP_RATE_LIMIT_RPS", 10)?,
            burst: positive_var("APP_RATE_LIMIT_BURST", 20)?,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let refresh_secs: u64 = positive_var("RATINGS_REFRESH_SECS", 300)?;
        let fetch_concurrency: usize = positive_var("RATINGS_FETCH_CONCURRENCY", 4)?;
        let max_attempts: u32 = positive_var("RATINGS_MAX_ATTEMPTS", 3)?;
        let retry_delay_ms: u64 = number_var("RATINGS_RETRY_DELAY_MS", 2_000)?;
        let deadline_secs: u64 = positive_var("RATINGS_FETCH_DEADLINE_SECS", 300)?;

        let telegram_user_id = optional_var("TELEGRAM_USER_ID")?;
        let program_id = optional_var("PROGRAM_ID")?;

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                rate_limit,
            },
            telemetry: TelemetryConfig { log_level },
            ratings: RatingsConfig {
                refresh_interval: Duration::from_secs(refresh_secs),
                fetch_concurrency,
                max_attempts,
                retry_delay: Duration::from_millis(retry_delay_ms),
                fetch_deadline: Duration::from_secs(deadline_secs),
            },
            telegram: TelegramConfig {
                api_token: non_empty_var("TELEGRAM_API_TOKEN"),
                user_id: telegram_user_id,
            },
            defaults: DefaultTargets {
                student_id: non_empty_var("STUDENT_ID"),
                program_id,
            },
            build: BuildInfo {
                commit_id: env::var("COMMIT_ID").unwrap_or_default(),
            },
        })
    }
}

fn non_empty_var(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    non_empty_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { var: name })
        })
        .transpose()
}

fn number_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(optional_var(name)?.unwrap_or(default))
}

fn positive_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let value = number_var(name, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidNumber { var: name });
    }
    Ok(value)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Token bucket shared by every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 10,
            burst: 20,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Refresh cadence and upstream fetch limits.
#[derive(Debug, Clone)]
pub struct RatingsConfig {
    pub refresh_interval: Duration,
    pub fetch_concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub fetch_deadline: Duration,
}

impl RatingsConfig {
    pub fn scraper(&self) -> ScraperConfig {
        ScraperConfig {
            retry: RetryPolicy::new(self.max_attempts, self.retry_delay),
            deadline: self.fetch_deadline,
            ..ScraperConfig::default()
        }
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            fetch_concurrency: self.fetch_concurrency,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_token: Option<String>,
    pub user_id: Option<i64>,
}

/// Applicant and program used by one-shot commands when no flag is given.
#[derive(Debug, Clone)]
pub struct DefaultTargets {
    pub student_id: Option<String>,
    pub program_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub commit_id: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a valid positive number")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
