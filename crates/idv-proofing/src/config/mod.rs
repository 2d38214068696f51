use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::proofing::encryption::{PayloadEncryptor, KEY_LEN};

/// Jurisdictions that participate in AAMVA state-ID verification by default.
const DEFAULT_AAMVA_JURISDICTIONS: &[&str] = &[
    "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "HI", "IA", "ID", "IL",
    "IN", "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE",
    "NH", "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VA", "VT", "WA", "WI", "WV", "WY",
];

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

/// Top-level configuration for the proofing worker.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub proofing: ProofingConfig,
    pub worker: WorkerConfig,
    pub encryption: EncryptionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let vendor = VendorConfig {
            timeout: Duration::from_secs(parse_var("IDV_VENDOR_TIMEOUT_SECONDS", 15)?),
            max_retries: parse_var("IDV_VENDOR_MAX_RETRIES", 2)?,
            initial_interval: Duration::from_millis(parse_var("IDV_RETRY_INTERVAL_MS", 50)?),
            backoff_factor: parse_finite("IDV_RETRY_BACKOFF_FACTOR", 2.0)?,
            interval_randomness: parse_finite("IDV_RETRY_INTERVAL_RANDOMNESS", 0.5)?
                .clamp(0.0, 1.0),
            max_interval: Duration::from_millis(parse_var("IDV_RETRY_MAX_INTERVAL_MS", 2_000)?),
        };

        let proofing = ProofingConfig {
            vendor,
            result_ttl: Duration::from_secs(parse_var("IDV_RESULT_TTL_SECONDS", 900)?),
            async_wait_timeout: Duration::from_secs(parse_var(
                "IDV_ASYNC_WAIT_TIMEOUT_SECONDS",
                60,
            )?),
            stale_job_after: Duration::from_secs(parse_var("IDV_STALE_JOB_SECONDS", 300)?),
            aamva_supported_jurisdictions: match env::var("IDV_AAMVA_SUPPORTED_JURISDICTIONS") {
                Ok(raw) => parse_jurisdictions(&raw),
                Err(_) => default_jurisdictions(),
            },
            device_profiling_enabled: parse_bool("IDV_DEVICE_PROFILING_ENABLED", true)?,
        };

        let worker = WorkerConfig {
            concurrency: parse_var("IDV_WORKER_CONCURRENCY", 4)?,
            queue_capacity: parse_var("IDV_QUEUE_CAPACITY", 256)?,
            max_deliveries: parse_var("IDV_MAX_DELIVERIES", 3)?,
        };

        let encryption = EncryptionConfig::load(environment)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            proofing,
            worker,
            encryption,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

/// Budget applied to every outbound vendor call.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub interval_randomness: f64,
    pub max_interval: Duration,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            initial_interval: Duration::from_millis(50),
            backoff_factor: 2.0,
            interval_randomness: 0.5,
            max_interval: Duration::from_secs(2),
        }
    }
}

/// Pipeline settings shared by the dispatcher, result store and polling sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofingConfig {
    pub vendor: VendorConfig,
    pub result_ttl: Duration,
    pub async_wait_timeout: Duration,
    pub stale_job_after: Duration,
    pub aamva_supported_jurisdictions: BTreeSet<String>,
    pub device_profiling_enabled: bool,
}

impl ProofingConfig {
    pub fn supports_state_id(&self, jurisdiction: Option<&str>) -> bool {
        jurisdiction
            .map(|value| value.trim().to_ascii_uppercase())
            .is_some_and(|value| self.aamva_supported_jurisdictions.contains(&value))
    }
}

impl Default for ProofingConfig {
    fn default() -> Self {
        Self {
            vendor: VendorConfig::default(),
            result_ttl: Duration::from_secs(900),
            async_wait_timeout: Duration::from_secs(60),
            stale_job_after: Duration::from_secs(300),
            aamva_supported_jurisdictions: default_jurisdictions(),
            device_profiling_enabled: true,
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub max_deliveries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 256,
            max_deliveries: 3,
        }
    }
}

/// Symmetric keys used for argument handoff and result sealing.
#[derive(Clone)]
pub struct EncryptionConfig {
    pub key: [u8; KEY_LEN],
    pub retired_keys: Vec<[u8; KEY_LEN]>,
}

impl EncryptionConfig {
    fn load(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let key = match env::var("IDV_ENCRYPTION_KEY") {
            Ok(raw) if !raw.trim().is_empty() => decode_key("IDV_ENCRYPTION_KEY", &raw)?,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingEncryptionKey)
            }
            _ => PayloadEncryptor::generate_key(),
        };

        let retired_keys = env::var("IDV_ENCRYPTION_KEY_QUEUE")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| decode_key("IDV_ENCRYPTION_KEY_QUEUE", raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { key, retired_keys })
    }

    pub fn encryptor(&self) -> PayloadEncryptor {
        PayloadEncryptor::new(&self.key).with_retired_keys(&self.retired_keys)
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &"[redacted]")
            .field("retired_keys", &self.retired_keys.len())
            .finish()
    }
}

fn decode_key(name: &'static str, raw: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|_| ConfigError::InvalidEncryptionKey { name })?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::InvalidEncryptionKey { name })
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

/// `f64::from_str` accepts `NaN` and `inf`; neither is a usable backoff setting.
fn parse_finite(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_var(name, default)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: env::var(name).unwrap_or_else(|_| value.to_string()),
        })
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn parse_jurisdictions(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|value| value.trim().to_ascii_uppercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn default_jurisdictions() -> BTreeSet<String> {
    DEFAULT_AAMVA_JURISDICTIONS
        .iter()
        .map(|value| (*value).to_string())
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { name: &'static str, value: String },
    MissingEncryptionKey,
    InvalidEncryptionKey { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
            ConfigError::MissingEncryptionKey => {
                write!(f, "IDV_ENCRYPTION_KEY is required in production")
            }
            ConfigError::InvalidEncryptionKey { name } => {
                write!(f, "{name} must contain base64-encoded {KEY_LEN}-byte keys")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingEncryptionKey
            | ConfigError::InvalidEncryptionKey { .. } => None,
        }
    }
}
