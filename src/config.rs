//! Runtime settings. Every field has an explicit default; `from_env`
//! overlays environment variables and validates the result once.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Fs,
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub enable_hsts: bool,
    /// Expose internal error detail in responses.
    pub dev_mode: bool,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    /// Snapshot directory for the in-memory store; `None` keeps it purely in memory.
    pub data_dir: Option<PathBuf>,
    pub blob_backend: BlobBackend,
    pub upload_dir: PathBuf,
    pub s3: S3Settings,
    pub max_images: usize,
    pub max_image_bytes: usize,
    pub claim_retries: u32,
    pub storage_timeout: Duration,
    pub allow_resolve_without_claim: bool,
    pub rate_limit_enabled: bool,
    pub report_limit: usize,
    pub report_window: Duration,
    pub claim_limit: usize,
    pub claim_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            frontend_url: "http://localhost:3000".into(),
            enable_hsts: false,
            dev_mode: false,
            jwt_secret: String::new(),
            database_url: None,
            data_dir: None,
            blob_backend: BlobBackend::Fs,
            upload_dir: PathBuf::from("uploads/lostfound"),
            s3: S3Settings {
                bucket: "lostfound-images".into(),
                endpoint: None,
                region: "us-east-1".into(),
                access_key: String::new(),
                secret_key: String::new(),
            },
            max_images: 5,
            max_image_bytes: 5 * 1024 * 1024,
            claim_retries: 5,
            storage_timeout: Duration::from_secs(10),
            allow_resolve_without_claim: false,
            rate_limit_enabled: true,
            report_limit: 10,
            report_window: Duration::from_secs(3600),
            claim_limit: 20,
            claim_window: Duration::from_secs(3600),
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match lookup(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
        Some(v) => Err(ConfigError::Invalid { name, value: v, reason: "expected a boolean".into() }),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parsed(lookup, name, default.as_secs()).map(Duration::from_secs)
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Settings::default();
        let blob_backend = match lookup("BLOB_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("fs") => BlobBackend::Fs,
            Some("s3") => BlobBackend::S3,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "BLOB_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'fs' or 's3'".into(),
                })
            }
        };
        let settings = Settings {
            host: lookup("HOST").unwrap_or(d.host),
            port: parsed(&lookup, "PORT", d.port)?,
            frontend_url: lookup("FRONTEND_URL").unwrap_or(d.frontend_url),
            enable_hsts: flag(&lookup, "ENABLE_HSTS", d.enable_hsts)?,
            dev_mode: flag(&lookup, "DEV_MODE", d.dev_mode)?,
            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            database_url: lookup("DATABASE_URL"),
            data_dir: lookup("LOSTFOUND_DATA_DIR").map(PathBuf::from),
            blob_backend,
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from).unwrap_or(d.upload_dir),
            s3: S3Settings {
                bucket: lookup("S3_BUCKET").unwrap_or(d.s3.bucket),
                endpoint: lookup("S3_ENDPOINT"),
                region: lookup("S3_REGION").unwrap_or(d.s3.region),
                access_key: lookup("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: lookup("S3_SECRET_KEY").unwrap_or_default(),
            },
            max_images: parsed(&lookup, "MAX_IMAGES", d.max_images)?,
            max_image_bytes: parsed(&lookup, "MAX_IMAGE_BYTES", d.max_image_bytes)?,
            claim_retries: parsed(&lookup, "CLAIM_RETRIES", d.claim_retries)?,
            storage_timeout: secs(&lookup, "STORAGE_TIMEOUT_SECS", d.storage_timeout)?,
            allow_resolve_without_claim: flag(&lookup, "ALLOW_RESOLVE_WITHOUT_CLAIM", d.allow_resolve_without_claim)?,
            rate_limit_enabled: flag(&lookup, "RATE_LIMIT_ENABLED", d.rate_limit_enabled)?,
            report_limit: parsed(&lookup, "RL_REPORT_LIMIT", d.report_limit)?,
            report_window: secs(&lookup, "RL_REPORT_WINDOW", d.report_window)?,
            claim_limit: parsed(&lookup, "RL_CLAIM_LIMIT", d.claim_limit)?,
            claim_window: secs(&lookup, "RL_CLAIM_WINDOW", d.claim_window)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                value: "<redacted>".into(),
                reason: "must be at least 32 characters long".into(),
            });
        }
        if self.max_images > 5 {
            return Err(ConfigError::Invalid {
                name: "MAX_IMAGES",
                value: self.max_images.to_string(),
                reason: "at most 5 images per item are supported".into(),
            });
        }
        if self.claim_retries == 0 {
            return Err(ConfigError::Invalid { name: "CLAIM_RETRIES", value: "0".into(), reason: "must be positive".into() });
        }
        if self.storage_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "STORAGE_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        if self.blob_backend == BlobBackend::S3 && self.s3.endpoint.is_none() {
            return Err(ConfigError::Missing("S3_ENDPOINT"));
        }
        if cfg!(feature = "postgres-store") && self.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        Ok(())
    }
}
