//! Startup configuration read from the process environment.
//!
//! Every setting is resolved through a lookup function so the parsing rules
//! can be exercised without touching real environment variables. Missing
//! media host credentials or a missing database URL fail startup; there is no
//! built-in fallback for either.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";
pub const DEFAULT_FOLDER: &str = "visits";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error(
        "media host credentials missing: set CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET, \
         or CLOUDINARY_UPLOAD_PRESET"
    )]
    MissingCredentials,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Digest used for signed uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unknown signature algorithm `{other}` (expected sha1 or sha256)")),
        }
    }
}

/// How uploads authenticate against the media host.
#[derive(Clone, PartialEq, Eq)]
pub enum UploadAuth {
    Unsigned {
        upload_preset: String,
    },
    Signed {
        api_key: String,
        api_secret: String,
        algorithm: SignatureAlgorithm,
    },
}

impl fmt::Debug for UploadAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned { upload_preset } => f
                .debug_struct("Unsigned")
                .field("upload_preset", upload_preset)
                .finish(),
            Self::Signed {
                api_key, algorithm, ..
            } => f
                .debug_struct("Signed")
                .field("api_key", api_key)
                .field("api_secret", &"<redacted>")
                .field("algorithm", algorithm)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    /// Fully resolved `.../v1_1/{cloud_name}/image/upload` endpoint.
    pub upload_url: Url,
    pub folder: String,
    pub auth: UploadAuth,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub analytics_url: Option<Url>,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub run_migrations: bool,
    pub cloudinary: CloudinaryConfig,
    pub server: ServerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &redact_url(&self.database_url))
            .field("run_migrations", &self.run_migrations)
            .field("cloudinary", &self.cloudinary)
            .field("server", &self.server)
            .finish()
    }
}

/// The URL with its password masked. Unparseable input is hidden entirely.
fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("redacted")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<redacted>".to_string(),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let cloud_name =
            get("CLOUDINARY_CLOUD_NAME").ok_or(ConfigError::Missing("CLOUDINARY_CLOUD_NAME"))?;

        let auth = match (
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
            get("CLOUDINARY_UPLOAD_PRESET"),
        ) {
            (Some(api_key), Some(api_secret), _) => UploadAuth::Signed {
                api_key,
                api_secret,
                algorithm: parse_or(&get, "CLOUDINARY_SIGNATURE_ALGORITHM", SignatureAlgorithm::Sha1)?,
            },
            (Some(_), None, _) => return Err(ConfigError::Missing("CLOUDINARY_API_SECRET")),
            (None, Some(_), _) => return Err(ConfigError::Missing("CLOUDINARY_API_KEY")),
            (None, None, Some(upload_preset)) => UploadAuth::Unsigned { upload_preset },
            (None, None, None) => return Err(ConfigError::MissingCredentials),
        };

        let api_base = get("CLOUDINARY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let upload_url = upload_url(&api_base, &cloud_name)?;

        let timeout_secs: u64 = parse_or(&get, "CLOUDINARY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CLOUDINARY_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let cloudinary = CloudinaryConfig {
            cloud_name,
            upload_url,
            folder: get("CLOUDINARY_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
            auth,
            timeout: Duration::from_secs(timeout_secs),
        };

        let analytics_url = get("ANALYTICS_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    key: "ANALYTICS_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let server = ServerConfig {
            bind_addr: parse_setting(
                "BIND_ADDR",
                &get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            )?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            analytics_url,
        };

        let run_migrations = match get("RUN_MIGRATIONS") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "RUN_MIGRATIONS",
                reason: format!("expected true or false, got `{raw}`"),
            })?,
        };

        Ok(Self {
            database_url,
            run_migrations,
            cloudinary,
            server,
        })
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => parse_setting(key, &raw),
    }
}

fn parse_setting<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn upload_url(api_base: &str, cloud_name: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "CLOUDINARY_API_BASE",
        reason,
    };

    let mut base = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(invalid(format!("`{api_base}` cannot be used as a base URL")));
    }
    // Url::join replaces the last segment unless the path ends with a slash.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(&format!("v1_1/{cloud_name}/image/upload"))
        .map_err(|e| invalid(e.to_string()))
}
