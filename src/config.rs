//! Runtime configuration
//!
//! Everything is read from environment variables, the same names the site's
//! `.env` file uses. Optional integrations (Cloudinary, ImageKit, Firebase, SMTP)
//! are switched off when their credentials are absent.

use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use log::{info, warn};

use crate::error::{AppError, AppResult};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DATA_DIR: &str = "database";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_SESSION_TTL_HOURS: u64 = 24;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_MB: usize = 10;
const DEFAULT_SMTP_PORT: u16 = 465;

/// Which image host uploads are proxied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProviderKind {
    Cloudinary,
    ImageKit,
    Local,
}

impl FromStr for ImageProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudinary" => Ok(Self::Cloudinary),
            "imagekit" => Ok(Self::ImageKit),
            "local" | "" => Ok(Self::Local),
            other => Err(format!("unknown image provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct ImageKitConfig {
    pub public_key: String,
    pub private_key: String,
    pub url_endpoint: String,
}

/// Firebase Realtime Database used as the remote copy of the content
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub starttls: bool,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    /// Allowed CORS origins (empty means any origin)
    pub cors_origins: Vec<String>,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    pub session_ttl: Duration,
    pub cache_ttl: Duration,
    pub max_upload_bytes: usize,
    pub image_provider: ImageProviderKind,
    pub cloudinary: Option<CloudinaryConfig>,
    pub imagekit: Option<ImageKitConfig>,
    pub firebase: Option<FirebaseConfig>,
    pub smtp: Option<SmtpConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            cors_origins: Vec::new(),
            admin_username: "admin".to_string(),
            admin_password: None,
            admin_email: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_HOURS * 3600),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            image_provider: ImageProviderKind::Local,
            cloudinary: None,
            imagekit: None,
            firebase: None,
            smtp: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut errors: Vec<String> = Vec::new();

        let port = parse_or(&get, "PORT", DEFAULT_PORT, &mut errors);
        let session_hours = parse_or(
            &get,
            "SESSION_TTL_HOURS",
            DEFAULT_SESSION_TTL_HOURS,
            &mut errors,
        );
        let cache_secs = parse_or(&get, "CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS, &mut errors);
        let max_upload_mb = parse_or(&get, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB, &mut errors);
        let smtp_port = parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT, &mut errors);
        let session_secs = session_hours.checked_mul(3600).unwrap_or_else(|| {
            errors.push(format!("SESSION_TTL_HOURS value {session_hours} is too large"));
            DEFAULT_SESSION_TTL_HOURS * 3600
        });
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).unwrap_or_else(|| {
            errors.push(format!("MAX_UPLOAD_MB value {max_upload_mb} is too large"));
            DEFAULT_MAX_UPLOAD_MB * 1024 * 1024
        });
        let smtp_starttls = parse_or(&get, "SMTP_STARTTLS", false, &mut errors);

        let image_provider = match get("IMAGE_PROVIDER") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                errors.push(format!("IMAGE_PROVIDER: {e}"));
                ImageProviderKind::Local
            }),
            None => ImageProviderKind::Local,
        };

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let imagekit = match (
            get("IMAGEKIT_PUBLIC_KEY"),
            get("IMAGEKIT_PRIVATE_KEY"),
            get("IMAGEKIT_URL_ENDPOINT"),
        ) {
            (Some(public_key), Some(private_key), Some(url_endpoint)) => Some(ImageKitConfig {
                public_key,
                private_key,
                url_endpoint,
            }),
            _ => None,
        };

        let firebase = get("FIREBASE_DATABASE_URL").map(|url| FirebaseConfig {
            database_url: url.trim_end_matches('/').to_string(),
            secret: get("FIREBASE_DATABASE_SECRET"),
        });

        let smtp = match (get("SMTP_HOST"), get("SMTP_USERNAME"), get("SMTP_PASSWORD")) {
            (Some(host), Some(username), Some(password)) => Some(SmtpConfig {
                host,
                port: smtp_port,
                from: get("MAIL_FROM").unwrap_or_else(|| username.clone()),
                username,
                password,
                starttls: smtp_starttls,
            }),
            _ => None,
        };

        let config = Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            upload_dir: PathBuf::from(
                get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.into()),
            ),
            cors_origins: get("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().trim_end_matches('/').to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            admin_username: get("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: get("ADMIN_PASSWORD"),
            admin_email: get("ADMIN_EMAIL"),
            session_ttl: Duration::from_secs(session_secs),
            cache_ttl: Duration::from_secs(cache_secs),
            max_upload_bytes,
            image_provider,
            cloudinary,
            imagekit,
            firebase,
            smtp,
        };

        if let Err(e) = config.validate() {
            errors.push(e.to_string());
        }

        if !errors.is_empty() {
            return Err(AppError::Internal(format!(
                "invalid configuration: {}",
                errors.join("; ")
            )));
        }

        Ok(config.resolve_provider())
    }

    /// Validate value ranges, reporting every problem at once
    pub fn validate(&self) -> AppResult<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.port == 0 {
            errors.push("PORT must be positive".to_string());
        }
        if self.session_ttl.is_zero() {
            errors.push("SESSION_TTL_HOURS must be positive".to_string());
        }
        if self.max_upload_bytes == 0 {
            errors.push("MAX_UPLOAD_MB must be positive".to_string());
        }
        if self.admin_username.trim().is_empty() {
            errors.push("ADMIN_USERNAME must not be empty".to_string());
        }
        if let Some(firebase) = &self.firebase {
            if !firebase.database_url.starts_with("https://")
                && !firebase.database_url.starts_with("http://")
            {
                errors.push("FIREBASE_DATABASE_URL must be an http(s) URL".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Internal(errors.join("; ")))
        }
    }

    /// Fall back to local storage when the chosen provider has no credentials
    fn resolve_provider(mut self) -> Self {
        let missing = match self.image_provider {
            ImageProviderKind::Cloudinary => self.cloudinary.is_none(),
            ImageProviderKind::ImageKit => self.imagekit.is_none(),
            ImageProviderKind::Local => false,
        };
        if missing {
            warn!(
                "{:?} selected but its credentials are incomplete, storing uploads locally",
                self.image_provider
            );
            self.image_provider = ImageProviderKind::Local;
        }
        if self.firebase.is_none() {
            info!("FIREBASE_DATABASE_URL not set, content is stored in local JSON only");
        }
        if self.smtp.is_none() {
            info!("SMTP not configured, notification emails will only be logged");
        }
        self
    }

    pub fn listen_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Internal(format!("invalid listen address: {e}")))
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T, errors: &mut Vec<String>) -> T
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            errors.push(format!("invalid {key} value '{raw}': {e}"));
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.data_dir, PathBuf::from("database"));
        assert_eq!(config.image_provider, ImageProviderKind::Local);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.smtp.is_none());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_invalid_values_are_collected() {
        let err = Config::from_lookup(lookup(&[("PORT", "abc"), ("MAX_UPLOAD_MB", "x")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("PORT"));
        assert!(err.contains("MAX_UPLOAD_MB"));
    }

    #[test]
    fn test_oversized_durations_and_limits_are_rejected() {
        let hours = u64::MAX.to_string();
        let megabytes = usize::MAX.to_string();
        let err = Config::from_lookup(lookup(&[
            ("SESSION_TTL_HOURS", hours.as_str()),
            ("MAX_UPLOAD_MB", megabytes.as_str()),
        ]))
        .unwrap_err()
        .to_string();
        assert!(err.contains("SESSION_TTL_HOURS value"));
        assert!(err.contains("MAX_UPLOAD_MB value"));
    }

    #[test]
    fn test_provider_falls_back_without_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("IMAGE_PROVIDER", "cloudinary"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
        ]))
        .unwrap();
        assert_eq!(config.image_provider, ImageProviderKind::Local);

        let config = Config::from_lookup(lookup(&[
            ("IMAGE_PROVIDER", "Cloudinary"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.image_provider, ImageProviderKind::Cloudinary);
    }

    #[test]
    fn test_cors_and_firebase() {
        let config = Config::from_lookup(lookup(&[
            ("CORS_ORIGINS", "https://me.dev/, http://localhost:3000 ,"),
            ("FIREBASE_DATABASE_URL", "https://site.firebaseio.com/"),
        ]))
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://me.dev".to_string(), "http://localhost:3000".to_string()]
        );
        assert_eq!(
            config.firebase.unwrap().database_url,
            "https://site.firebaseio.com"
        );
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::from_lookup(lookup(&[("HOST", "127.0.0.1"), ("PORT", "8080")]))
            .unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }
}
