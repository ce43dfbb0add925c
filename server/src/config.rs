use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::{bail, Context};

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// `None` runs the service on the in-memory stores.
    pub mongo_uri: Option<String>,
    pub mongo_database: String,

    pub patient_jwt_secret: String,
    pub admin_jwt_secret: String,
    pub jwt_expires: time::Duration,

    pub cookie_expires: time::Duration,
    pub cookie_secure: bool,

    pub allowed_origins: Vec<String>,

    pub upload_dir: PathBuf,
    pub upload_public_url: String,

    pub request_timeout: std::time::Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|it| !it.trim().is_empty());

        let patient_jwt_secret = var("PATIENT_JWT_SECRET")
            .context("PATIENT_JWT_SECRET must be set")?;
        let admin_jwt_secret = var("ADMIN_JWT_SECRET").context("ADMIN_JWT_SECRET must be set")?;

        if patient_jwt_secret == admin_jwt_secret {
            bail!("PATIENT_JWT_SECRET and ADMIN_JWT_SECRET must differ");
        }

        let jwt_expires_days: i64 = parse_or(var("JWT_EXPIRES_DAYS"), "JWT_EXPIRES_DAYS", 7)?;
        let cookie_expire_days: i64 = parse_or(var("COOKIE_EXPIRE_DAYS"), "COOKIE_EXPIRE_DAYS", 7)?;
        let request_timeout_secs: u64 =
            parse_or(var("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 30)?;

        if jwt_expires_days <= 0 {
            bail!("JWT_EXPIRES_DAYS must be positive, got {jwt_expires_days}");
        }
        if cookie_expire_days <= 0 {
            bail!("COOKIE_EXPIRE_DAYS must be positive, got {cookie_expire_days}");
        }
        if request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }

        let allowed_origins = ["FRONTEND_URL", "DASHBOARD_URL"]
            .into_iter()
            .filter_map(|key| var(key))
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(var("PORT"), "PORT", 8080)?,

            mongo_uri: var("MONGO_URI"),
            mongo_database: var("MONGO_DATABASE").unwrap_or_else(|| "clinic".to_string()),

            patient_jwt_secret,
            admin_jwt_secret,
            jwt_expires: time::Duration::days(jwt_expires_days),

            cookie_expires: time::Duration::days(cookie_expire_days),
            cookie_secure: parse_or(var("COOKIE_SECURE"), "COOKIE_SECURE", true)?,

            allowed_origins,

            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            upload_public_url: var("UPLOAD_PUBLIC_URL").unwrap_or_else(|| "/uploads".to_string()),

            request_timeout: std::time::Duration::from_secs(request_timeout_secs),
        })
    }

    pub fn address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {value}")),
        None => Ok(default),
    }
}
