use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};

use crate::error::ConfigError;
use crate::todo_service::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub database_name: String,
    pub container_name: String,
    pub page_size: usize,
    /// Identity provider segment of `/.auth/login/<provider>`.
    pub login_provider: String,
    pub require_principal_id: bool,
    /// Reject mutations from anonymous requests.
    pub require_auth: bool,
    /// Build redirect origins from `X-Forwarded-Proto`/`X-Forwarded-Host`.
    /// Only safe behind a proxy that overwrites them.
    pub trust_forwarded_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: PathBuf::from("./data"),
            database_name: "todos".to_string(),
            container_name: "items".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            login_provider: "okta".to_string(),
            require_principal_id: true,
            require_auth: false,
            trust_forwarded_headers: false,
        }
    }
}

impl Config {
    /// Reads `TODO_*` environment variables over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: try_load("TODO_PORT", defaults.port)?,
            data_dir: PathBuf::from(try_load::<String, _>(
                "TODO_DATA_DIR",
                defaults.data_dir.display(),
            )?),
            database_name: try_load("TODO_DATABASE_NAME", defaults.database_name)?,
            container_name: try_load("TODO_CONTAINER_NAME", defaults.container_name)?,
            page_size: try_load("TODO_PAGE_SIZE", defaults.page_size)?,
            login_provider: try_load("TODO_LOGIN_PROVIDER", defaults.login_provider)?,
            require_principal_id: try_load("TODO_REQUIRE_PRINCIPAL_ID", defaults.require_principal_id)?,
            require_auth: try_load("TODO_REQUIRE_AUTH", defaults.require_auth)?,
            trust_forwarded_headers: try_load(
                "TODO_TRUST_FORWARDED_HEADERS",
                defaults.trust_forwarded_headers,
            )?,
        })
    }
}

fn try_load<T, D>(key: &str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    D: Display,
{
    let raw = match env::var(key) {
        Ok(value) => value,
        Err(env::VarError::NotPresent) => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
        Err(e) => {
            warn!("Environment variable {key} unreadable ({e}), using default: {default}");
            default.to_string()
        }
    };

    raw.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }
    })
}
