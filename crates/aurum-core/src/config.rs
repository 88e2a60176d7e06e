//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use aurum_links::{LaunchEnvironment, ProviderLink};

use crate::error::CoreError;
use crate::Result;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
pub const DEFAULT_AUTH_URL: &str = "https://auth.emergentagent.com";
pub const DEFAULT_APP_SCHEME: &str = "aurum";

const ENV_BACKEND_URL: &str = "AURUM_BACKEND_URL";
const ENV_AUTH_URL: &str = "AURUM_AUTH_URL";
const ENV_DATA_DIR: &str = "AURUM_DATA_DIR";
const ENV_APP_SCHEME: &str = "AURUM_APP_SCHEME";
const ENV_WEB_ORIGIN: &str = "AURUM_WEB_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the shop backend
    pub backend_url: String,
    /// Identity provider base URL
    pub auth_url: String,
    /// Path to the database file
    pub database_path: PathBuf,
    /// URL scheme the app is registered for
    pub app_scheme: String,
    /// Page origin when running embedded in a web page
    pub web_origin: Option<String>,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            database_path: data_dir.join("aurum.db"),
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
            web_origin: None,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Aurum"))
            .unwrap_or_else(|| PathBuf::from(".aurum"))
    }

    /// Defaults overridden by `AURUM_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(Self::data_dir);
        let mut config = Self::new(data_dir);

        if let Some(url) = var(ENV_BACKEND_URL) {
            config.backend_url = url;
        }
        if let Some(url) = var(ENV_AUTH_URL) {
            config.auth_url = url;
        }
        if let Some(scheme) = var(ENV_APP_SCHEME) {
            config.app_scheme = scheme;
        }
        config.web_origin = var(ENV_WEB_ORIGIN);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.backend_url()?;
        self.provider_link()?;
        self.launch_environment()?;
        Ok(())
    }

    pub fn backend_url(&self) -> Result<Url> {
        Url::parse(&self.backend_url)
            .map_err(|e| CoreError::Config(format!("backend URL {:?}: {}", self.backend_url, e)))
    }

    pub fn provider_link(&self) -> Result<ProviderLink> {
        ProviderLink::new(&self.auth_url)
            .map_err(|e| CoreError::Config(format!("auth URL {:?}: {}", self.auth_url, e)))
    }

    /// Embedded when a page origin is configured, standalone otherwise
    pub fn launch_environment(&self) -> Result<LaunchEnvironment> {
        let environment = match &self.web_origin {
            Some(origin) => LaunchEnvironment::embedded(origin),
            None => LaunchEnvironment::standalone(&self.app_scheme),
        };
        environment.map_err(|e| CoreError::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
