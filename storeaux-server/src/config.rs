//! Configuration loading.
//!
//! Settings come from a TOML file, with CLI override for the listen
//! address and environment-variable overrides for everything secret or
//! deployment-specific: `STRIPE_SECRET_KEY`, `GRAPHQL_URL`, `ADMIN_EMAIL`,
//! `ADMIN_PASSWORD`, `STOREFRONT_URL`, `DASHBOARD_URL`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use storeaux_core::backend::BackendConfig;
use storeaux_core::gateway::StripeConfig;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid url for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: url::ParseError,
    },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub pages: PagesConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Payment gateway section.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    /// Secret API key. `STRIPE_SECRET_KEY` overrides.
    #[serde(default)]
    pub secret_key: String,
    /// API base URL. Overridable for tests.
    #[serde(default = "default_gateway_base")]
    pub api_base: String,
    /// Fixed charge amount in the currency's minor unit.
    ///
    /// Not derived from the order total; inherited from the source system
    /// and kept configurable instead. See DESIGN.md.
    #[serde(default = "default_amount")]
    pub amount: i64,
    /// Three-letter currency code, lowercase.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_base: default_gateway_base(),
            amount: default_amount(),
            currency: default_currency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gateway_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_amount() -> i64 {
    1099
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Storefront backend (GraphQL) section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    /// GraphQL endpoint. `GRAPHQL_URL` overrides.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// Admin credentials for settlement. `ADMIN_EMAIL` / `ADMIN_PASSWORD`
    /// override.
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub admin_password: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            admin_email: String::new(),
            admin_password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_graphql_url() -> String {
    "http://0.0.0.0:8000/graphql/".to_string()
}

/// URLs served by the landing endpoint. `STOREFRONT_URL` / `DASHBOARD_URL`
/// override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagesConfig {
    #[serde(default)]
    pub storefront_url: String,
    #[serde(default)]
    pub dashboard_url: String,
}

/// Fully resolved configuration, ready to construct the clients.
pub struct LoadedConfig {
    pub server: ServerSection,
    pub gateway: StripeConfig,
    pub backend: BackendConfig,
    pub pages: PagesConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file (a missing file falls back to defaults, so a
    ///    fully env-driven deployment needs no file at all)
    /// 2. Apply environment-variable overrides
    /// 3. Apply CLI overrides
    /// 4. Validate the result
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    "Config file not found, using defaults and environment"
                );
                toml::from_str("")?
            }
            Err(e) => return Err(e.into()),
        };

        apply_env_overrides(&mut file_config);

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;
        build_loaded_config(file_config)
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.gateway.secret_key.is_empty() {
            return Err(ConfigError::Validation(
                "gateway secret key is not set (gateway.secret_key or STRIPE_SECRET_KEY)"
                    .to_string(),
            ));
        }
        if config.backend.admin_email.is_empty() || config.backend.admin_password.is_empty() {
            return Err(ConfigError::Validation(
                "admin credentials are not set (backend section or ADMIN_EMAIL/ADMIN_PASSWORD)"
                    .to_string(),
            ));
        }
        if config.gateway.amount <= 0 {
            return Err(ConfigError::Validation(
                "gateway.amount must be a positive minor-unit amount".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_env_overrides(config: &mut FileConfig) {
    let overrides: [(&str, &mut String); 6] = [
        ("STRIPE_SECRET_KEY", &mut config.gateway.secret_key),
        ("GRAPHQL_URL", &mut config.backend.graphql_url),
        ("ADMIN_EMAIL", &mut config.backend.admin_email),
        ("ADMIN_PASSWORD", &mut config.backend.admin_password),
        ("STOREFRONT_URL", &mut config.pages.storefront_url),
        ("DASHBOARD_URL", &mut config.pages.dashboard_url),
    ];
    for (var, slot) in overrides {
        if let Ok(value) = std::env::var(var) {
            *slot = value;
        }
    }
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let api_base: Url =
        file_config
            .gateway
            .api_base
            .parse()
            .map_err(|source| ConfigError::InvalidUrl {
                field: "gateway.api_base",
                source,
            })?;
    let graphql_url: Url =
        file_config
            .backend
            .graphql_url
            .parse()
            .map_err(|source| ConfigError::InvalidUrl {
                field: "backend.graphql_url",
                source,
            })?;

    Ok(LoadedConfig {
        server: file_config.server,
        gateway: StripeConfig {
            api_base,
            secret_key: file_config.gateway.secret_key,
            amount: file_config.gateway.amount,
            currency: file_config.gateway.currency,
            timeout: Duration::from_secs(file_config.gateway.timeout_secs),
        },
        backend: BackendConfig {
            graphql_url,
            admin_email: file_config.backend.admin_email,
            admin_password: file_config.backend.admin_password,
            timeout: Duration::from_secs(file_config.backend.timeout_secs),
        },
        pages: file_config.pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[gateway]
secret_key = "sk_test_abc"
amount = 2500
currency = "eur"

[backend]
graphql_url = "http://backend:8000/graphql/"
admin_email = "admin@example.com"
admin_password = "hunter2"

[pages]
storefront_url = "https://shop.example.com"
dashboard_url = "https://dashboard.example.com"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.gateway.amount, 2500);
        assert_eq!(config.gateway.currency, "eur");
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.backend.admin_email, "admin@example.com");
        assert_eq!(config.pages.storefront_url, "https://shop.example.com");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.gateway.api_base, "https://api.stripe.com");
        assert_eq!(config.gateway.amount, 1099);
        assert_eq!(config.backend.graphql_url, "http://0.0.0.0:8000/graphql/");
        assert!(config.gateway.secret_key.is_empty());
    }

    #[test]
    fn missing_secret_key_fails_validation() {
        let loader = ConfigLoader::new("does-not-matter.toml", None);
        let config: FileConfig = toml::from_str(
            r#"
[backend]
admin_email = "admin@example.com"
admin_password = "hunter2"
"#,
        )
        .unwrap();
        let err = loader.validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn loaded_config_builds_client_configs() {
        let config: FileConfig = toml::from_str(
            r#"
[gateway]
secret_key = "sk_test_abc"

[backend]
admin_email = "admin@example.com"
admin_password = "hunter2"
"#,
        )
        .unwrap();
        let loaded = build_loaded_config(config).unwrap();
        assert_eq!(loaded.gateway.timeout, Duration::from_secs(10));
        assert_eq!(loaded.backend.graphql_url.as_str(), "http://0.0.0.0:8000/graphql/");
    }
}
