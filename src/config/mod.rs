//! Configuration management for dirk-wallet
//!
//! Supports loading configuration from:
//! - Built-in defaults
//! - Config file (config.toml, config.json, ...)
//! - Environment variables (DIRK_WALLET__*)

use crate::api::Credentials;
use crate::endpoint::Endpoint;
use crate::errors::{Result, WalletError};
use crate::wallet::WalletOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
///
/// Sections missing from every source take their defaults; `validate()`
/// reports what is still required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wallet to open
    pub wallet: WalletConfig,

    /// Signer nodes, in dispatch order
    pub endpoints: Vec<Endpoint>,

    /// Client TLS material
    pub credentials: CredentialsConfig,

    /// Fan-out tuning
    pub dispatch: DispatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub name: String,
}

/// Paths to the PEM files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub ca_cert: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_cert: PathBuf::from("./certs/client.crt"),
            client_key: PathBuf::from("./certs/client.key"),
            ca_cert: PathBuf::from("./certs/ca.crt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bound on one request when the caller sets no deadline
    pub timeout_ms: u64,

    /// Bound on establishing a channel to one endpoint
    pub connect_timeout_ms: u64,

    /// Approvals required per request (default: strict majority)
    pub threshold: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            threshold: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| WalletError::ConfigError(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder
                .add_source(config::File::with_name("dirk-wallet").required(false))
                .add_source(config::File::with_name("/etc/dirk-wallet/config").required(false));
        }

        // DIRK_WALLET__DISPATCH__TIMEOUT_MS, etc.
        builder = builder.add_source(
            config::Environment::with_prefix("DIRK_WALLET")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| WalletError::ConfigError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| WalletError::ConfigError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.wallet.name.is_empty() || self.wallet.name.contains('/') {
            return Err(WalletError::ConfigError(format!(
                "invalid wallet name \"{}\"",
                self.wallet.name
            )));
        }

        if self.endpoints.is_empty() {
            return Err(WalletError::ConfigError(
                "at least one endpoint is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if !seen.insert(endpoint) {
                return Err(WalletError::ConfigError(format!(
                    "duplicate endpoint {}",
                    endpoint
                )));
            }
        }

        if let Some(threshold) = self.dispatch.threshold {
            if threshold == 0 || threshold > self.endpoints.len() {
                return Err(WalletError::ConfigError(format!(
                    "threshold {} out of range for {} endpoints",
                    threshold,
                    self.endpoints.len()
                )));
            }
        }

        if self.dispatch.timeout_ms == 0 {
            return Err(WalletError::ConfigError(
                "dispatch timeout must be non-zero".to_string(),
            ));
        }

        for (what, path) in [
            ("client certificate", &self.credentials.client_cert),
            ("client key", &self.credentials.client_key),
            ("CA certificate", &self.credentials.ca_cert),
        ] {
            if path.as_os_str().is_empty() {
                return Err(WalletError::ConfigError(format!("{} path not set", what)));
            }
        }

        info!(
            "Configuration valid: wallet \"{}\" on {} endpoint(s)",
            self.wallet.name,
            self.endpoints.len()
        );
        Ok(())
    }

    /// Load the PEM files named by the configuration.
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::from_files(
            &self.credentials.client_cert,
            &self.credentials.client_key,
            &self.credentials.ca_cert,
        )
    }

    pub fn wallet_options(&self) -> WalletOptions {
        WalletOptions {
            threshold: self.dispatch.threshold,
            timeout: Duration::from_millis(self.dispatch.timeout_ms),
            connect_timeout: Duration::from_millis(self.dispatch.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> Config {
        Config {
            wallet: WalletConfig {
                name: "Wallet 1".to_string(),
            },
            endpoints: vec![
                Endpoint::new("signer-test01", 12001),
                Endpoint::new("signer-test02", 12002),
                Endpoint::new("signer-test03", 12003),
            ],
            ..Default::default()
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.dispatch.timeout_ms, 10_000);
        assert!(config.dispatch.threshold.is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut config = valid();
        config.endpoints.push(Endpoint::new("signer-test01", 12001));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mut config = valid();
        config.dispatch.threshold = Some(3);
        assert!(config.validate().is_ok());
        config.dispatch.threshold = Some(4);
        assert!(config.validate().is_err());
        config.dispatch.threshold = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credential_path() {
        let mut config = valid();
        config.credentials.client_key = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client key"));
    }

    #[test]
    fn test_wallet_options() {
        let mut config = valid();
        config.dispatch.threshold = Some(2);
        config.dispatch.timeout_ms = 1500;
        let options = config.wallet_options();
        assert_eq!(options.threshold, Some(2));
        assert_eq!(options.timeout, Duration::from_millis(1500));
        assert_eq!(options.connect_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [wallet]
            name = "Wallet 1"

            [[endpoints]]
            host = "signer-test01"
            port = 12001

            [[endpoints]]
            host = "signer-test02"
            port = 12002

            [dispatch]
            connect_timeout_ms = 250
            threshold = 2
            "#,
        );

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.wallet.name, "Wallet 1");
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[1], Endpoint::new("signer-test02", 12002));
        assert_eq!(config.dispatch.connect_timeout_ms, 250);
        assert_eq!(config.dispatch.threshold, Some(2));
        assert_eq!(
            config.credentials.ca_cert,
            PathBuf::from("./certs/ca.crt")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_endpoints_reported_by_validate() {
        let file = write_config(
            r#"
            [wallet]
            name = "Wallet 1"
            "#,
        );

        let config = Config::load(file.path().to_str()).unwrap();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.dispatch.timeout_ms, 10_000);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one endpoint is required"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = Config::load(Some("/nonexistent/dirk-wallet-config.toml"));
        assert!(matches!(result, Err(WalletError::ConfigError(_))));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(
            r#"
            [logging]
            format = "pretty"
            "#,
        );
        std::env::set_var("DIRK_WALLET__LOGGING__FORMAT", "json");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("DIRK_WALLET__LOGGING__FORMAT");
        assert_eq!(config.unwrap().logging.format, "json");
    }
}
