//! API configuration

use serde::Deserialize;

use core_kernel::{Currency, Timezone};
use domain_billing::{BillingSettings, Locale};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "postgres://localhost/boarding_billing";

/// API configuration
///
/// Read from `API_`-prefixed environment variables; anything unset falls
/// back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub database_url: String,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// ISO code debt totals are reported in
    pub currency: String,
    /// `vi` or `en`, for the amount in words
    pub locale: String,
    /// IANA timezone that decides the current billing month
    pub timezone: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_level: "info".to_string(),
            currency: "VND".to_string(),
            locale: "vi".to_string(),
            timezone: "Asia/Ho_Chi_Minh".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("jwt_expiration_secs", defaults.jwt_expiration_secs)?
            .set_default("database_url", defaults.database_url)?
            .set_default("log_level", defaults.log_level)?
            .set_default("currency", defaults.currency)?
            .set_default("locale", defaults.locale)?
            .set_default("timezone", defaults.timezone)?
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Domain settings derived from `currency` and `locale`
    pub fn billing_settings(&self) -> Result<BillingSettings, config::ConfigError> {
        let currency: Currency = self
            .currency
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("API_CURRENCY: {}", e)))?;
        let locale: Locale = self
            .locale
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("API_LOCALE: {}", e)))?;

        Ok(BillingSettings {
            currency,
            locale,
            ..BillingSettings::default()
        })
    }

    pub fn timezone(&self) -> Result<Timezone, config::ConfigError> {
        Timezone::parse(&self.timezone).map_err(|e| config::ConfigError::Message(format!("API_TIMEZONE: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_vietnamese_settings() {
        let config = ApiConfig::default();
        let settings = config.billing_settings().unwrap();
        assert_eq!(settings.currency, Currency::VND);
        assert_eq!(settings.locale, Locale::Vi);
        assert_eq!(config.timezone().unwrap().name(), "Asia/Ho_Chi_Minh");
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_unknown_locale_is_a_config_error() {
        let config = ApiConfig {
            locale: "fr".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.billing_settings().is_err());
    }

    #[test]
    fn test_bad_timezone_is_a_config_error() {
        let config = ApiConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.timezone().is_err());
    }
}
