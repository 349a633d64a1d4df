//! Service Configuration
//!
//! Loaded from environment variables (optionally seeded from a `.env` file by
//! the binary). Every variable has a default; a variable that is set but
//! cannot be parsed is an error rather than silently ignored.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::order::{Currency, Money};
use crate::domain::order::pricing::PricingPolicy;
use crate::utils::RetryConfig;

/// Pricing inputs for the flat-rate tax and shipping policies.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSettings {
    /// Tax rate in percent, applied to the discounted merchandise total.
    pub tax_rate_percent: Decimal,
    /// Flat shipping charge per order.
    pub shipping_flat: Decimal,
    /// Merchandise total at or above which shipping is free.
    pub free_shipping_over: Option<Decimal>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            tax_rate_percent: Decimal::ZERO,
            shipping_flat: Decimal::ZERO,
            free_shipping_over: None,
        }
    }
}

impl PricingSettings {
    #[must_use]
    pub fn policy(&self) -> PricingPolicy {
        PricingPolicy::flat(
            self.tax_rate_percent,
            Money::new(self.shipping_flat),
            self.free_shipping_over.map(Money::new),
        )
    }
}

/// Re-run settings for writes that lose an optimistic concurrency race.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSettings {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 8,
            retry_delay: Duration::from_millis(5),
        }
    }
}

impl ConflictSettings {
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::for_conflicts(self.retry_attempts, self.retry_delay)
    }
}

/// Fulfillment gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentSettings {
    /// Simulated gateway latency per request.
    pub latency: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            latency: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl FulfillmentSettings {
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            ..RetryConfig::default()
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Currency for orders created without one.
    pub default_currency: Currency,
    pub pricing: PricingSettings,
    pub conflicts: ConflictSettings,
    pub fulfillment: FulfillmentSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::usd(),
            pricing: PricingSettings::default(),
            conflicts: ConflictSettings::default(),
            fulfillment: FulfillmentSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env { lookup };

        let default_currency = match env.get("ORDER_DEFAULT_CURRENCY") {
            Some(code) => Currency::parse(&code).map_err(|e| ConfigError::InvalidValue {
                key: "ORDER_DEFAULT_CURRENCY".to_string(),
                value: code.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.default_currency,
        };

        let pricing = PricingSettings {
            tax_rate_percent: env.parse("ORDER_TAX_RATE_PERCENT", defaults.pricing.tax_rate_percent)?,
            shipping_flat: env.parse("ORDER_SHIPPING_FLAT", defaults.pricing.shipping_flat)?,
            free_shipping_over: env.parse_optional("ORDER_FREE_SHIPPING_OVER")?,
        };
        if pricing.tax_rate_percent.is_sign_negative() {
            return Err(ConfigError::negative("ORDER_TAX_RATE_PERCENT", pricing.tax_rate_percent));
        }
        if pricing.shipping_flat.is_sign_negative() {
            return Err(ConfigError::negative("ORDER_SHIPPING_FLAT", pricing.shipping_flat));
        }

        let conflicts = ConflictSettings {
            retry_attempts: env.parse("ORDER_CONFLICT_RETRY_ATTEMPTS", defaults.conflicts.retry_attempts)?,
            retry_delay: env
                .parse_optional("ORDER_CONFLICT_RETRY_DELAY_MS")?
                .map_or(defaults.conflicts.retry_delay, Duration::from_millis),
        };

        let fulfillment = FulfillmentSettings {
            latency: env
                .parse_optional("FULFILLMENT_LATENCY_MS")?
                .map_or(defaults.fulfillment.latency, Duration::from_millis),
            max_attempts: env.parse("FULFILLMENT_MAX_ATTEMPTS", defaults.fulfillment.max_attempts)?,
        };

        if conflicts.retry_attempts == 0 {
            return Err(ConfigError::zero("ORDER_CONFLICT_RETRY_ATTEMPTS"));
        }
        if fulfillment.max_attempts == 0 {
            return Err(ConfigError::zero("FULFILLMENT_MAX_ATTEMPTS"));
        }

        Ok(Self {
            default_currency,
            pricing,
            conflicts,
            fulfillment,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set but its value is unusable.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn negative(key: &str, value: Decimal) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must not be negative".to_string(),
        }
    }

    fn zero(key: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, with blank treated as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_optional<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }
}
