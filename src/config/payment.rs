//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: SecretString,

    /// Webhook signing secret
    pub stripe_webhook_secret: SecretString,

    /// Maximum age of a signed webhook timestamp, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout for each Stripe API call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hosts the billing portal may return to (comma-separated)
    pub portal_return_hosts: Option<String>,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    pub fn webhook_tolerance(&self) -> Duration {
        Duration::from_secs(self.webhook_tolerance_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn portal_return_hosts_list(&self) -> Vec<String> {
        self.portal_return_hosts
            .as_ref()
            .map(|s| {
                s.split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.webhook_tolerance_secs == 0 || self.webhook_tolerance_secs > 3600 {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        if url::Url::parse(&self.api_base_url).is_err() {
            return Err(ValidationError::InvalidApiBaseUrl);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("payment.request_timeout_secs"));
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: SecretString::new(String::new()),
            stripe_webhook_secret: SecretString::new(String::new()),
            webhook_tolerance_secs: default_webhook_tolerance(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            portal_return_hosts: None,
        }
    }
}

fn default_webhook_tolerance() -> u64 {
    300
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    fn valid() -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: secret("sk_test_abcd1234"),
            stripe_webhook_secret: secret("whsec_xyz789"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PaymentConfig::default();
        assert_eq!(config.webhook_tolerance(), Duration::from_secs(300));
        assert_eq!(config.api_base_url, "https://api.stripe.com");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_is_test_mode() {
        assert!(valid().is_test_mode());
        let live = PaymentConfig {
            stripe_api_key: secret("sk_live_xxx"),
            ..valid()
        };
        assert!(!live.is_test_mode());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("sk_test_abcd1234"));
        assert!(!rendered.contains("whsec_xyz789"));
    }

    #[test]
    fn test_validation_missing_keys() {
        assert_eq!(
            PaymentConfig::default().validate(),
            Err(ValidationError::MissingRequired("STRIPE_API_KEY"))
        );
        let config = PaymentConfig {
            stripe_webhook_secret: secret(""),
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"))
        );
    }

    #[test]
    fn test_validation_key_prefixes() {
        let publishable = PaymentConfig {
            stripe_api_key: secret("pk_test_xxx"),
            ..valid()
        };
        assert_eq!(publishable.validate(), Err(ValidationError::InvalidStripeKey));

        let bad_secret = PaymentConfig {
            stripe_webhook_secret: secret("secret_xxx"),
            ..valid()
        };
        assert_eq!(
            bad_secret.validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        );
    }

    #[test]
    fn test_validation_tolerance_bounds() {
        for secs in [0, 3601] {
            let config = PaymentConfig {
                webhook_tolerance_secs: secs,
                ..valid()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidWebhookTolerance));
        }
        let max = PaymentConfig {
            webhook_tolerance_secs: 3600,
            ..valid()
        };
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_validation_base_url() {
        let config = PaymentConfig {
            api_base_url: "not a url".to_string(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidApiBaseUrl));
    }

    #[test]
    fn test_portal_return_hosts_parsing() {
        let config = PaymentConfig {
            portal_return_hosts: Some("app.example.com, www.example.com,".to_string()),
            ..valid()
        };
        assert_eq!(
            config.portal_return_hosts_list(),
            vec!["app.example.com".to_string(), "www.example.com".to_string()]
        );
        assert!(valid().portal_return_hosts_list().is_empty());
    }
}
