//! Subscription plans, storage usage and checkout.

use crate::config::PaymentConfig;
use crate::models::UserProfile;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Checkout provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Checkout request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        PaymentError::Request(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    /// Tier stored on a profile; missing or unrecognised values mean Free
    pub fn from_profile(profile: Option<&UserProfile>) -> Self {
        profile
            .and_then(|p| p.subscription_tier.as_deref())
            .and_then(|t| t.parse().ok())
            .unwrap_or(Tier::Free)
    }

    pub fn plan(&self) -> &'static Plan {
        match self {
            Tier::Free => &PLANS[0],
            Tier::Pro => &PLANS[1],
            Tier::Enterprise => &PLANS[2],
        }
    }
}

impl FromStr for Tier {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(PaymentError::UnknownPlan(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub tier: Tier,
    pub name: &'static str,
    pub price: &'static str,
    pub quota_gb: u32,
    pub share_limit: u32,
    pub price_id: Option<&'static str>,
    pub features: &'static [&'static str],
}

pub static PLANS: [Plan; 3] = [
    Plan {
        tier: Tier::Free,
        name: "Free",
        price: "$0",
        quota_gb: 10,
        share_limit: 5,
        price_id: None,
        features: &["Upload up to 10GB", "Share with 5 people", "Basic support"],
    },
    Plan {
        tier: Tier::Pro,
        name: "Pro",
        price: "$9.99/month",
        quota_gb: 25,
        share_limit: 25,
        price_id: Some("price_pro"),
        features: &[
            "Upload up to 25GB",
            "Share with 25 people",
            "Priority support",
            "Advanced analytics",
        ],
    },
    Plan {
        tier: Tier::Enterprise,
        name: "Enterprise",
        price: "$24.99/month",
        quota_gb: 100,
        share_limit: 80,
        price_id: Some("price_enterprise"),
        features: &[
            "Upload up to 100GB",
            "Share with 80 people",
            "24/7 support",
            "Custom branding",
            "API access",
        ],
    },
];

/// Storage consumed against the tier quota
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub tier: Tier,
    pub used_bytes: i64,
    /// Used gigabytes rounded to two decimals
    pub used_gb: f64,
    pub quota_gb: u32,
    /// Share of the quota in use, capped at 100
    pub percent: f64,
}

impl StorageUsage {
    pub fn from_profile(profile: Option<&UserProfile>) -> Self {
        let tier = Tier::from_profile(profile);
        let used_bytes = profile.and_then(|p| p.storage_used).unwrap_or(0).max(0);
        let quota_gb = tier.plan().quota_gb;

        let used = used_bytes as f64 / BYTES_PER_GB;
        let percent = (used / quota_gb as f64 * 100.0).min(100.0);

        Self {
            tier,
            used_bytes,
            used_gb: (used * 100.0).round() / 100.0,
            quota_gb,
            percent,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Start a checkout for `plan`, returning the URL to redirect to.
    ///
    /// Plans without a price need no checkout and yield `None`.
    async fn create_checkout(&self, plan: &Plan, user_id: Uuid) -> Result<Option<String>, PaymentError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest<'a> {
    price_id: &'a str,
    user_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    session_id: String,
}

/// Checkout sessions created through an HTTP endpoint
pub struct HttpCheckout {
    client: Client,
    checkout_url: Url,
    redirect_base: Url,
}

impl HttpCheckout {
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let checkout_url = Url::parse(&config.checkout_url)
            .map_err(|e| PaymentError::Request(format!("invalid checkout url: {e}")))?;
        let redirect_base = Url::parse(&config.redirect_base)
            .map_err(|e| PaymentError::Request(format!("invalid redirect base: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(url = %checkout_url, "Checkout provider configured");

        Ok(Self {
            client,
            checkout_url,
            redirect_base,
        })
    }

    fn redirect_url(&self, session_id: &str) -> Result<String, PaymentError> {
        self.redirect_base
            .join(session_id)
            .map(String::from)
            .map_err(|e| PaymentError::Request(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for HttpCheckout {
    #[instrument(skip(self, plan), fields(plan = plan.name))]
    async fn create_checkout(&self, plan: &Plan, user_id: Uuid) -> Result<Option<String>, PaymentError> {
        let Some(price_id) = plan.price_id else {
            debug!("Plan is free, no checkout needed");
            return Ok(None);
        };

        let response = self
            .client
            .post(self.checkout_url.clone())
            .json(&CheckoutRequest { price_id, user_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: CheckoutResponse = response.json().await?;
        metrics::counter!("gallery.checkouts.created").increment(1);

        self.redirect_url(&body.session_id).map(Some)
    }
}
