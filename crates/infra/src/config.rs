//! Configuration loading and representation.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use atelier_payments::PaymentMeans;

use crate::notify::Recipient;

/// How often a sweep runs and how long one invocation may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SweepSettings {
    pub interval: Duration,
    pub budget: Duration,
}

impl SweepSettings {
    const fn new(interval_secs: u64, budget_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            budget: Duration::from_secs(budget_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SweepSchedule {
    pub invoice_tasks: SweepSettings,
    pub global_invoices: SweepSettings,
    pub due_installments: SweepSettings,
    pub due_subscriptions: SweepSettings,
    pub pending_charges: SweepSettings,
    pub stale_intents: SweepSettings,
    pub tax_reminder: SweepSettings,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            invoice_tasks: SweepSettings::new(10 * 60, 10),
            global_invoices: SweepSettings::new(60, 10),
            due_installments: SweepSettings::new(60 * 60, 10),
            due_subscriptions: SweepSettings::new(60 * 60, 10),
            pending_charges: SweepSettings::new(30 * 60, 20),
            stale_intents: SweepSettings::new(24 * 60 * 60, 3),
            tax_reminder: SweepSettings::new(24 * 60 * 60, 3),
        }
    }
}

/// Billing engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub operator_email: String,
    pub operator_name: String,
    /// Base URL of the client application, used for notification links.
    pub client_url: String,
    /// Provider receiver id used for global invoices and profile-less reissues.
    pub generic_receiver_id: String,
    pub default_cfdi_use: String,
    pub global_invoice_means: PaymentMeans,
    pub catalog_ttl: Duration,
    /// Deadline for a single gateway, provider or notifier call.
    pub collaborator_timeout: Duration,
    pub sweeps: SweepSchedule,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            operator_email: "operator@localhost".to_string(),
            operator_name: "Administrator".to_string(),
            client_url: "http://localhost:3000".to_string(),
            generic_receiver_id: "generic-receiver".to_string(),
            default_cfdi_use: "S01".to_string(),
            global_invoice_means: PaymentMeans::CreditCard,
            catalog_ttl: Duration::from_secs(24 * 60 * 60),
            collaborator_timeout: Duration::from_secs(8),
            sweeps: SweepSchedule::default(),
        }
    }
}

impl BillingConfig {
    /// Read `ATELIER_*` variables, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let global_invoice_means = match std::env::var("ATELIER_GLOBAL_INVOICE_MEANS") {
            Ok(code) => PaymentMeans::from_code(&code).unwrap_or_else(|e| {
                warn!(error = %e, "invalid ATELIER_GLOBAL_INVOICE_MEANS; using default");
                defaults.global_invoice_means
            }),
            Err(_) => defaults.global_invoice_means,
        };

        Self {
            operator_email: required("ATELIER_OPERATOR_EMAIL", defaults.operator_email),
            operator_name: optional("ATELIER_OPERATOR_NAME", defaults.operator_name),
            client_url: required("ATELIER_CLIENT_URL", defaults.client_url),
            generic_receiver_id: required("ATELIER_GENERIC_RECEIVER_ID", defaults.generic_receiver_id),
            default_cfdi_use: optional("ATELIER_DEFAULT_CFDI_USE", defaults.default_cfdi_use),
            global_invoice_means,
            catalog_ttl: seconds("ATELIER_CATALOG_TTL_SECS", defaults.catalog_ttl),
            collaborator_timeout: seconds(
                "ATELIER_COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout,
            ),
            sweeps: defaults.sweeps,
        }
    }

    pub fn operator(&self) -> Recipient {
        Recipient {
            email: self.operator_email.clone(),
            name: self.operator_name.clone(),
        }
    }

    pub fn owner_order_url(&self, order_id: impl core::fmt::Display) -> String {
        format!("{}/platform/services/{order_id}", self.client_url)
    }

    pub fn operator_order_url(&self, order_id: impl core::fmt::Display) -> String {
        format!("{}/su/services/{order_id}", self.client_url)
    }
}

fn optional(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn required(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        warn!(key, "not set; using development default");
        default
    })
}

fn seconds(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
