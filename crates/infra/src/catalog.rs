//! TTL cache for provider catalogs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::BillingResult;
use crate::provider::{CatalogEntry, InvoicingProvider};

/// A fetched value and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub data: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.fetched_at < ttl,
            Err(_) => true,
        }
    }
}

#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    fiscal_regimes: RwLock<Option<Cached<Vec<CatalogEntry>>>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            fiscal_regimes: RwLock::new(None),
        }
    }

    /// Cached fiscal regimes, refetched from the provider once older than the TTL.
    pub async fn fiscal_regimes(
        &self,
        provider: &dyn InvoicingProvider,
        now: DateTime<Utc>,
    ) -> BillingResult<Vec<CatalogEntry>> {
        if let Some(cached) = self.fiscal_regimes.read().await.as_ref() {
            if cached.is_fresh(now, self.ttl) {
                return Ok(cached.data.clone());
            }
        }

        debug!("refreshing fiscal regime catalog");
        let data = provider.fiscal_regimes().await?;
        *self.fiscal_regimes.write().await = Some(Cached {
            data: data.clone(),
            fetched_at: now,
        });
        Ok(data)
    }
}
