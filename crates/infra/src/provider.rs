//! Invoicing provider collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use atelier_invoicing::{CancellationReason, InvoiceRequest};

/// A provider catalog row (e.g. a fiscal regime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("request rejected by provider: {0}")]
    Rejected(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait InvoicingProvider: Send + Sync {
    /// Issue an invoice, returning the provider's invoice id.
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, ProviderError>;

    async fn cancel_invoice(
        &self,
        invoice_id: &str,
        replacement_id: &str,
        reason: CancellationReason,
    ) -> Result<(), ProviderError>;

    /// Rendered invoice document (PDF bytes).
    async fn download_invoice(&self, invoice_id: &str) -> Result<Vec<u8>, ProviderError>;

    async fn fiscal_regimes(&self) -> Result<Vec<CatalogEntry>, ProviderError>;
}
