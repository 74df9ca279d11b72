//! Caller-facing error taxonomy of the billing engine.

use std::future::Future;
use std::time::Duration;

use atelier_core::DomainError;

use crate::gateway::GatewayError;
use crate::provider::ProviderError;
use crate::store::StoreError;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// State or business-rule violation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Malformed input or an unclassifiable settlement.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Missing or invalid settlement signature.
    #[error("authentication failed")]
    Auth,
    /// A collaborator (gateway, provider, store) failed, or reconciliation hit
    /// a state that should not exist.
    #[error("{service} failure: {detail}")]
    Service { service: &'static str, detail: String },
}

impl BillingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn service(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Service {
            service,
            detail: detail.into(),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, BillingError::Service { .. })
    }

    /// Message safe to show to callers. Collaborator detail is never exposed.
    pub fn public_message(&self) -> String {
        match self {
            BillingError::Service { .. } => "service unavailable, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => BillingError::Validation(msg),
            DomainError::InvalidId(msg) => BillingError::Validation(msg),
            DomainError::Forbidden(msg) => BillingError::Forbidden(msg),
            DomainError::NotFound(msg) => BillingError::NotFound(msg),
        }
    }
}

impl From<StoreError> for BillingError {
    fn from(value: StoreError) -> Self {
        BillingError::service("store", value.to_string())
    }
}

impl From<GatewayError> for BillingError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::InvalidSignature => BillingError::Auth,
            other => BillingError::service("payment-gateway", other.to_string()),
        }
    }
}

impl From<ProviderError> for BillingError {
    fn from(value: ProviderError) -> Self {
        BillingError::service("invoicing-provider", value.to_string())
    }
}

/// Await one collaborator call, giving up after `limit`.
///
/// An elapsed deadline is a `Service` failure of `service`, like any other
/// failed call, so sweeps abort only the current item.
pub(crate) async fn bounded<T, E>(
    service: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, E>>,
) -> BillingResult<T>
where
    BillingError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BillingError::service(
            service,
            format!("no response within {}s", limit.as_secs_f32()),
        )),
    }
}
