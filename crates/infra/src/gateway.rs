//! Payment gateway collaborator.

use async_trait::async_trait;

use atelier_core::{Money, OrderId};
use atelier_payments::MethodKind;

/// Request for a customer-facing payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub customer_id: String,
}

/// An intent as created or retrieved on the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: Money,
}

/// Off-session, pre-confirmed charge against a stored method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffSessionCharge {
    pub order_id: OrderId,
    pub amount: Money,
    pub payment_method_id: String,
    pub customer_id: String,
}

/// A verified `payment succeeded` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    pub intent_id: String,
    pub amount: Money,
    pub payment_method_id: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("settlement signature could not be verified")]
    InvalidSignature,
    #[error("charge declined: {0}")]
    Declined(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError>;

    /// Current state of an existing intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError>;

    /// Returns the id of the intent created for the charge.
    async fn charge_off_session(&self, charge: OffSessionCharge) -> Result<String, GatewayError>;

    /// Verify the signature and decode a settlement notification.
    async fn decode_settlement(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<SettlementEvent, GatewayError>;

    async fn method_kind(&self, payment_method_id: &str) -> Result<MethodKind, GatewayError>;
}
