//! # Ledger Client
//!
//! Opaque settlement interface. Submitting a purchase either yields a
//! transaction identifier or fails; the engine records the outcome either
//! way and never inspects settlement internals.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// One settlement request: convert `amount_in` of the deposit asset into
/// `amount_out` of the target asset at the quoted price.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrder {
    pub plan_id: Uuid,
    pub ledger_account: Option<String>,
    pub deposit_asset: String,
    pub target_asset: String,
    pub amount_in: i64,
    pub amount_out: BigDecimal,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub tx_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit_purchase(&self, order: &PurchaseOrder) -> Result<LedgerReceipt, LedgerError>;

    fn client_name(&self) -> &'static str;
}
