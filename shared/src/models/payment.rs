//! Payment Model

use serde::{Deserialize, Serialize};

/// Payment gateway a funding attempt goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    /// UPI QR codes, settled by signed webhooks.
    Razorpay,
    /// Crypto invoices, settled by track-id-validated callbacks.
    Oxapay,
    /// Screenshot proof reviewed by an admin.
    Manual,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Razorpay => "razorpay",
            PaymentProvider::Oxapay => "oxapay",
            PaymentProvider::Manual => "manual",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Funding attempt status.
///
/// Monotone except `Pending <-> AwaitingProof` (manual payments bounce
/// back to pending once the proof arrives). Approved, Rejected,
/// Cancelled and Expired are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    AwaitingProof,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::AwaitingProof => "awaiting_proof",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One funding attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub provider: PaymentProvider,
    /// Credits the wallet receives when this payment settles.
    pub requested_credits: i64,
    /// Amount in the provider's own currency units (INR for razorpay,
    /// USD for oxapay and manual).
    pub provider_amount: f64,
    /// The gateway's identifier for this transaction, used as the
    /// reconciliation idempotency key. NULL for manual payments.
    pub provider_ref: Option<String>,
    /// Hosted payment page / QR image URL shown to the user.
    pub pay_url: Option<String>,
    /// Chat-message handle of the live payment prompt, persisted so
    /// any process instance can clean it up on settlement.
    pub display_message_ref: Option<String>,
    /// Proof attachment reference (manual payments).
    pub proof_ref: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
    /// Deadline after which a pending payment auto-expires.
    pub expires_at: Option<i64>,
    pub approved_at: Option<i64>,
    pub reviewed_by: Option<i64>,
}
