//! Conversation Flow Types
//!
//! The persisted cursor for multi-step chat interactions. Exactly one
//! [`FlowState`] (or none) exists per user at a time, stored as JSON
//! on the user row and replaced atomically on every transition.

use serde::{Deserialize, Serialize};

use super::payment::PaymentProvider;

/// Product attribute an admin edit flow targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    Name,
    Price,
}

/// Direction of an admin wallet adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOp {
    Add,
    Deduct,
}

/// Closed set of conversation steps. Each variant carries only the
/// fields that step needs; invalid transitions are unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowState {
    /// Waiting for a funding amount for the chosen provider.
    AwaitingAmount { provider: PaymentProvider },
    /// Waiting for the payment screenshot of a manual payment.
    AwaitingProof { payment_id: i64 },
    /// Admin: stock loading, step 1 of 2.
    AwaitingStockEmail { product_id: i64 },
    /// Admin: stock loading, step 2 of 2.
    AwaitingStockPassword { product_id: i64, email: String },
    /// Admin: edit the email of an existing stock item.
    AwaitingStockEditEmail { stock_id: i64 },
    /// Admin: edit the password of an existing stock item.
    AwaitingStockEditPassword { stock_id: i64 },
    /// Admin: edit one product field.
    AwaitingProductField {
        product_id: i64,
        field: ProductField,
    },
    /// Admin: product creation, step 1 of 2.
    AwaitingProductName { category_id: i64 },
    /// Admin: product creation, step 2 of 2.
    AwaitingProductPrice { category_id: i64, name: String },
    /// Admin: replace the discount rules of a product
    /// ("min_qty percent" per line).
    AwaitingDiscountRules { product_id: i64 },
    /// Admin: adjust another user's wallet balance.
    AwaitingBalanceAdjust { target_id: i64, op: BalanceOp },
}

impl FlowState {
    /// Steps only an admin may advance. Checked once at the engine
    /// boundary, not inside handlers.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            FlowState::AwaitingAmount { .. } | FlowState::AwaitingProof { .. }
        )
    }

    /// Steps that belong to an in-progress funding interaction, cleared
    /// when a settlement for the user reconciles.
    pub fn is_funding(&self) -> bool {
        matches!(
            self,
            FlowState::AwaitingAmount { .. } | FlowState::AwaitingProof { .. }
        )
    }
}

/// One inbound user message, as the chat collaborator hands it over.
#[derive(Debug, Clone)]
pub enum FlowInput {
    Text(String),
    /// A photo attachment; the string is the transport's file handle.
    Photo(String),
}

/// Result of advancing a flow. `Prompt` and `Invalid` leave a flow
/// active; the rest leave the user idle.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// No flow was active; the input is not ours to handle.
    Idle,
    /// Flow advanced (or started); show this prompt next.
    Prompt(String),
    /// Input rejected, state unchanged; the same prompt repeats.
    Invalid(String),
    /// Flow finished with a terminal effect; state cleared.
    Done(String),
    /// The step requires a capability the caller lacks; state cleared.
    Denied,
    /// The referenced entity vanished under the flow; state cleared.
    SessionExpired,
}
