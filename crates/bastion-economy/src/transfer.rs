//! Transfer parameters and results.
//!
//! A [`Transfer`] names the amount, both parties, and the two balance
//! properties money moves between. Running it through
//! [`Ledger::execute`](crate::Ledger::execute) yields a [`TransferOutcome`];
//! only [`TransferOutcome::Success`] carries a [`TransferReceipt`].

use bastion_store::PersistentProperty;
use bastion_types::EntityId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters for one balance-to-balance movement.
///
/// Packs the arguments of a transfer into a single struct to keep call
/// sites readable. The ledger writes absolute balances, so the
/// properties' merge rules are not consulted.
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    /// Quantity to move.
    pub amount: f64,
    /// Paying entity.
    pub source: EntityId,
    /// Receiving entity.
    pub target: EntityId,
    /// Balance debited.
    pub source_balance: &'a PersistentProperty<f64>,
    /// Balance credited.
    pub target_balance: &'a PersistentProperty<f64>,
}

impl<'a> Transfer<'a> {
    /// Describe a transfer between two entities' balances.
    pub const fn new(
        amount: f64,
        source: EntityId,
        target: EntityId,
        source_balance: &'a PersistentProperty<f64>,
        target_balance: &'a PersistentProperty<f64>,
    ) -> Self {
        Self {
            amount,
            source,
            target,
            source_balance,
            target_balance,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Record of a completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    /// Unique receipt id (time-ordered).
    pub id: Uuid,
    /// Paying entity.
    pub source: EntityId,
    /// Receiving entity.
    pub target: EntityId,
    /// Amount debited from the source.
    pub amount: f64,
    /// Amount actually credited to the target. Less than `amount` when the
    /// target hit the balance ceiling.
    pub credited: f64,
    /// Source balance after the transfer.
    pub source_balance: f64,
    /// Target balance after the transfer.
    pub target_balance: f64,
    /// When the transfer committed.
    pub completed_at: DateTime<Utc>,
}

impl TransferReceipt {
    /// Whether the credit was cut short by the balance ceiling.
    pub const fn was_clamped(&self) -> bool {
        self.credited < self.amount
    }
}

/// Result of a transfer attempt.
///
/// Every variant except [`Success`](Self::Success) leaves both balances
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// Balances were updated.
    Success(TransferReceipt),
    /// Source and target were the same entity.
    CannotPaySelf,
    /// The amount was zero, negative, or not finite.
    InvalidAmount,
    /// The source balance was below the amount.
    InsufficientFunds,
    /// The target balance was already at the ceiling.
    ReceiverFull,
}

impl TransferOutcome {
    /// Whether balances changed.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The receipt, if the transfer went through.
    pub const fn receipt(&self) -> Option<&TransferReceipt> {
        match self {
            Self::Success(receipt) => Some(receipt),
            _ => None,
        }
    }
}

impl core::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success(receipt) if receipt.was_clamped() => write!(
                f,
                "transferred {} ({} credited, receiver at limit)",
                receipt.amount, receipt.credited
            ),
            Self::Success(receipt) => write!(f, "transferred {}", receipt.amount),
            Self::CannotPaySelf => f.write_str("cannot pay yourself"),
            Self::InvalidAmount => f.write_str("amount must be a positive number"),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::ReceiverFull => f.write_str("receiver cannot hold any more"),
        }
    }
}
