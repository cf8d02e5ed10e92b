//! Account balances and the atomic transfer protocol.
//!
//! Every account is three persistent `f64` properties of one entity
//! (`cash`, `bank`, `interest_rate`). Money moves between two balance
//! properties only through the [`Ledger`], which runs each movement under
//! the store runtime's single lock.
//!
//! # Modules
//!
//! - [`account`] -- [`Account`]: the balance properties of one entity.
//! - [`transfer`] -- [`Transfer`], [`TransferOutcome`], [`TransferReceipt`].
//! - [`ledger`] -- [`Ledger`]: the transfer protocol, deposits, interest.
//! - [`economy`] -- [`Economy`]: registry + ledger facade keyed by entity.
//!
//! # Transfer protocol
//!
//! Checks run in this order and stop at the first failure:
//!
//! | Step | Check | Outcome |
//! |------|-------|---------|
//! | 1 | source == target, or one balance on both sides | `CannotPaySelf` |
//! | 2 | amount <= 0 or not finite | `InvalidAmount` |
//! | 3 | amount > source balance | `InsufficientFunds` |
//! | 4 | target balance at ceiling | `ReceiverFull` |
//! | 5 | debit source, credit target (clamped) | `Success` |
//!
//! The sender is validated strictly and can never go negative. The
//! receiver is clamped at the ceiling instead of failing the transfer; the
//! sender is still debited the full amount.
//!
//! Outcomes are values, not errors: only `Success` means balances changed.
//! [`EconomyError`] is reserved for store failures and invalid setup.

pub mod account;
pub mod economy;
pub mod ledger;
pub mod transfer;

// Re-export primary types at crate root.
pub use account::{Account, Balances};
pub use economy::Economy;
pub use ledger::Ledger;
pub use transfer::{Transfer, TransferOutcome, TransferReceipt};

use bastion_store::StoreError;

/// Errors that can occur in the economy layer.
#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    /// The underlying property store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An interest rate was negative or not finite.
    #[error("interest rate must be a finite non-negative number, got {rate}")]
    InvalidRate {
        /// The rejected rate.
        rate: f64,
    },

    /// The balance ceiling was not a positive number.
    #[error("balance ceiling must be positive, got {max_balance}")]
    InvalidCeiling {
        /// The rejected ceiling.
        max_balance: f64,
    },
}
