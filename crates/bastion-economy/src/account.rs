//! The balance properties of one entity.

use bastion_store::{PersistentProperty, PropertyManager, StoreError};
use bastion_types::EntityId;
use serde::Serialize;

/// Property name of the on-hand balance.
pub const CASH: &str = "cash";
/// Property name of the banked balance.
pub const BANK: &str = "bank";
/// Property name of the per-application interest rate.
pub const INTEREST_RATE: &str = "interest_rate";

/// An entity's wallet: cash on hand, a bank balance, and an interest rate.
///
/// All three default to `0.0` and replace on write.
#[derive(Debug, Clone)]
pub struct Account {
    owner: EntityId,
    cash: PersistentProperty<f64>,
    bank: PersistentProperty<f64>,
    interest_rate: PersistentProperty<f64>,
}

/// A consistent snapshot of an account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Balances {
    /// Cash on hand.
    pub cash: f64,
    /// Banked balance.
    pub bank: f64,
    /// Interest rate applied to the bank balance.
    pub interest_rate: f64,
}

impl Account {
    /// Bind the account properties of `manager`'s entity.
    ///
    /// Does not touch the store.
    ///
    /// # Errors
    ///
    /// Propagates [`PropertyManager::create`] failures.
    pub fn open(manager: &PropertyManager) -> Result<Self, StoreError> {
        Ok(Self {
            owner: manager.entity(),
            cash: manager.create(CASH, 0.0)?,
            bank: manager.create(BANK, 0.0)?,
            interest_rate: manager.create(INTEREST_RATE, 0.0)?,
        })
    }

    /// The entity owning this account.
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// Cash on hand.
    pub const fn cash(&self) -> &PersistentProperty<f64> {
        &self.cash
    }

    /// Banked balance.
    pub const fn bank(&self) -> &PersistentProperty<f64> {
        &self.bank
    }

    /// Interest rate applied by [`Ledger::apply_interest`](crate::Ledger::apply_interest).
    pub const fn interest_rate(&self) -> &PersistentProperty<f64> {
        &self.interest_rate
    }

    /// Read all three values under one lock acquisition.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn balances(&self) -> Result<Balances, StoreError> {
        let guard = self.cash.runtime().lock().acquire().await;
        Ok(Balances {
            cash: self.cash.get_with(&guard).await?,
            bank: self.bank.get_with(&guard).await?,
            interest_rate: self.interest_rate.get_with(&guard).await?,
        })
    }
}
