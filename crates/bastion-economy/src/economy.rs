//! Entity-keyed facade over the registry and the ledger.
//!
//! Hosts usually know players only by id. [`Economy`] resolves ids to
//! [`Account`]s through the [`ManagerRegistry`] and runs every operation
//! through the one [`Ledger`] sharing the registry's runtime.

use bastion_store::ManagerRegistry;
use bastion_types::EntityId;

use crate::account::{Account, Balances};
use crate::ledger::Ledger;
use crate::transfer::TransferOutcome;
use crate::EconomyError;

/// Accounts and balance operations for one namespace.
#[derive(Debug)]
pub struct Economy {
    registry: ManagerRegistry,
    ledger: Ledger,
}

impl Economy {
    /// Build an economy over `registry` with a balance ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidCeiling`] for a bad `max_balance`.
    pub fn new(registry: ManagerRegistry, max_balance: f64) -> Result<Self, EconomyError> {
        let ledger = Ledger::new(registry.runtime().clone(), max_balance)?;
        Ok(Self { registry, ledger })
    }

    /// The registry accounts are opened from.
    pub const fn registry(&self) -> &ManagerRegistry {
        &self.registry
    }

    /// The ledger every operation runs through.
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The account of `entity`.
    ///
    /// # Errors
    ///
    /// Propagates property construction failures.
    pub fn account(&self, entity: EntityId) -> Result<Account, EconomyError> {
        Ok(Account::open(&self.registry.of(entity))?)
    }

    /// Snapshot of `entity`'s account.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn balances(&self, entity: EntityId) -> Result<Balances, EconomyError> {
        Ok(self.account(entity)?.balances().await?)
    }

    /// Pay `amount` of cash from one entity to another.
    ///
    /// # Errors
    ///
    /// See [`Ledger::execute`].
    pub async fn pay(
        &self,
        amount: f64,
        from: EntityId,
        to: EntityId,
    ) -> Result<TransferOutcome, EconomyError> {
        if from == to {
            return Ok(TransferOutcome::CannotPaySelf);
        }
        let (payer, payee) = (self.account(from)?, self.account(to)?);
        self.ledger.pay(amount, &payer, &payee).await
    }

    /// Move cash into the bank.
    ///
    /// # Errors
    ///
    /// See [`Ledger::execute`].
    pub async fn deposit(
        &self,
        entity: EntityId,
        amount: f64,
    ) -> Result<TransferOutcome, EconomyError> {
        self.ledger.deposit(&self.account(entity)?, amount).await
    }

    /// Move banked funds back to cash.
    ///
    /// # Errors
    ///
    /// See [`Ledger::execute`].
    pub async fn withdraw(
        &self,
        entity: EntityId,
        amount: f64,
    ) -> Result<TransferOutcome, EconomyError> {
        self.ledger.withdraw(&self.account(entity)?, amount).await
    }

    /// Set `entity`'s interest rate.
    ///
    /// # Errors
    ///
    /// See [`Ledger::set_interest_rate`].
    pub async fn set_interest_rate(&self, entity: EntityId, rate: f64) -> Result<(), EconomyError> {
        self.ledger
            .set_interest_rate(&self.account(entity)?, rate)
            .await
    }

    /// Apply interest to `entity`'s bank balance. Returns the amount
    /// credited.
    ///
    /// # Errors
    ///
    /// See [`Ledger::apply_interest`].
    pub async fn apply_interest(&self, entity: EntityId) -> Result<f64, EconomyError> {
        self.ledger.apply_interest(&self.account(entity)?).await
    }

    /// Apply interest to every resident account. Returns the total
    /// credited.
    ///
    /// # Errors
    ///
    /// Stops at the first store failure.
    #[allow(clippy::arithmetic_side_effects)]
    pub async fn apply_interest_to(
        &self,
        entities: impl IntoIterator<Item = EntityId>,
    ) -> Result<f64, EconomyError> {
        let mut total = 0.0;
        for entity in entities {
            total += self.apply_interest(entity).await?;
        }
        Ok(total)
    }
}
