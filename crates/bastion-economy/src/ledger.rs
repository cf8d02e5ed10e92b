//! The transfer protocol and balance operations built on it.
//!
//! Every operation acquires the runtime lock once and holds it from the
//! first balance read until both writes are queued. No other property
//! operation on the same runtime can interleave, so concurrent transfers
//! out of one balance can never both pass the funds check.
//!
//! # Design
//!
//! - **Strict sender**: a transfer that would take the source below zero is
//!   rejected with no changes.
//! - **Clamped receiver**: the target is credited up to the ceiling; the
//!   excess is not refunded.
//! - **Outcomes, not errors**: business rejections are [`TransferOutcome`]
//!   variants. [`EconomyError`] only signals store failures and misuse.

use bastion_store::{PersistentProperty, StoreError, StoreGuard, StoreRuntime};
use bastion_types::EntityId;
use chrono::Utc;
use uuid::Uuid;

use crate::account::Account;
use crate::transfer::{Transfer, TransferOutcome, TransferReceipt};
use crate::EconomyError;

/// Executes balance movements under one runtime's lock.
#[derive(Debug, Clone)]
pub struct Ledger {
    runtime: StoreRuntime,
    max_balance: f64,
}

impl Ledger {
    /// Create a ledger over `runtime` with a balance ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidCeiling`] if `max_balance` is NaN or
    /// not positive.
    pub fn new(runtime: StoreRuntime, max_balance: f64) -> Result<Self, EconomyError> {
        if max_balance.is_nan() || max_balance <= 0.0 {
            return Err(EconomyError::InvalidCeiling { max_balance });
        }
        Ok(Self {
            runtime,
            max_balance,
        })
    }

    /// Create a ledger whose ceiling is the largest finite `f64`.
    pub const fn unbounded(runtime: StoreRuntime) -> Self {
        Self {
            runtime,
            max_balance: f64::MAX,
        }
    }

    /// The highest balance any credit can produce.
    pub const fn max_balance(&self) -> f64 {
        self.max_balance
    }

    /// The runtime whose lock this ledger holds while moving funds.
    pub const fn runtime(&self) -> &StoreRuntime {
        &self.runtime
    }

    /// Move `amount` from `source_balance` (owned by `source`) to
    /// `target_balance` (owned by `target`).
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn transfer(
        &self,
        amount: f64,
        source: EntityId,
        target: EntityId,
        source_balance: &PersistentProperty<f64>,
        target_balance: &PersistentProperty<f64>,
    ) -> Result<TransferOutcome, EconomyError> {
        self.execute(Transfer::new(
            amount,
            source,
            target,
            source_balance,
            target_balance,
        ))
        .await
    }

    /// Run a transfer through the checks in order and commit it if they
    /// all pass.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ForeignLock`] if either balance belongs to another
    ///   runtime.
    /// - Any store failure while reading a balance. Nothing is written in
    ///   that case.
    pub async fn execute(&self, transfer: Transfer<'_>) -> Result<TransferOutcome, EconomyError> {
        if transfer.source == transfer.target {
            tracing::debug!(entity = %transfer.source, "self-payment rejected");
            return Ok(TransferOutcome::CannotPaySelf);
        }
        self.move_funds(&transfer).await
    }

    /// Cash to cash between two accounts.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn pay(
        &self,
        amount: f64,
        from: &Account,
        to: &Account,
    ) -> Result<TransferOutcome, EconomyError> {
        self.transfer(amount, from.owner(), to.owner(), from.cash(), to.cash())
            .await
    }

    /// Cash to bank within one account.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn deposit(
        &self,
        account: &Account,
        amount: f64,
    ) -> Result<TransferOutcome, EconomyError> {
        let owner = account.owner();
        self.move_funds(&Transfer::new(
            amount,
            owner,
            owner,
            account.cash(),
            account.bank(),
        ))
        .await
    }

    /// Bank to cash within one account.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn withdraw(
        &self,
        account: &Account,
        amount: f64,
    ) -> Result<TransferOutcome, EconomyError> {
        let owner = account.owner();
        self.move_funds(&Transfer::new(
            amount,
            owner,
            owner,
            account.bank(),
            account.cash(),
        ))
        .await
    }

    /// Set the rate [`apply_interest`](Self::apply_interest) uses.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidRate`] if `rate` is negative or not finite.
    /// - Store failures from the write.
    pub async fn set_interest_rate(&self, account: &Account, rate: f64) -> Result<(), EconomyError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(EconomyError::InvalidRate { rate });
        }
        self.ensure_domain(account.interest_rate())?;
        account.interest_rate().set(rate).await?;
        Ok(())
    }

    /// Grow the bank balance by its interest rate, clamped at the ceiling.
    /// Returns the amount credited.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ForeignLock`] if the account belongs to another
    ///   runtime.
    /// - Store failures from the reads or the write.
    #[allow(clippy::arithmetic_side_effects)]
    pub async fn apply_interest(&self, account: &Account) -> Result<f64, EconomyError> {
        self.ensure_domain(account.bank())?;
        self.ensure_domain(account.interest_rate())?;

        let guard = self.runtime.lock().acquire().await;
        let rate = account.interest_rate().get_with(&guard).await?;
        let bank = account.bank().get_with(&guard).await?;
        if rate.is_nan() || rate <= 0.0 || bank <= 0.0 || bank >= self.max_balance {
            return Ok(0.0);
        }

        let grown = bank.mul_add(rate, bank).min(self.max_balance);
        account.bank().put_with(&guard, grown).await?;
        let credited = grown - bank;
        tracing::info!(
            entity = %account.owner(),
            rate,
            credited,
            bank = grown,
            "interest applied"
        );
        Ok(credited)
    }

    /// Steps 2 through 5 of the protocol under one lock acquisition.
    ///
    /// Debiting and crediting one stored value would credit the full
    /// amount after the debit, so that case is refused as a self-payment.
    #[allow(clippy::arithmetic_side_effects)]
    async fn move_funds(&self, transfer: &Transfer<'_>) -> Result<TransferOutcome, EconomyError> {
        if same_balance(transfer.source_balance, transfer.target_balance) {
            tracing::debug!(
                entity = %transfer.source_balance.entity(),
                key = %transfer.source_balance.key(),
                "transfer onto its own balance rejected"
            );
            return Ok(TransferOutcome::CannotPaySelf);
        }
        let amount = transfer.amount;
        if !amount.is_finite() || amount <= 0.0 {
            tracing::debug!(amount, "invalid transfer amount rejected");
            return Ok(TransferOutcome::InvalidAmount);
        }
        self.ensure_domain(transfer.source_balance)?;
        self.ensure_domain(transfer.target_balance)?;

        let guard = self.runtime.lock().acquire().await;

        let available = transfer.source_balance.get_with(&guard).await?;
        if amount > available {
            tracing::debug!(
                source = %transfer.source,
                amount,
                available,
                "insufficient funds"
            );
            return Ok(TransferOutcome::InsufficientFunds);
        }

        let held = transfer.target_balance.get_with(&guard).await?;
        if held >= self.max_balance {
            tracing::debug!(target = %transfer.target, held, "receiver at ceiling");
            return Ok(TransferOutcome::ReceiverFull);
        }

        let source_after = available - amount;
        let target_after = (held + amount).min(self.max_balance);
        commit(&guard, transfer, source_after, target_after).await?;

        let receipt = TransferReceipt {
            id: Uuid::now_v7(),
            source: transfer.source,
            target: transfer.target,
            amount,
            credited: target_after - held,
            source_balance: source_after,
            target_balance: target_after,
            completed_at: Utc::now(),
        };
        tracing::info!(
            receipt = %receipt.id,
            source = %receipt.source,
            target = %receipt.target,
            amount,
            credited = receipt.credited,
            "transfer committed"
        );
        Ok(TransferOutcome::Success(receipt))
    }

    fn ensure_domain(&self, balance: &PersistentProperty<f64>) -> Result<(), StoreError> {
        if balance.runtime().same_as(&self.runtime) {
            Ok(())
        } else {
            Err(StoreError::ForeignLock)
        }
    }
}

/// Whether both properties address the same stored value.
fn same_balance(a: &PersistentProperty<f64>, b: &PersistentProperty<f64>) -> bool {
    a.entity() == b.entity() && a.key() == b.key()
}

/// Queue the debit then the credit. Both writes are ordered on the
/// runtime's worker behind every earlier write.
///
/// The values were read and checked under `guard`, so they are written as
/// absolute balances without another read. Nothing left here touches the
/// backing container before both writes are queued.
async fn commit(
    guard: &StoreGuard<'_>,
    transfer: &Transfer<'_>,
    source_after: f64,
    target_after: f64,
) -> Result<(), StoreError> {
    transfer
        .source_balance
        .put_with(guard, source_after)
        .await?;
    transfer
        .target_balance
        .put_with(guard, target_after)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Arc;

    use bastion_store::{ManagerRegistry, MemoryBackend, Merge};
    use bastion_types::Namespace;

    use super::*;

    struct Fixture {
        registry: ManagerRegistry,
        ledger: Ledger,
    }

    impl Fixture {
        fn new(max_balance: f64) -> Self {
            let runtime = StoreRuntime::with_logging();
            let registry = ManagerRegistry::new(
                Namespace::new("bastion").unwrap(),
                Arc::new(MemoryBackend::new()),
                runtime.clone(),
            );
            let ledger = Ledger::new(runtime, max_balance).unwrap();
            Self { registry, ledger }
        }

        async fn account(&self, cash: f64) -> Account {
            let account = Account::open(&self.registry.of(EntityId::new())).unwrap();
            account.cash().set(cash).await.unwrap();
            account
        }
    }

    async fn cash(account: &Account) -> f64 {
        account.cash().get().await.unwrap()
    }

    #[tokio::test]
    async fn successful_transfer_moves_funds() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(100.0).await;
        let b = fx.account(20.0).await;

        let outcome = fx.ledger.pay(30.0, &a, &b).await.unwrap();
        let receipt = outcome.receipt().unwrap();
        assert_eq!(receipt.amount, 30.0);
        assert_eq!(receipt.credited, 30.0);
        assert_eq!(receipt.source, a.owner());
        assert_eq!(receipt.target, b.owner());
        assert_eq!(receipt.source_balance, 70.0);
        assert_eq!(receipt.target_balance, 50.0);
        assert_eq!(cash(&a).await, 70.0);
        assert_eq!(cash(&b).await, 50.0);
    }

    #[tokio::test]
    async fn self_payment_is_rejected_for_any_amount() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(100.0).await;

        for amount in [10.0, 0.0, -5.0, f64::NAN, 1e12] {
            let outcome = fx.ledger.pay(amount, &a, &a).await.unwrap();
            assert_eq!(outcome, TransferOutcome::CannotPaySelf);
        }
        assert_eq!(cash(&a).await, 100.0);
    }

    #[tokio::test]
    async fn one_balance_on_both_sides_is_rejected() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(100.0).await;
        let b = fx.account(0.0).await;

        let outcome = fx
            .ledger
            .transfer(10.0, a.owner(), b.owner(), a.cash(), a.cash())
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::CannotPaySelf);

        // A second handle onto the same stored value is the same balance.
        let again = Account::open(&fx.registry.of(a.owner())).unwrap();
        let outcome = fx
            .ledger
            .transfer(10.0, a.owner(), b.owner(), a.cash(), again.cash())
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::CannotPaySelf);

        assert_eq!(cash(&a).await, 100.0);
        assert_eq!(cash(&b).await, 0.0);
    }

    #[tokio::test]
    async fn balances_are_written_absolute_whatever_the_merge_rule() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.registry.of(EntityId::new());
        let b = fx.registry.of(EntityId::new());
        let from = a.create_with("purse", 0.0_f64, Merge::accumulate()).unwrap();
        let to = b.create_with("purse", 0.0_f64, Merge::accumulate()).unwrap();
        from.set(100.0).await.unwrap();
        to.set(5.0).await.unwrap();

        let outcome = fx
            .ledger
            .transfer(30.0, a.entity(), b.entity(), &from, &to)
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(from.get().await.unwrap(), 70.0);
        assert_eq!(to.get().await.unwrap(), 35.0);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(100.0).await;
        let b = fx.account(0.0).await;

        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let outcome = fx.ledger.pay(amount, &a, &b).await.unwrap();
            assert_eq!(outcome, TransferOutcome::InvalidAmount);
        }
        assert_eq!(cash(&a).await, 100.0);
        assert_eq!(cash(&b).await, 0.0);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_changes() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(40.0).await;
        let b = fx.account(5.0).await;

        let outcome = fx.ledger.pay(40.5, &a, &b).await.unwrap();
        assert_eq!(outcome, TransferOutcome::InsufficientFunds);
        assert_eq!(cash(&a).await, 40.0);
        assert_eq!(cash(&b).await, 5.0);

        // Exactly the available balance is allowed.
        let outcome = fx.ledger.pay(40.0, &a, &b).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(cash(&a).await, 0.0);
        assert_eq!(cash(&b).await, 45.0);
    }

    #[tokio::test]
    async fn receiver_is_clamped_and_sender_pays_in_full() {
        let max = 1_000_000.0;
        let fx = Fixture::new(max);
        let a = fx.account(100.0).await;
        let b = fx.account(max - 5.0).await;

        let outcome = fx.ledger.pay(10.0, &a, &b).await.unwrap();
        let receipt = outcome.receipt().unwrap();
        assert!(receipt.was_clamped());
        assert_eq!(receipt.credited, 5.0);
        assert_eq!(cash(&b).await, max);
        assert_eq!(cash(&a).await, 90.0);
    }

    #[tokio::test]
    async fn full_receiver_is_rejected() {
        let max = 1_000.0;
        let fx = Fixture::new(max);
        let a = fx.account(100.0).await;
        let b = fx.account(max).await;

        let outcome = fx.ledger.pay(1.0, &a, &b).await.unwrap();
        assert_eq!(outcome, TransferOutcome::ReceiverFull);
        assert_eq!(cash(&a).await, 100.0);
        assert_eq!(cash(&b).await, max);
    }

    #[tokio::test]
    async fn unbounded_ledger_clamps_at_f64_max() {
        let runtime = StoreRuntime::with_logging();
        let registry = ManagerRegistry::new(
            Namespace::new("bastion").unwrap(),
            Arc::new(MemoryBackend::new()),
            runtime.clone(),
        );
        let ledger = Ledger::unbounded(runtime);
        let a = Account::open(&registry.of(EntityId::new())).unwrap();
        let b = Account::open(&registry.of(EntityId::new())).unwrap();
        a.cash().set(f64::MAX).await.unwrap();
        b.cash().set(f64::MAX / 2.0).await.unwrap();

        let outcome = ledger.pay(f64::MAX, &a, &b).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(cash(&b).await, f64::MAX);
        assert_eq!(cash(&a).await, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_cannot_overdraw() {
        for _ in 0..25 {
            let fx = Fixture::new(1_000_000.0);
            let a = fx.account(100.0).await;
            let b = fx.account(0.0).await;
            let c = fx.account(0.0).await;
            let ledger = Arc::new(fx.ledger.clone());

            let first = {
                let (ledger, a, b) = (Arc::clone(&ledger), a.clone(), b.clone());
                tokio::spawn(async move { ledger.pay(60.0, &a, &b).await.unwrap() })
            };
            let second = {
                let (ledger, a, c) = (Arc::clone(&ledger), a.clone(), c.clone());
                tokio::spawn(async move { ledger.pay(50.0, &a, &c).await.unwrap() })
            };
            let outcomes = [first.await.unwrap(), second.await.unwrap()];

            let successes = outcomes.iter().filter(|o| o.is_success()).count();
            let rejected = outcomes
                .iter()
                .filter(|o| **o == TransferOutcome::InsufficientFunds)
                .count();
            assert_eq!(successes, 1);
            assert_eq!(rejected, 1);

            let remaining = cash(&a).await;
            assert!(remaining == 40.0 || remaining == 50.0);
            assert_eq!(remaining + cash(&b).await + cash(&c).await, 100.0);
        }
    }

    #[tokio::test]
    async fn deposit_and_withdraw_move_between_cash_and_bank() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(100.0).await;

        assert!(fx.ledger.deposit(&a, 75.0).await.unwrap().is_success());
        assert!(fx.ledger.withdraw(&a, 25.0).await.unwrap().is_success());
        assert_eq!(
            fx.ledger.withdraw(&a, 51.0).await.unwrap(),
            TransferOutcome::InsufficientFunds
        );

        let balances = a.balances().await.unwrap();
        assert_eq!(balances.cash, 50.0);
        assert_eq!(balances.bank, 50.0);
    }

    #[tokio::test]
    async fn interest_grows_the_bank_balance() {
        let fx = Fixture::new(1_000_000.0);
        let a = fx.account(0.0).await;
        a.bank().set(200.0).await.unwrap();

        // No rate set yet.
        assert_eq!(fx.ledger.apply_interest(&a).await.unwrap(), 0.0);

        fx.ledger.set_interest_rate(&a, 0.5).await.unwrap();
        assert_eq!(fx.ledger.apply_interest(&a).await.unwrap(), 100.0);
        assert_eq!(a.bank().get().await.unwrap(), 300.0);
    }

    #[tokio::test]
    async fn interest_is_clamped_at_the_ceiling() {
        let fx = Fixture::new(1_000.0);
        let a = fx.account(0.0).await;
        a.bank().set(900.0).await.unwrap();
        fx.ledger.set_interest_rate(&a, 1.0).await.unwrap();

        assert_eq!(fx.ledger.apply_interest(&a).await.unwrap(), 100.0);
        assert_eq!(a.bank().get().await.unwrap(), 1_000.0);
        assert_eq!(fx.ledger.apply_interest(&a).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn bad_interest_rates_are_rejected() {
        let fx = Fixture::new(1_000.0);
        let a = fx.account(0.0).await;

        for rate in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                fx.ledger.set_interest_rate(&a, rate).await,
                Err(EconomyError::InvalidRate { .. })
            ));
        }
        assert_eq!(a.interest_rate().get().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn balances_from_another_runtime_are_refused() {
        let home = Fixture::new(1_000.0);
        let away = Fixture::new(1_000.0);
        let a = home.account(100.0).await;
        let b = away.account(0.0).await;

        let result = home.ledger.pay(10.0, &a, &b).await;
        assert!(matches!(
            result,
            Err(EconomyError::Store(StoreError::ForeignLock))
        ));
        assert_eq!(cash(&a).await, 100.0);
    }

    #[tokio::test]
    async fn ceiling_must_be_positive() {
        for max in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                Ledger::new(StoreRuntime::with_logging(), max),
                Err(EconomyError::InvalidCeiling { .. })
            ));
        }
    }
}
