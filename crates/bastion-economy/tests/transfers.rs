//! Integration tests for the `bastion-economy` crate.
//!
//! The in-memory and fault-injection tests run everywhere. The `Dragonfly`
//! test requires a live instance and is marked `#[ignore]`:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p bastion-economy -- --ignored
//! ```

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bastion_economy::{Economy, EconomyError, TransferOutcome};
use bastion_store::{
    BackingContainer, ContainerProvider, DragonflyBackend, ManagerRegistry, MemoryBackend,
    StoreError, StoreRuntime,
};
use bastion_types::{EntityId, Namespace, PrimitiveType, PropertyKey, RawValue};
use futures::future::BoxFuture;
use futures::FutureExt as _;

/// Dragonfly connection URL for a local instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

fn economy(provider: Arc<dyn ContainerProvider>, runtime: StoreRuntime) -> Economy {
    let registry = ManagerRegistry::new(
        Namespace::new("bastion").expect("valid namespace"),
        provider,
        runtime,
    );
    Economy::new(registry, 1_000_000.0).expect("valid ceiling")
}

/// Memory-backed provider where one entity's reads fail once its read
/// allowance is spent.
struct Flaky {
    inner: MemoryBackend,
    broken: EntityId,
    reads: Arc<AtomicUsize>,
}

impl Flaky {
    /// Every read of `broken` fails.
    fn new(inner: MemoryBackend, broken: EntityId) -> Self {
        Self::allowing(inner, broken, 0)
    }

    /// The first `reads` reads of `broken` succeed, the rest fail.
    fn allowing(inner: MemoryBackend, broken: EntityId, reads: usize) -> Self {
        Self {
            inner,
            broken,
            reads: Arc::new(AtomicUsize::new(reads)),
        }
    }
}

struct FlakyContainer {
    inner: Arc<dyn BackingContainer>,
    reads: Arc<AtomicUsize>,
}

impl BackingContainer for FlakyContainer {
    fn get<'a>(
        &'a self,
        key: &'a PropertyKey,
        primitive: PrimitiveType,
    ) -> BoxFuture<'a, Result<Option<RawValue>, StoreError>> {
        let allowed = self
            .reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed {
            self.inner.get(key, primitive)
        } else {
            async { Err(StoreError::Backend(String::from("disk unplugged"))) }.boxed()
        }
    }

    fn set<'a>(
        &'a self,
        key: &'a PropertyKey,
        value: RawValue,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        self.inner.set(key, value)
    }

    fn remove<'a>(&'a self, key: &'a PropertyKey) -> BoxFuture<'a, Result<(), StoreError>> {
        self.inner.remove(key)
    }
}

impl ContainerProvider for Flaky {
    fn container_for(&self, entity: EntityId) -> Arc<dyn BackingContainer> {
        let inner = self.inner.container_for(entity);
        if entity == self.broken {
            Arc::new(FlakyContainer {
                inner,
                reads: Arc::clone(&self.reads),
            })
        } else {
            inner
        }
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn money_is_conserved_under_concurrent_traffic() {
    let eco = Arc::new(economy(
        Arc::new(MemoryBackend::new()),
        StoreRuntime::with_logging(),
    ));
    let players: Vec<EntityId> = (0..6).map(|_| EntityId::new()).collect();
    for id in &players {
        eco.account(*id)
            .expect("account")
            .cash()
            .set(100.0)
            .await
            .expect("queued");
    }

    let mut tasks = Vec::new();
    for (i, from) in players.iter().copied().enumerate() {
        let to = players[(i + 1) % players.len()];
        let back = players[(i + 2) % players.len()];
        let eco = Arc::clone(&eco);
        tasks.push(tokio::spawn(async move {
            for round in 0..20 {
                let target = if round % 2 == 0 { to } else { back };
                eco.pay(15.0, from, target).await.expect("store healthy");
            }
        }));
    }
    for task in tasks {
        task.await.expect("task completed");
    }

    let mut total = 0.0;
    for id in &players {
        let cash = eco.balances(*id).await.expect("readable").cash;
        assert!(cash >= 0.0, "balance went negative: {cash}");
        total += cash;
    }
    assert_eq!(total, 600.0);
}

#[tokio::test]
async fn balances_reach_the_backend_after_flush() {
    let backend = MemoryBackend::new();
    let runtime = StoreRuntime::with_logging();
    let eco = economy(Arc::new(backend.clone()), runtime.clone());
    let (a, b) = (EntityId::new(), EntityId::new());
    eco.account(a)
        .expect("account")
        .cash()
        .set(50.0)
        .await
        .expect("queued");

    let outcome = eco.pay(20.0, a, b).await.expect("store healthy");
    assert!(outcome.is_success());
    runtime.flush().await;

    let cash = Namespace::new("bastion")
        .and_then(|ns| ns.key("cash"))
        .expect("valid key");
    assert_eq!(backend.peek(a, &cash).await, Some(RawValue::Double(30.0)));
    assert_eq!(backend.peek(b, &cash).await, Some(RawValue::Double(20.0)));
}

#[tokio::test]
async fn read_failure_aborts_the_transfer_and_reaches_the_sink() {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let reported = Arc::clone(&reported);
        Arc::new(move |err: &StoreError| {
            reported.lock().expect("sink lock").push(err.to_string());
        })
    };
    let runtime = StoreRuntime::start(sink);
    let backend = MemoryBackend::new();
    let broken = EntityId::new();
    let eco = economy(Arc::new(Flaky::new(backend.clone(), broken)), runtime.clone());
    let payer = EntityId::new();
    eco.account(payer)
        .expect("account")
        .cash()
        .set(80.0)
        .await
        .expect("queued");
    runtime.flush().await;

    let result = eco.pay(10.0, payer, broken).await;
    assert!(matches!(
        result,
        Err(EconomyError::Store(StoreError::Backend(_)))
    ));
    runtime.flush().await;

    assert_eq!(eco.balances(payer).await.expect("readable").cash, 80.0);
    let reported = reported.lock().expect("sink lock");
    assert!(reported.iter().any(|msg| msg.contains("disk unplugged")));
}

#[tokio::test]
async fn commit_does_not_read_the_balances_again() {
    let backend = MemoryBackend::new();
    let runtime = StoreRuntime::with_logging();
    let payee = EntityId::new();
    // One read to seed the balance and one for the funds check.
    let eco = economy(
        Arc::new(Flaky::allowing(backend.clone(), payee, 2)),
        runtime.clone(),
    );
    let payer = EntityId::new();
    eco.account(payer)
        .expect("account")
        .cash()
        .set(100.0)
        .await
        .expect("queued");
    eco.account(payee)
        .expect("account")
        .cash()
        .set(5.0)
        .await
        .expect("queued");
    runtime.flush().await;

    let outcome = eco.pay(30.0, payer, payee).await.expect("store healthy");
    assert!(outcome.is_success());
    runtime.flush().await;

    let cash = Namespace::new("bastion")
        .and_then(|ns| ns.key("cash"))
        .expect("valid key");
    assert_eq!(backend.peek(payer, &cash).await, Some(RawValue::Double(70.0)));
    assert_eq!(backend.peek(payee, &cash).await, Some(RawValue::Double(35.0)));
}

#[tokio::test]
async fn wrongly_typed_balance_is_an_error() {
    let backend = MemoryBackend::new();
    let eco = economy(Arc::new(backend.clone()), StoreRuntime::with_logging());
    let (a, b) = (EntityId::new(), EntityId::new());

    let cash = Namespace::new("bastion")
        .and_then(|ns| ns.key("cash"))
        .expect("valid key");
    let container: Arc<dyn BackingContainer> = backend.container_for(a);
    container
        .set(&cash, RawValue::String(String::from("lots")))
        .await
        .expect("stored");

    let result = eco.pay(1.0, a, b).await;
    assert!(matches!(
        result,
        Err(EconomyError::Store(StoreError::TypeMismatch { .. }))
    ));
    assert_eq!(
        backend.peek(a, &cash).await,
        Some(RawValue::String(String::from("lots")))
    );
}

#[tokio::test]
async fn interest_then_withdraw() {
    let eco = economy(Arc::new(MemoryBackend::new()), StoreRuntime::with_logging());
    let saver = EntityId::new();
    eco.account(saver)
        .expect("account")
        .cash()
        .set(100.0)
        .await
        .expect("queued");

    assert!(eco.deposit(saver, 100.0).await.expect("healthy").is_success());
    eco.set_interest_rate(saver, 0.1).await.expect("valid rate");
    let credited = eco.apply_interest(saver).await.expect("healthy");
    assert!((credited - 10.0).abs() < 1e-9);

    assert_eq!(
        eco.withdraw(saver, 200.0).await.expect("healthy"),
        TransferOutcome::InsufficientFunds
    );
    assert!(eco.withdraw(saver, 110.0).await.expect("healthy").is_success());
    let balances = eco.balances(saver).await.expect("readable");
    assert!((balances.cash - 110.0).abs() < 1e-9);
    assert!(balances.bank.abs() < 1e-9);
}

// =============================================================================
// Dragonfly
// =============================================================================

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_transfer_persists_both_sides() {
    let backend = DragonflyBackend::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly");
    backend.flush_all().await.expect("Failed to flush");
    let runtime = StoreRuntime::with_logging();
    let (a, b) = (EntityId::new(), EntityId::new());

    {
        let eco = economy(Arc::new(backend.clone()), runtime.clone());
        eco.account(a)
            .expect("account")
            .cash()
            .set(75.0)
            .await
            .expect("queued");
        let outcome = eco.pay(25.0, a, b).await.expect("store healthy");
        assert!(outcome.is_success());
        runtime.flush().await;
    }

    let eco = economy(Arc::new(backend.clone()), StoreRuntime::with_logging());
    assert_eq!(eco.balances(a).await.expect("readable").cash, 50.0);
    assert_eq!(eco.balances(b).await.expect("readable").cash, 25.0);

    backend.flush_all().await.expect("Failed to flush");
}
