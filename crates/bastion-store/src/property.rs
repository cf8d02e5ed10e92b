//! Typed accessors bound to one key in one store.
//!
//! A [`PersistentProperty`] is constructed once (by a
//! [`PropertyManager`](crate::PropertyManager)) and reused. It holds no
//! value of its own: every `get` reads the store, every `set` writes it.
//!
//! # Access semantics
//!
//! - `get`: stored value if present. Otherwise the default is queued for
//!   writing and returned immediately.
//! - `set(new)`: writes `merge(new, current)`, where `current` is the
//!   stored value or `None` if nothing is stored yet.
//! - `put(value)`: writes `value` as-is. Neither reads the store nor
//!   applies the merge rule.
//! - `remove`: deletes the stored value; the next `get` sees the default.
//!
//! Each call acquires the runtime lock for its whole read-then-write. The
//! `*_with` variants take an already-held guard so several properties can
//! be read and written under one acquisition.

use std::ops::Add;
use std::sync::Arc;

use bastion_types::{EntityId, PropertyKey, RawValue};

use crate::codec::{decode, Codec, Persistable};
use crate::error::StoreError;
use crate::runtime::{StoreGuard, StoreRuntime, WriteHandle};
use crate::store::PropertyStore;

/// Rule combining a newly set value with the currently stored one.
pub struct Merge<T> {
    f: Arc<dyn Fn(T, Option<T>) -> T + Send + Sync>,
}

impl<T> Clone for Merge<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T> core::fmt::Debug for Merge<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Merge(..)")
    }
}

impl<T: Clone + Send + Sync + 'static> Merge<T> {
    /// Wrap an arbitrary `(new, current) -> stored` function.
    pub fn new(f: impl Fn(T, Option<T>) -> T + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Store the new value as-is.
    pub fn replace() -> Self {
        Self::new(|new, _| new)
    }

    /// Ignore the new value and store `value` instead.
    pub fn reset_to(value: T) -> Self {
        Self::new(move |_, _| value.clone())
    }

    /// Combine `new` with `current`.
    pub fn apply(&self, new: T, current: Option<T>) -> T {
        (self.f)(new, current)
    }
}

impl<T: Add<Output = T> + Default + Clone + Send + Sync + 'static> Merge<T> {
    /// Add the new value to the current one (or to `T::default()` if
    /// nothing is stored).
    pub fn accumulate() -> Self {
        Self::new(|new, current| current.unwrap_or_default() + new)
    }
}

/// A typed handle onto one key of one entity's store.
pub struct PersistentProperty<T> {
    key: PropertyKey,
    codec: Codec,
    default: T,
    merge: Merge<T>,
    store: Arc<PropertyStore>,
}

impl<T: Clone> Clone for PersistentProperty<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            codec: self.codec,
            default: self.default.clone(),
            merge: self.merge.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for PersistentProperty<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PersistentProperty")
            .field("entity", &self.store.entity())
            .field("key", &self.key)
            .field("codec", &self.codec)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl<T: Persistable> PersistentProperty<T> {
    /// Bind a validated key and codec to `store`. Does not touch the store.
    pub(crate) const fn new(
        key: PropertyKey,
        codec: Codec,
        default: T,
        merge: Merge<T>,
        store: Arc<PropertyStore>,
    ) -> Self {
        Self {
            key,
            codec,
            default,
            merge,
            store,
        }
    }

    /// The key this property reads and writes.
    pub const fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// The value `get` returns when nothing is stored.
    pub const fn default_value(&self) -> &T {
        &self.default
    }

    /// The entity owning the underlying store.
    pub fn entity(&self) -> EntityId {
        self.store.entity()
    }

    /// The runtime whose lock serializes this property.
    pub fn runtime(&self) -> &StoreRuntime {
        self.store.runtime()
    }

    /// Read the value, lazily storing the default on first access.
    pub async fn get(&self) -> Result<T, StoreError> {
        let guard = self.runtime().lock().acquire().await;
        self.get_with(&guard).await
    }

    /// [`get`](Self::get) under an already-held guard.
    pub async fn get_with(&self, guard: &StoreGuard<'_>) -> Result<T, StoreError> {
        match self.read_current(guard).await? {
            Some(value) => Ok(value),
            None => {
                // Best effort: a failure is already on its way to the sink.
                let _ = self
                    .store
                    .write(guard, &self.key, self.codec, self.default.to_raw())
                    .await;
                Ok(self.default.clone())
            }
        }
    }

    /// Store `merge(new, current)`.
    pub async fn set(&self, new: T) -> Result<WriteHandle, StoreError> {
        let guard = self.runtime().lock().acquire().await;
        self.set_with(&guard, new).await
    }

    /// [`set`](Self::set) under an already-held guard.
    pub async fn set_with(&self, guard: &StoreGuard<'_>, new: T) -> Result<WriteHandle, StoreError> {
        let current = self.read_current(guard).await?;
        let value = self.merge.apply(new, current);
        self.store
            .write(guard, &self.key, self.codec, value.to_raw())
            .await
    }

    /// Store `value` as-is, skipping the read and the merge rule.
    ///
    /// For callers that already read and validated the current value under
    /// the same guard and now hold the absolute value to store.
    pub async fn put(&self, value: T) -> Result<WriteHandle, StoreError> {
        let guard = self.runtime().lock().acquire().await;
        self.put_with(&guard, value).await
    }

    /// [`put`](Self::put) under an already-held guard.
    pub async fn put_with(&self, guard: &StoreGuard<'_>, value: T) -> Result<WriteHandle, StoreError> {
        self.store
            .write(guard, &self.key, self.codec, value.to_raw())
            .await
    }

    /// Delete the stored value.
    pub async fn remove(&self) -> Result<WriteHandle, StoreError> {
        let guard = self.runtime().lock().acquire().await;
        self.remove_with(&guard).await
    }

    /// [`remove`](Self::remove) under an already-held guard.
    pub async fn remove_with(&self, guard: &StoreGuard<'_>) -> Result<WriteHandle, StoreError> {
        self.store.remove(guard, &self.key).await
    }

    async fn read_current(&self, guard: &StoreGuard<'_>) -> Result<Option<T>, StoreError> {
        self.store
            .read(guard, &self.key, self.codec)
            .await?
            .map(|raw: RawValue| self.decode(raw))
            .transpose()
    }

    fn decode(&self, raw: RawValue) -> Result<T, StoreError> {
        decode(&self.key, self.codec, raw).inspect_err(|err| self.runtime().report(err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bastion_types::{Namespace, PrimitiveType};
    use futures::future::BoxFuture;

    use super::*;
    use crate::container::{BackingContainer, ContainerProvider, MemoryBackend};

    /// Counts calls reaching the wrapped container.
    struct Counting {
        gets: Arc<AtomicUsize>,
        sets: Arc<AtomicUsize>,
        inner: Arc<dyn BackingContainer>,
    }

    impl BackingContainer for Counting {
        fn get<'a>(
            &'a self,
            key: &'a PropertyKey,
            primitive: PrimitiveType,
        ) -> BoxFuture<'a, Result<Option<RawValue>, StoreError>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key, primitive)
        }

        fn set<'a>(
            &'a self,
            key: &'a PropertyKey,
            value: RawValue,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove<'a>(&'a self, key: &'a PropertyKey) -> BoxFuture<'a, Result<(), StoreError>> {
            self.inner.remove(key)
        }
    }

    struct Fixture {
        runtime: StoreRuntime,
        backend: MemoryBackend,
        store: Arc<PropertyStore>,
        gets: Arc<AtomicUsize>,
        sets: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let runtime = StoreRuntime::with_logging();
        let backend = MemoryBackend::new();
        let entity = EntityId::new();
        let gets = Arc::new(AtomicUsize::new(0));
        let sets = Arc::new(AtomicUsize::new(0));
        let container = Arc::new(Counting {
            gets: Arc::clone(&gets),
            sets: Arc::clone(&sets),
            inner: backend.container_for(entity),
        });
        let store = Arc::new(PropertyStore::new(entity, container, runtime.clone()));
        Fixture {
            runtime,
            backend,
            store,
            gets,
            sets,
        }
    }

    fn property<T: Persistable>(
        fx: &Fixture,
        name: &str,
        default: T,
        merge: Merge<T>,
    ) -> PersistentProperty<T> {
        let key = Namespace::new("test").unwrap().key(name).unwrap();
        PersistentProperty::new(key, T::codec().unwrap(), default, merge, Arc::clone(&fx.store))
    }

    #[tokio::test]
    async fn lazy_default_is_written_exactly_once() {
        let fx = fixture();
        let prop = property(&fx, "cash", 0.0_f64, Merge::replace());

        assert_eq!(prop.get().await.unwrap(), 0.0);
        assert_eq!(prop.get().await.unwrap(), 0.0);
        fx.runtime.flush().await;

        assert_eq!(fx.sets.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.backend.peek(prop.entity(), prop.key()).await,
            Some(RawValue::Double(0.0))
        );
    }

    #[tokio::test]
    async fn round_trip_scalars_and_text() {
        let fx = fixture();
        let cash = property(&fx, "cash", 0.0_f64, Merge::replace());
        let title = property(&fx, "title", String::from("none"), Merge::replace());
        let flag = property(&fx, "flag", false, Merge::replace());
        let glyph = property(&fx, "glyph", 'a', Merge::replace());

        cash.set(12.5).await.unwrap();
        title.set(String::from("Baron")).await.unwrap();
        flag.set(true).await.unwrap();
        glyph.set('λ').await.unwrap();
        fx.runtime.flush().await;

        assert_eq!(cash.get().await.unwrap(), 12.5);
        assert_eq!(title.get().await.unwrap(), "Baron");
        assert!(flag.get().await.unwrap());
        assert_eq!(glyph.get().await.unwrap(), 'λ');
    }

    #[tokio::test]
    async fn round_trip_arrays() {
        let fx = fixture();
        let homes = property(&fx, "homes", Vec::<i64>::new(), Merge::replace());

        homes.set(vec![1, -2, 3]).await.unwrap().wait().await.unwrap();
        assert_eq!(homes.get().await.unwrap(), vec![1, -2, 3]);
    }

    #[tokio::test]
    async fn accumulate_merge_sums_sequential_sets() {
        let fx = fixture();
        let kills = property(&fx, "kills", 0_i64, Merge::accumulate());

        kills.set(3).await.unwrap();
        kills.set(4).await.unwrap();
        fx.runtime.flush().await;

        assert_eq!(kills.get().await.unwrap(), 7);
        assert_eq!(
            fx.backend.peek(kills.entity(), kills.key()).await,
            Some(RawValue::Long(7))
        );
    }

    #[tokio::test]
    async fn merge_sees_none_before_first_write() {
        let fx = fixture();
        let merge = Merge::new(|new: i32, current: Option<i32>| match current {
            None => new * 100,
            Some(c) => c + new,
        });
        let score = property(&fx, "score", 5_i32, merge);

        score.set(1).await.unwrap();
        score.set(2).await.unwrap();
        assert_eq!(score.get().await.unwrap(), 102);
    }

    #[tokio::test]
    async fn reset_merge_always_stores_default() {
        let fx = fixture();
        let streak = property(&fx, "streak", 0_i32, Merge::reset_to(0));

        streak.set(9).await.unwrap();
        assert_eq!(streak.get().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn put_skips_read_and_merge() {
        let fx = fixture();
        let kills = property(&fx, "kills", 0_i64, Merge::accumulate());

        kills.set(5).await.unwrap();
        fx.runtime.flush().await;
        let reads = fx.gets.load(Ordering::SeqCst);

        {
            let guard = fx.runtime.lock().acquire().await;
            kills.put_with(&guard, 2).await.unwrap();
        }
        kills.put(9).await.unwrap();
        assert_eq!(fx.gets.load(Ordering::SeqCst), reads);

        fx.runtime.flush().await;
        assert_eq!(
            fx.backend.peek(kills.entity(), kills.key()).await,
            Some(RawValue::Long(9))
        );
    }

    #[tokio::test]
    async fn remove_restores_default() {
        let fx = fixture();
        let cash = property(&fx, "cash", 1.0_f64, Merge::replace());

        cash.set(50.0).await.unwrap();
        cash.remove().await.unwrap();
        assert_eq!(cash.get().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn stored_type_mismatch_surfaces_error() {
        let fx = fixture();
        let text = property(&fx, "shared", String::from("x"), Merge::replace());
        let number = property(&fx, "shared", 0.0_f64, Merge::replace());

        text.set(String::from("hello")).await.unwrap();
        let result = number.get().await;
        assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn guarded_variants_compose_under_one_lock() {
        let fx = fixture();
        let a = property(&fx, "a", 10_i32, Merge::replace());
        let b = property(&fx, "b", 0_i32, Merge::replace());

        {
            let guard = fx.runtime.lock().acquire().await;
            let av = a.get_with(&guard).await.unwrap();
            a.set_with(&guard, av - 4).await.unwrap();
            b.set_with(&guard, 4).await.unwrap();
        }

        assert_eq!(a.get().await.unwrap(), 6);
        assert_eq!(b.get().await.unwrap(), 4);
    }
}
