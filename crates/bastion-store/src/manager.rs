//! Property construction and the per-entity manager cache.
//!
//! A [`PropertyManager`] is the factory for one entity's properties inside
//! one namespace. [`ManagerRegistry`] keeps exactly one manager per entity
//! for the namespace it was built with, and lets the host sweep out
//! managers for entities that are no longer resident. Evicting a manager
//! only drops in-memory handles; stored values stay in the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bastion_types::{EntityId, Namespace};

use crate::codec::Persistable;
use crate::container::ContainerProvider;
use crate::error::StoreError;
use crate::property::{Merge, PersistentProperty};
use crate::runtime::StoreRuntime;
use crate::store::PropertyStore;

/// Factory for the properties of one entity in one namespace.
#[derive(Debug)]
pub struct PropertyManager {
    namespace: Namespace,
    store: Arc<PropertyStore>,
}

impl PropertyManager {
    /// Build a manager over an existing store.
    pub const fn new(namespace: Namespace, store: Arc<PropertyStore>) -> Self {
        Self { namespace, store }
    }

    /// The entity whose properties this manager creates.
    pub fn entity(&self) -> EntityId {
        self.store.entity()
    }

    /// The owner scope of every key this manager creates.
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The runtime serializing this manager's store.
    pub fn runtime(&self) -> &StoreRuntime {
        self.store.runtime()
    }

    /// Create a property whose `set` replaces the stored value.
    ///
    /// # Errors
    ///
    /// See [`create_with`](Self::create_with).
    pub fn create<T: Persistable>(
        &self,
        name: &str,
        default: T,
    ) -> Result<PersistentProperty<T>, StoreError> {
        self.create_with(name, default, Merge::replace())
    }

    /// Create a property with a custom merge rule.
    ///
    /// Pure: nothing is read or written until the property is used.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidKeyName`] if `name` violates `[a-z0-9._-]+`.
    /// - [`StoreError::InvalidDefaultValue`] if `default` is blank text.
    /// - [`StoreError::UnsupportedType`] if `T` has no codec.
    pub fn create_with<T: Persistable>(
        &self,
        name: &str,
        default: T,
        merge: Merge<T>,
    ) -> Result<PersistentProperty<T>, StoreError> {
        let key = self.namespace.key(name)?;
        if default.is_blank() {
            return Err(StoreError::InvalidDefaultValue {
                key: key.to_string(),
            });
        }
        let codec = T::codec()?;
        Ok(PersistentProperty::new(
            key,
            codec,
            default,
            merge,
            Arc::clone(&self.store),
        ))
    }
}

/// One [`PropertyManager`] per entity, for one namespace.
pub struct ManagerRegistry {
    namespace: Namespace,
    provider: Arc<dyn ContainerProvider>,
    runtime: StoreRuntime,
    managers: Mutex<HashMap<EntityId, Arc<PropertyManager>>>,
}

impl core::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("namespace", &self.namespace)
            .field("resident", &self.len())
            .finish_non_exhaustive()
    }
}

impl ManagerRegistry {
    /// Create an empty registry.
    pub fn new(
        namespace: Namespace,
        provider: Arc<dyn ContainerProvider>,
        runtime: StoreRuntime,
    ) -> Self {
        Self {
            namespace,
            provider,
            runtime,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// The namespace every manager in this registry creates keys in.
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The runtime shared by every manager in this registry.
    pub const fn runtime(&self) -> &StoreRuntime {
        &self.runtime
    }

    /// The manager for `entity`, created and cached on first request.
    ///
    /// Lookup and insertion happen under one lock, so concurrent callers
    /// for the same entity always receive the same instance.
    pub fn of(&self, entity: EntityId) -> Arc<PropertyManager> {
        let mut managers = self.managers.lock().unwrap_or_else(PoisonError::into_inner);
        let manager = managers.entry(entity).or_insert_with(|| {
            tracing::debug!(%entity, namespace = %self.namespace, "property manager created");
            let store = PropertyStore::new(
                entity,
                self.provider.container_for(entity),
                self.runtime.clone(),
            );
            Arc::new(PropertyManager::new(self.namespace.clone(), Arc::new(store)))
        });
        Arc::clone(manager)
    }

    /// Drop the cached manager for `entity`. Returns whether one existed.
    pub fn evict(&self, entity: EntityId) -> bool {
        self.managers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&entity)
            .is_some()
    }

    /// Keep only managers whose entity satisfies `resident`. Returns how
    /// many were evicted.
    pub fn retain(&self, mut resident: impl FnMut(EntityId) -> bool) -> usize {
        let mut managers = self.managers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = managers.len();
        managers.retain(|entity, _| resident(*entity));
        let evicted = before.saturating_sub(managers.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = managers.len(), "offline managers swept");
        }
        evicted
    }

    /// Whether a manager for `entity` is cached.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.managers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&entity)
    }

    /// Number of cached managers.
    pub fn len(&self) -> usize {
        self.managers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no managers are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
