//! Backing containers: the host-provided key/value storage per entity.
//!
//! A [`BackingContainer`] holds the raw values of exactly one entity. A
//! [`ContainerProvider`] hands out the container for a given entity. The
//! store never assumes anything about persistence format; that is the
//! provider's concern.
//!
//! [`MemoryBackend`] is the process-local provider used by tests and by the
//! host when no external store is configured. Values live in the backend,
//! not in the container handles, so they outlive any manager or store built
//! on top of them.

use std::collections::HashMap;
use std::sync::Arc;

use bastion_types::{EntityId, PrimitiveType, PropertyKey, RawValue};
use futures::future::BoxFuture;
use futures::FutureExt as _;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Key/value storage scoped to one entity.
///
/// Methods return boxed futures so providers can hand out
/// `Arc<dyn BackingContainer>` regardless of their backing technology.
pub trait BackingContainer: Send + Sync {
    /// Read the value at `key`, requiring it to be stored as `primitive`.
    ///
    /// Returns `Ok(None)` if nothing is stored. Returns
    /// [`StoreError::TypeMismatch`] if a value of another primitive type is
    /// stored.
    fn get<'a>(
        &'a self,
        key: &'a PropertyKey,
        primitive: PrimitiveType,
    ) -> BoxFuture<'a, Result<Option<RawValue>, StoreError>>;

    /// Replace the value at `key`.
    fn set<'a>(
        &'a self,
        key: &'a PropertyKey,
        value: RawValue,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Delete the value at `key`. Deleting an absent key is not an error.
    fn remove<'a>(&'a self, key: &'a PropertyKey) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Hands out the backing container for an entity.
pub trait ContainerProvider: Send + Sync {
    /// The container holding `entity`'s values.
    fn container_for(&self, entity: EntityId) -> Arc<dyn BackingContainer>;
}

/// Check a stored value against the requested primitive type.
pub(crate) fn expect_primitive(
    key: &PropertyKey,
    primitive: PrimitiveType,
    value: Option<RawValue>,
) -> Result<Option<RawValue>, StoreError> {
    match value {
        Some(raw) if raw.primitive_type() != primitive => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: primitive,
            found: raw.primitive_type(),
        }),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Values of every entity, keyed by entity then by rendered property key.
type Entries = HashMap<EntityId, HashMap<String, RawValue>>;

/// Process-local [`ContainerProvider`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values stored for `entity`.
    pub async fn len_for(&self, entity: EntityId) -> usize {
        self.entries
            .read()
            .await
            .get(&entity)
            .map_or(0, HashMap::len)
    }

    /// Read a value directly, bypassing any store. Intended for assertions.
    pub async fn peek(&self, entity: EntityId, key: &PropertyKey) -> Option<RawValue> {
        self.entries
            .read()
            .await
            .get(&entity)
            .and_then(|values| values.get(&key.to_string()))
            .cloned()
    }
}

impl ContainerProvider for MemoryBackend {
    fn container_for(&self, entity: EntityId) -> Arc<dyn BackingContainer> {
        Arc::new(MemoryContainer {
            entity,
            entries: Arc::clone(&self.entries),
        })
    }
}

/// Handle onto one entity's values inside a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    entity: EntityId,
    entries: Arc<RwLock<Entries>>,
}

impl BackingContainer for MemoryContainer {
    fn get<'a>(
        &'a self,
        key: &'a PropertyKey,
        primitive: PrimitiveType,
    ) -> BoxFuture<'a, Result<Option<RawValue>, StoreError>> {
        async move {
            let value = self
                .entries
                .read()
                .await
                .get(&self.entity)
                .and_then(|values| values.get(&key.to_string()))
                .cloned();
            expect_primitive(key, primitive, value)
        }
        .boxed()
    }

    fn set<'a>(
        &'a self,
        key: &'a PropertyKey,
        value: RawValue,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.entries
                .write()
                .await
                .entry(self.entity)
                .or_default()
                .insert(key.to_string(), value);
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a PropertyKey) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let mut entries = self.entries.write().await;
            if let Some(values) = entries.get_mut(&self.entity) {
                values.remove(&key.to_string());
                if values.is_empty() {
                    entries.remove(&self.entity);
                }
            }
            Ok(())
        }
        .boxed()
    }
}
