//! Per-entity property store.
//!
//! A [`PropertyStore`] binds one entity's backing container to a
//! [`StoreRuntime`]. It is the only place that touches the container on the
//! read path and the only place that queues writes for it.
//!
//! Every operation takes a [`StoreGuard`] so that the "lock is held"
//! requirement is checked by the type system rather than by convention.
//! Every failure is delivered to the runtime's error sink before it is
//! returned.

use std::sync::Arc;

use bastion_types::{EntityId, PropertyKey, RawValue};

use crate::codec::Codec;
use crate::container::{expect_primitive, BackingContainer};
use crate::error::StoreError;
use crate::runtime::{PendingOp, StoreGuard, StoreRuntime, WriteHandle};

/// Key/value access to one entity's values.
pub struct PropertyStore {
    entity: EntityId,
    container: Arc<dyn BackingContainer>,
    runtime: StoreRuntime,
}

impl core::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyStore")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

impl PropertyStore {
    /// Bind `container` (holding `entity`'s values) to `runtime`.
    pub fn new(
        entity: EntityId,
        container: Arc<dyn BackingContainer>,
        runtime: StoreRuntime,
    ) -> Self {
        Self {
            entity,
            container,
            runtime,
        }
    }

    /// The entity whose values this store holds.
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// The runtime serializing this store.
    pub const fn runtime(&self) -> &StoreRuntime {
        &self.runtime
    }

    /// Look up the value at `key`. Never writes.
    ///
    /// Queued writes that the worker has not applied yet are visible here.
    pub async fn read(
        &self,
        guard: &StoreGuard<'_>,
        key: &PropertyKey,
        codec: Codec,
    ) -> Result<Option<RawValue>, StoreError> {
        let result = self.read_unreported(guard, key, codec).await;
        self.reported(result)
    }

    /// Queue a replacement of the value at `key`.
    pub async fn write(
        &self,
        guard: &StoreGuard<'_>,
        key: &PropertyKey,
        codec: Codec,
        value: RawValue,
    ) -> Result<WriteHandle, StoreError> {
        let found = value.primitive_type();
        let result = if found == codec.primitive() {
            self.enqueue(guard, key, PendingOp::Set(value)).await
        } else {
            Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected: codec.primitive(),
                found,
            })
        };
        self.reported(result)
    }

    /// Queue deletion of the value at `key`.
    pub async fn remove(
        &self,
        guard: &StoreGuard<'_>,
        key: &PropertyKey,
    ) -> Result<WriteHandle, StoreError> {
        let result = self.enqueue(guard, key, PendingOp::Remove).await;
        self.reported(result)
    }

    async fn read_unreported(
        &self,
        guard: &StoreGuard<'_>,
        key: &PropertyKey,
        codec: Codec,
    ) -> Result<Option<RawValue>, StoreError> {
        if !guard.belongs_to(self.runtime.lock()) {
            return Err(StoreError::ForeignLock);
        }
        match self.runtime.pending(self.entity, key).await {
            Some(PendingOp::Set(raw)) => expect_primitive(key, codec.primitive(), Some(raw)),
            Some(PendingOp::Remove) => Ok(None),
            None => self.container.get(key, codec.primitive()).await,
        }
    }

    async fn enqueue(
        &self,
        guard: &StoreGuard<'_>,
        key: &PropertyKey,
        op: PendingOp,
    ) -> Result<WriteHandle, StoreError> {
        self.runtime
            .enqueue(guard, self.entity, key, Arc::clone(&self.container), op)
            .await
    }

    fn reported<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(err) = &result {
            self.runtime.report(err);
        }
        result
    }
}
