//! `Dragonfly` (Redis-compatible) backing containers.
//!
//! Each property value lives under its own key, JSON-encoded as a
//! [`RawValue`] so the primitive type survives the round trip.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `entity:{id}:prop:{namespace}:{name}` | JSON | One property value |

use std::sync::Arc;

use bastion_types::{EntityId, PrimitiveType, PropertyKey, RawValue};
use fred::prelude::*;
use futures::future::BoxFuture;
use futures::FutureExt as _;

use crate::container::{expect_primitive, BackingContainer, ContainerProvider};
use crate::error::StoreError;

/// Connection handle to a `Dragonfly` instance, usable as a
/// [`ContainerProvider`].
#[derive(Clone)]
pub struct DragonflyBackend {
    client: Client,
}

impl DragonflyBackend {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Backend(format!("invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl ContainerProvider for DragonflyBackend {
    fn container_for(&self, entity: EntityId) -> Arc<dyn BackingContainer> {
        Arc::new(DragonflyContainer {
            client: self.client.clone(),
            entity,
        })
    }
}

/// One entity's values inside `Dragonfly`.
#[derive(Clone)]
pub struct DragonflyContainer {
    client: Client,
    entity: EntityId,
}

impl DragonflyContainer {
    /// The `Dragonfly` key holding `key` for this entity.
    pub fn redis_key(&self, key: &PropertyKey) -> String {
        format!("entity:{}:prop:{key}", self.entity)
    }
}

impl BackingContainer for DragonflyContainer {
    fn get<'a>(
        &'a self,
        key: &'a PropertyKey,
        primitive: PrimitiveType,
    ) -> BoxFuture<'a, Result<Option<RawValue>, StoreError>> {
        async move {
            let stored: Option<String> = self.client.get(self.redis_key(key)).await?;
            let value = stored
                .map(|json| serde_json::from_str::<RawValue>(&json))
                .transpose()?;
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
            let json = serde_json::to_string(&value)?;
            let _: () = self
                .client
                .set(self.redis_key(key), json.as_str(), None, None, false)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a PropertyKey) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let _: u32 = self.client.del(self.redis_key(key)).await?;
            Ok(())
        }
        .boxed()
    }
}
