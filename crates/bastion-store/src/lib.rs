//! Typed persistent property store for the Bastion plugin-support library.
//!
//! Properties are small typed values (balances, counters, flags, titles)
//! attached to an entity, usually a player, and persisted by a backing
//! container the host provides. This crate turns that untyped container
//! into typed, lazily-defaulted, merge-on-write accessors with a single
//! serialization point.
//!
//! # Architecture
//!
//! ```text
//! ManagerRegistry ──of(entity)──> PropertyManager ──create(name, default)──> PersistentProperty<T>
//!                                       │                                          │
//!                                       └──────────── PropertyStore <──────────────┘
//!                                                          │
//!                                  StoreRuntime (lock + write worker + error sink)
//!                                                          │
//!                                              BackingContainer (memory | Dragonfly)
//! ```
//!
//! # Modules
//!
//! - [`codec`] -- Value type to storage kind mapping ([`Codec`], [`Persistable`]).
//! - [`container`] -- [`BackingContainer`] / [`ContainerProvider`] and the in-memory backend.
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend.
//! - [`runtime`] -- [`StoreRuntime`]: the global lock, write worker, and error sink.
//! - [`store`] -- [`PropertyStore`]: one entity's guarded read/write/remove.
//! - [`property`] -- [`PersistentProperty`] and [`Merge`].
//! - [`manager`] -- [`PropertyManager`] and [`ManagerRegistry`].
//! - [`error`] -- [`StoreError`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use bastion_store::{ManagerRegistry, MemoryBackend, Merge, StoreRuntime};
//! use bastion_types::{EntityId, Namespace};
//!
//! # async fn demo() -> Result<(), bastion_store::StoreError> {
//! let runtime = StoreRuntime::with_logging();
//! let registry = ManagerRegistry::new(
//!     Namespace::new("bastion")?,
//!     Arc::new(MemoryBackend::new()),
//!     runtime.clone(),
//! );
//!
//! let player = EntityId::new();
//! let kills = registry.of(player).create_with("kills", 0_i64, Merge::accumulate())?;
//! kills.set(3).await?;
//! kills.set(4).await?;
//! assert_eq!(kills.get().await?, 7);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod container;
pub mod dragonfly;
pub mod error;
pub mod manager;
pub mod property;
pub mod runtime;
pub mod store;

// Re-export primary types at crate root.
pub use codec::{Codec, Persistable, ValueType};
pub use container::{BackingContainer, ContainerProvider, MemoryBackend, MemoryContainer};
pub use dragonfly::{DragonflyBackend, DragonflyContainer};
pub use error::StoreError;
pub use manager::{ManagerRegistry, PropertyManager};
pub use property::{Merge, PersistentProperty};
pub use runtime::{logging_sink, ErrorSink, StoreGuard, StoreLock, StoreRuntime, WriteHandle};
pub use store::PropertyStore;
