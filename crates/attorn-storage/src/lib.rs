//! Attorn Storage - key-value persistence behind one async trait.
//!
//! Token stores, delegation snapshots and the distributed validator's
//! shared cache all sit on a [`KvStore`]. The in-process
//! [`MemoryKvStore`] supports per-entry TTLs; production deployments plug
//! in a networked store behind the same trait.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use attorn_storage::{KvStore, MemoryKvStore};
//!
//! let store = MemoryKvStore::new();
//! store.set("tokens", "abc", b"record".to_vec()).await.unwrap();
//! assert_eq!(store.get("tokens", "abc").await.unwrap(), Some(b"record".to_vec()));
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};
