//! Cluster resource store
//!
//! A narrow, typed view of the Kubernetes API for the node metadata operator:
//! get/list/update for MachineSets, Machines and Nodes.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{KubeStore, ResourceStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KubeStore::try_default().await?;
//!
//! let machine_set = store.get_machine_set("openshift-machine-api", "worker-a").await?;
//! let machines = store.list_machines("openshift-machine-api").await?;
//! println!("{:?} has {} candidate machines", machine_set.metadata.name, machines.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Optimistic concurrency**: updates replace the whole object and fail with
//!   [`StoreError::Conflict`] when it changed since it was read
//! - **Test double**: `MockStore` (feature `test-util`) with failure injection
//!   and a log of every write

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::ResourceStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockOp, MockStore, UpdateRecord};
