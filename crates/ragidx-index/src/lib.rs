//! ragidx-index
//!
//! Versioned hybrid index: immutable snapshots, the index manager that
//! refreshes and queries them, score fusion, and the debounced background
//! refresh driven by filesystem notifications.
pub mod coordinator;
pub mod fusion;
pub mod manager;
pub mod manifest;
pub mod snapshot;
pub mod watch;

pub use coordinator::{CoordinatorHandle, RefreshCoordinator, RefreshStatus, Signal};
pub use manager::{CombinedResponse, IndexManager, IndexedResult, ManagerSettings};
pub use snapshot::{InFlight, IndexSnapshot, SnapshotGuard};
pub use watch::IndexWatcher;
