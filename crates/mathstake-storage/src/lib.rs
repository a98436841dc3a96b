//! Storage for the MathStake market: problems, solutions, profiles, the
//! append-only transaction log and the external payout hand-off log.
//!
//! [`MarketStore`] is the seam; [`MemoryStore`] keeps everything in memory
//! and can persist to a JSON [`Snapshot`] file between runs.

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use snapshot::{MarketState, Snapshot, SnapshotMetadata, SNAPSHOT_VERSION};
pub use store::{MarketStore, StoreStats};
