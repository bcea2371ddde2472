// Storage module - Durable coordination state
// Crash-recoverable records for in-flight transactions, deployment
// completion markers, votes, and nonce hints

mod store;

pub use store::{CoordStore, StorageStats, StoreError};
