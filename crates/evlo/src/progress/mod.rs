pub mod store;
pub mod tracker;

pub use store::{InMemoryStore, KeyValueStore, StoreError};
pub use tracker::{FileMeta, ProgressTracker};
