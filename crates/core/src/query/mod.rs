//! Query coordination: in-memory freshness, deduplication and retries.

pub mod coordinator;
pub mod key;
pub mod retry;

pub use coordinator::{QueryConfig, QueryCoordinator, QueryObserver, RevalidateTrigger};
pub use key::QueryKey;
pub use retry::RetryPolicy;
