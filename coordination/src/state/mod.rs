//! Provider runtime state
//!
//! Mutable health information for each configured provider: circuit status,
//! failure/success streaks and rate-limit cooldowns. Every provider gets its
//! own lock so that unrelated providers never contend.
//!
//! # Architecture
//!
//! ```text
//! ProviderStateStore
//!   RwLock<HashMap<ProviderId, ──► Arc<Mutex<ProviderRuntimeState>>
//!                  (lookup/insert only)   (every read-modify-write)
//! ```

pub mod store;
pub mod types;

pub use store::{ProviderStateStore, SharedProviderStateStore};
pub use types::ProviderRuntimeState;
