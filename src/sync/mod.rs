//! Remote persona config synchronization and its persisted state

mod remote;
mod state;

pub use remote::{ConfigSummary, ConfigSynchronizer, RemoteConfigSync, SyncStatus, UpdateCheck};
pub use state::{AutoSyncSettings, CacheSettings, SyncState, DEFAULT_API_BASE_URL};
