//! Dual-tier persistence: a local key-value store that is always the source of
//! truth, and a remote data API that is mirrored on a best-effort basis.

pub mod favorites;
pub mod kv;
pub mod memory;
pub mod photos;
pub mod remote;

use thiserror::Error;

pub use favorites::{FavoriteItem, FavoriteKind, FavoritesStore};
pub use kv::{JsonFileStore, KeyValueStore};
pub use memory::{MemoryKvStore, MemoryRemote};
pub use photos::{LocalFirstStore, PhotoFile, RemoteHealth, UserPhoto};
pub use remote::{Filter, RemoteApi, RowQuery, SupabaseRemote};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("local store quota exceeded writing '{key}' ({needed} bytes, quota {quota})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },
    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("local store lock poisoned")]
    LockPoisoned,
    #[error("remote request failed: {0}")]
    RemoteHttp(#[from] reqwest::Error),
    #[error("remote API error: {0}")]
    Remote(String),
    #[error("remote tier is not configured")]
    RemoteNotConfigured,
    #[error("photo upload failed on every tier: {}", reasons.join("; "))]
    AllTiersFailed { reasons: Vec<String> },
}
