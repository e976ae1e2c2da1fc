//! The persistence seam: a synchronous string-keyed store that survives
//! reloads and is cleared only by explicit action.

use splitsite_core::SplitSiteError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store full: refusing new key '{0}'")]
    Full(String),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for SplitSiteError {
    fn from(err: StoreError) -> Self {
        SplitSiteError::Storage(err.to_string())
    }
}

/// Key-value store consumed by the experiment engine.
///
/// Every call may fail; callers on the read path treat a failure as "no
/// value stored".
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;
}
