//! Store that refuses every operation, the way browser storage behaves under
//! strict privacy settings.

use crate::store::{KeyValueStore, StoreError, StoreResult};

pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledStore {
    fn default() -> Self {
        Self::new("storage disabled")
    }
}

impl KeyValueStore for DisabledStore {
    fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn remove(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }
}
