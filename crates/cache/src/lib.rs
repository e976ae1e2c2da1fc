#![warn(clippy::unwrap_used)]

pub mod disabled;
pub mod file;
pub mod local;
pub mod store;

pub use disabled::DisabledStore;
pub use file::FileStore;
pub use local::LocalStore;
pub use store::{KeyValueStore, StoreError, StoreResult};
