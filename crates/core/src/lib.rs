#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::{AppConfig, AssignmentScope};
pub use error::{SplitSiteError, SplitSiteResult};
pub use event_bus::{EventSink, NoOpSink};
