use thiserror::Error;

pub type SplitSiteResult<T> = Result<T, SplitSiteError>;

#[derive(Error, Debug)]
pub enum SplitSiteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown experiment: {0}")]
    UnknownExperiment(String),

    #[error("Unknown variant '{variant}' for experiment '{experiment}'")]
    UnknownVariant { experiment: String, variant: String },

    #[error("Unknown feature flag: {0}")]
    UnknownFlag(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for SplitSiteError {
    fn from(err: config::ConfigError) -> Self {
        SplitSiteError::Config(err.to_string())
    }
}
