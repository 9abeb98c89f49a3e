//! Registry error types.

use lodestar_core::{DispatchError, UrlError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("composite discovery needs at least one source")]
    NoDiscoverySources,

    #[error("malformed url: {0}")]
    MalformedUrl(#[from] UrlError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("listener rejected: {0}")]
    Dispatch(#[from] DispatchError),
}
