//! Crate-level error type for the public operations.

use thiserror::Error;

use crate::security::SecurityError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no parser registered for format: {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}
