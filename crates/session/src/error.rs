// crates/session/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use mailshift_api::ApiError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,

    /// Local validation failure; no remote call was made.
    #[error("{0}")]
    Validation(String),

    /// The server answered, and the answer was no.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to persist session at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
