//! Error types shared by the token manager, the page requester and the sync driver.

use http::StatusCode;
use thiserror::Error;

/// Errors produced while extracting records from the TikTok Business API.
#[derive(Debug, Error)]
pub enum Error {
    /// The token refresh request failed or its body could not be understood.
    ///
    /// Never retried: the sequence that needed a fresh token is aborted.
    #[error("OAuth token refresh failed: {body}")]
    Auth {
        /// The raw response body (or transport error text) returned by the token endpoint.
        body: String,
    },

    /// A resource fetch failed after the retry policy gave up.
    #[error(
        "request to {url} failed after {attempts} attempt(s){}: {message}",
        status_suffix(.status)
    )]
    Request {
        url: String,
        /// `None` when the failure happened below HTTP (connect, timeout, body decode).
        status: Option<StatusCode>,
        attempts: u32,
        message: String,
    },

    /// The API handed back the same cursor that was used to request the page.
    #[error("loop detected in pagination: cursor {cursor} is identical to the prior cursor")]
    PaginationLoop { cursor: String },

    /// The run was cancelled between pages.
    #[error("sync cancelled")]
    Cancelled,

    /// A credential could not be encoded as an HTTP header value.
    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    /// Writing a record to the downstream sink failed.
    #[error("emit record: {0}")]
    Emit(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must stop the entire run rather than only the context that hit it.
    ///
    /// Auth and request failures only abort the sequence they occurred in; sibling
    /// contexts keep going.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Error::PaginationLoop { .. } | Error::Cancelled | Error::Emit(_)
        )
    }
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
