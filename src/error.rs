/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum GroundcoverError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    ///
    /// Only the client layer produces this; transports hand every status
    /// back to the caller as a regular response.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// The request could not be constructed or cloned.
    #[error("request build error: {0}")]
    Build(String),
    /// Request body serialization failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response body decoding failed.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request's cancellation token fired.
    #[error("request canceled")]
    Canceled,
    /// The request's deadline passed before a response arrived.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl GroundcoverError {
    /// Returns the HTTP status for [`GroundcoverError::Http`] errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
