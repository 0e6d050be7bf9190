//! Error taxonomy shared across every component (spec §7).
//!
//! Components return `anyhow::Result` internally for convenience and
//! translate into this taxonomy at their public boundary, the same split the
//! teacher crate uses between `anyhow::Result` call sites and a handful of
//! typed errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("required tool missing: {0}")]
    ToolMissing(String),

    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("could not parse tool output: {0}")]
    ParseFailure(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("illegal state transition: {0}")]
    Conflict(String),

    #[error("internal error ({correlation_id}): {source}")]
    Internal {
        correlation_id: uuid::Uuid,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Stable machine code returned to clients in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "InvalidInput",
            Error::NotFound(_) => "NotFound",
            Error::ToolMissing(_) => "ToolMissing",
            Error::ToolFailure(_) => "ToolFailure",
            Error::Timeout(_) => "Timeout",
            Error::Cancelled(_) => "Cancelled",
            Error::ParseFailure(_) => "ParseFailure",
            Error::ResourceExhausted(_) => "ResourceExhausted",
            Error::Conflict(_) => "Conflict",
            Error::Internal { .. } => "Internal",
        }
    }

    /// HTTP status a boundary layer should translate this into (spec §7).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::NotFound(_) => 404,
            Error::ResourceExhausted(_) => 429,
            Error::ToolMissing(_) => 503,
            Error::Timeout(_) => 504,
            Error::Cancelled(_) => 499,
            Error::ToolFailure(_) | Error::ParseFailure(_) | Error::Conflict(_) => 500,
            Error::Internal { .. } => 500,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        let correlation_id = uuid::Uuid::new_v4();
        let source = err.into();
        tracing::error!(%correlation_id, error = ?source, "internal error");
        Error::Internal { correlation_id, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(Error::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::ResourceExhausted("x".into()).status_code(), 429);
        assert_eq!(Error::ToolMissing("x".into()).status_code(), 503);
        assert_eq!(Error::Timeout("x".into()).status_code(), 504);
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(Error::Conflict("x".into()).code(), "Conflict");
        assert_eq!(Error::ParseFailure("x".into()).code(), "ParseFailure");
    }
}
