//! Structured error taxonomy for the field sampling engine.
//!
//! This engine is a request/response service with a documented kind -> HTTP
//! status mapping, so errors need a closed, inspectable shape — hence
//! `thiserror` here rather than an ad hoc `anyhow` chain.

use thiserror::Error;

/// One variant per error kind in the documented taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing/invalid `targetId`, non-integer chunk coordinates, `|chunks|`
    /// outside `[1,16]`, non-numeric chunk members, malformed body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No eligible row for the requested `focalId`.
    #[error("target not found: focalId={0}")]
    TargetNotFound(i64),

    /// PCA basis not loaded, or loaded with rank < 2.
    #[error("PCA basis unavailable: {0}")]
    PcaUnavailable(String),

    /// Vector-store query error or connection failure.
    #[error("vector store failure: {0}")]
    StoreFailure(String),

    /// Any other unanticipated fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The HTTP status documented for this error kind. The core engine does
    /// not depend on an HTTP crate; this is a plain `u16` that the binary in
    /// `src/bin/field_server.rs` maps to `axum::http::StatusCode`.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::BadRequest(_) => 400,
            EngineError::TargetNotFound(_) => 404,
            EngineError::PcaUnavailable(_) => 500,
            EngineError::StoreFailure(_) => 500,
            EngineError::Internal(_) => 500,
        }
    }

    /// Short machine-readable kind tag, used in the JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BadRequest(_) => "BadRequest",
            EngineError::TargetNotFound(_) => "TargetNotFound",
            EngineError::PcaUnavailable(_) => "PcaUnavailable",
            EngineError::StoreFailure(_) => "StoreFailure",
            EngineError::Internal(_) => "Internal",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
