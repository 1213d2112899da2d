//! # Error Handling
//!
//! Almost nothing in selectcrate is allowed to fail a request. Malformed input is
//! normalized, collection failures degrade to an empty [`Page`](crate::Page),
//! and cache failures fall through to live permission checks. The error types
//! below exist so those failures can be logged precisely before they are
//! swallowed.
//!
//! The one exception is [`AutocompleteError::MissingResourceType`]: a collection
//! without a resource type is a setup mistake and is propagated to the caller.
//!
//! ## Logging
//!
//! Internal details are logged through `tracing` and never sent to clients
//! outside of debug mode.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::time::Duration;

/// Failure inside a [`Collection`](crate::Collection) query.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error(transparent)]
    Database(#[from] DbErr),

    #[error("{0}")]
    Message(String),
}

/// Failure reported by a permission cache backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache backend does not support {0}")]
    Unsupported(&'static str),
}

/// Failure reported by the external authorization oracle.
#[derive(Debug, thiserror::Error)]
#[error("permission oracle error: {0}")]
pub struct OracleError(pub String);

/// Errors raised while resolving an autocomplete request.
#[derive(Debug, thiserror::Error)]
pub enum AutocompleteError {
    /// The collection has no resource type. Never recovered.
    #[error("no resource type configured for this autocomplete")]
    MissingResourceType,

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("autocomplete query timed out after {0:?}")]
    Timeout(Duration),
}

impl AutocompleteError {
    /// Create a hook error from any displayable cause.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook(message.into())
    }

    /// Whether this error must propagate instead of degrading to an empty page.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingResourceType)
    }
}

impl From<DbErr> for AutocompleteError {
    fn from(err: DbErr) -> Self {
        Self::Collection(CollectionError::Database(err))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AutocompleteError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Autocomplete misconfigured");

        let body = ErrorResponse {
            error: "Autocomplete is not configured".to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
