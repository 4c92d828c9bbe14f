//! Error types for deployment (build time) and request handling (request time).
//!
//! Build-time problems are fatal: they surface as [`DeploymentError`] from
//! [`crate::deployment::RuntimeDeploymentManager::deploy`] and no partial
//! deployment is ever returned. Request-time failures are [`HandlerError`]s that
//! switch the request onto its abort chain.

use thiserror::Error;

/// Fatal configuration problems detected while building a deployment.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("invalid URI template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid media type '{0}'")]
    InvalidMediaType(String),

    #[error("invalid type descriptor '{0}'")]
    InvalidType(String),

    #[error(
        "unable to determine the element type of '{generic_type}' for parameter '{parameter}' of {method}: {reason}"
    )]
    UnresolvedConverterType {
        method: String,
        parameter: String,
        generic_type: String,
        reason: String,
    },

    #[error("{method} returns AsyncFile, which cannot be used together with WriterInterceptors")]
    AsyncFileWithWriterInterceptors { method: String },

    #[error("{method} declares more than one body parameter")]
    MultipleBodyParameters { method: String },

    #[error("parameter '{parameter}' of {method} has type {parameter_type:?} but no extractor was supplied")]
    MissingCustomExtractor {
        method: String,
        parameter: String,
        parameter_type: crate::model::ParameterType,
    },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures raised while a request walks its handler chain.
///
/// `kind()` is the lookup key used by exception mappers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// An error carrying its own HTTP status.
    #[error("HTTP {status}: {message}")]
    Web { status: u16, message: String },

    /// A user-level failure raised by an endpoint or filter.
    #[error("{kind}: {message}")]
    Application { kind: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub const WEB_APPLICATION_KIND: &str = "WebApplicationException";
pub const INTERNAL_KIND: &str = "InternalServerError";

impl HandlerError {
    pub fn web(status: u16, message: impl Into<String>) -> Self {
        Self::Web {
            status,
            message: message.into(),
        }
    }

    pub fn application(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::web(400, message)
    }

    pub fn not_found() -> Self {
        Self::web(404, "Not Found")
    }

    pub fn not_acceptable() -> Self {
        Self::web(406, "Not Acceptable")
    }

    pub fn unsupported_media_type() -> Self {
        Self::web(415, "Unsupported Media Type")
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::web(503, message)
    }

    /// Mapper lookup key.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Web { .. } => WEB_APPLICATION_KIND,
            Self::Application { kind, .. } => kind,
            Self::Internal(_) => INTERNAL_KIND,
        }
    }

    /// Status used when no mapper handles the error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Web { status, .. } => *status,
            Self::Application { .. } | Self::Internal(_) => 500,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Web { message, .. } | Self::Application { message, .. } => message,
            Self::Internal(message) => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_kind() {
        let err = HandlerError::not_found();
        assert_eq!(err.status(), 404);
        assert_eq!(err.kind(), WEB_APPLICATION_KIND);

        let err = HandlerError::application("WidgetMissing", "no widget 7");
        assert_eq!(err.status(), 500);
        assert_eq!(err.kind(), "WidgetMissing");
        assert_eq!(err.to_string(), "WidgetMissing: no widget 7");
    }

    #[test]
    fn test_deployment_error_display() {
        let err = DeploymentError::AsyncFileWithWriterInterceptors {
            method: "Files#download".to_string(),
        };
        assert!(err.to_string().contains("WriterInterceptors"));
    }
}
