//! Error taxonomy for a deployment run.
//!
//! Every failure the pipeline can produce is classified into one
//! [`DeployError`] variant. Nothing in the pipeline retries: transient network
//! failures surface as [`DeployError::Provider`] and are the caller's concern.

use std::fmt;

use thiserror::Error;

use crate::contract::Provider;

/// Message shown to users when the platform rejects the function resource.
pub const INVALID_CONFIG_MESSAGE: &str = "Invalid resource field value in the request. \
Please check your project settings and ensure all resources are correctly configured.";

#[derive(Error, Debug)]
pub enum DeployError {
    /// Missing, invalid or expired source-control token.
    #[error("authentication with {provider} failed: {message}")]
    Auth { provider: Provider, message: String },

    /// Repository, branch or path does not exist.
    #[error("{provider} could not find the requested resource: {message}")]
    NotFound { provider: Provider, message: String },

    /// Unexpected status, transport failure or response shape from a collaborator.
    #[error("unexpected response from {service}: {message}")]
    Provider {
        service: String,
        message: String,
        /// Raw response body or upstream error text, when available.
        diagnostic: Option<String>,
    },

    #[error("unable to find the entry point for function in file: {path}")]
    EntryPointNotFound { path: String },

    #[error("upload of gs://{bucket}/{key} failed: {message}")]
    Storage {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("deployment of {function} failed ({kind}): {message}")]
    Deployment {
        kind: DeploymentErrorKind,
        function: String,
        message: String,
    },

    /// Two or more source files map to the same platform function name.
    #[error("function name {name} is claimed by more than one source file: {}", paths.join(", "))]
    NameCollision { name: String, paths: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentErrorKind {
    /// The platform rejected a field of the function resource.
    InvalidConfig,
    /// The long-running operation did not finish within the configured timeout.
    Timeout,
    /// Any other platform-reported failure.
    Platform,
}

impl fmt::Display for DeploymentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentErrorKind::InvalidConfig => "invalid-config",
            DeploymentErrorKind::Timeout => "timeout",
            DeploymentErrorKind::Platform => "platform",
        })
    }
}

impl DeployError {
    pub(crate) fn provider(service: impl Into<String>, message: impl Into<String>) -> Self {
        DeployError::Provider {
            service: service.into(),
            message: message.into(),
            diagnostic: None,
        }
    }

    pub(crate) fn provider_with_body(
        service: impl Into<String>,
        message: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        DeployError::Provider {
            service: service.into(),
            message: message.into(),
            diagnostic: Some(body.into()),
        }
    }

    /// Short machine-readable name of the error class.
    pub fn class(&self) -> &'static str {
        match self {
            DeployError::Auth { .. } => "auth",
            DeployError::NotFound { .. } => "not-found",
            DeployError::Provider { .. } => "provider",
            DeployError::EntryPointNotFound { .. } => "entry-point-not-found",
            DeployError::Storage { .. } => "storage",
            DeployError::Deployment { .. } => "deployment",
            DeployError::NameCollision { .. } => "name-collision",
        }
    }
}
