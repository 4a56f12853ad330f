//! Google Cloud credentials.
//!
//! Tokens come from application default credentials through
//! `google-cloud-auth`. The token source caches and refreshes them, so the
//! bindings ask for a fresh header value on every request.

use std::sync::Arc;

use google_cloud_auth::{project::Config, token::DefaultTokenSourceProvider};
use google_cloud_token::{TokenSource, TokenSourceProvider as _};
use thiserror::Error;
use tracing::{error, info};

const AUDIENCE: &str = "https://oauth2.googleapis.com/token/";
const SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/cloud-platform"];

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("auth error: {0}")]
    Credentials(#[from] google_cloud_auth::error::Error),

    #[error("auth token error: {0}")]
    Token(Box<dyn std::error::Error + Send + Sync>),
}

/// Shared handle to a Google token source.
#[derive(Clone)]
pub struct GoogleAuth {
    source: Arc<dyn TokenSource>,
}

impl GoogleAuth {
    /// Resolve application default credentials.
    pub async fn from_environment() -> Result<Self, AuthError> {
        let config = Config::default()
            .with_audience(AUDIENCE)
            .with_scopes(&SCOPES);
        let provider = DefaultTokenSourceProvider::new(config).await.map_err(|e| {
            error!(error = %e, "Resolving Google application default credentials failed");
            AuthError::Credentials(e)
        })?;
        info!("Google credentials resolved");
        Ok(Self {
            source: provider.token_source(),
        })
    }

    /// `Authorization` header value, `Bearer <token>`.
    pub async fn authorization(&self) -> Result<String, AuthError> {
        let token = self.source.token().await.map_err(AuthError::Token)?;
        if token.starts_with("Bearer ") {
            Ok(token)
        } else {
            Ok(format!("Bearer {token}"))
        }
    }
}
