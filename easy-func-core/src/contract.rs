//! # contract: data model and collaborator interfaces
//!
//! This module defines the plain data carried through a deployment run and the
//! traits behind which every external collaborator sits:
//!
//! - [`SourceControlClient`]: directory listing and raw file fetch, one
//!   implementation per provider (see [`crate::source`]).
//! - [`ObjectStorage`]: a single `put_object` call.
//! - [`FunctionPlatform`] and [`Operation`]: get/create/update of a managed
//!   function, with create/update returning a long-running operation handle.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the mocks are exported behind the
//!   default `test-export-mocks` feature so integration tests and the CLI crate
//!   can use them.
//!
//! ## Adding New Collaborators
//! - Implement the trait for your backend and hand it to
//!   [`crate::deploy::Deployer`]. Convert upstream failures into the error type
//!   of the trait; classification happens in the pipeline.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Supported source-control providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::GitHub),
            "gitlab" => Ok(Provider::GitLab),
            "bitbucket" => Ok(Provider::Bitbucket),
            other => Err(format!("invalid provider: {other}")),
        }
    }
}

/// Where to look for function sources. Immutable input to one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub provider: Provider,
    /// Repository owner (GitHub), namespace (GitLab) or workspace (Bitbucket).
    pub owner: String,
    /// Repository name, or a numeric GitLab project id when `owner` is empty.
    pub repository: String,
    pub branch: String,
    /// Repository-relative directory holding the function sources.
    pub source_dir: String,
}

impl DeploymentTarget {
    /// Source directory without leading or trailing slashes.
    pub fn normalized_dir(&self) -> &str {
        self.source_dir.trim_matches('/')
    }
}

/// Source-control access token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// A discovered function source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Repository-relative path.
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, submodules and anything else that is not a regular file.
    Other,
}

/// One entry of a provider's directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    /// Repository-relative path.
    pub path: String,
    pub kind: EntryKind,
    /// Direct raw-content URL, for providers that hand one out.
    pub download_url: Option<String>,
}

/// Zip archive built from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub function_name: String,
    /// Lower-case hex SHA-256 of the source content.
    pub content_hash: String,
    /// `{folder}/{function_name}_{content_hash}.zip`
    pub storage_key: String,
    pub bytes: Vec<u8>,
}

/// Location of an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedArtifact {
    pub bucket: String,
    pub storage_key: String,
}

impl UploadedArtifact {
    pub fn location(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.storage_key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsTrigger {}

/// Function resource as sent to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    /// `projects/{project}/locations/{region}/functions/{sanitized_name}`
    pub name: String,
    pub entry_point: String,
    pub runtime: String,
    pub source_archive_url: String,
    pub https_trigger: HttpsTrigger,
    #[serde(rename = "serviceAccountEmail", skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

impl FunctionDescriptor {
    /// `projects/{project}/locations/{region}` part of the name.
    pub fn location(&self) -> &str {
        self.name
            .rsplit_once("/functions/")
            .map(|(location, _)| location)
            .unwrap_or(&self.name)
    }
}

/// A function that already exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingFunction {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
}

/// Canonical platform status codes (google.rpc.Code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Numeric google.rpc.Code. Unrecognised values map to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => StatusCode::Cancelled,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }

    /// Status name as used in REST error bodies, e.g. `NOT_FOUND`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "CANCELLED" => StatusCode::Cancelled,
            "INVALID_ARGUMENT" => StatusCode::InvalidArgument,
            "DEADLINE_EXCEEDED" => StatusCode::DeadlineExceeded,
            "NOT_FOUND" => StatusCode::NotFound,
            "ALREADY_EXISTS" => StatusCode::AlreadyExists,
            "PERMISSION_DENIED" => StatusCode::PermissionDenied,
            "RESOURCE_EXHAUSTED" => StatusCode::ResourceExhausted,
            "FAILED_PRECONDITION" => StatusCode::FailedPrecondition,
            "ABORTED" => StatusCode::Aborted,
            "OUT_OF_RANGE" => StatusCode::OutOfRange,
            "UNIMPLEMENTED" => StatusCode::Unimplemented,
            "INTERNAL" => StatusCode::Internal,
            "UNAVAILABLE" => StatusCode::Unavailable,
            "DATA_LOSS" => StatusCode::DataLoss,
            "UNAUTHENTICATED" => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }
}

/// Error reported by the function platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct PlatformError {
    pub code: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl PlatformError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Error type for object storage (simple boxed error, as for other I/O collaborators).
pub type StorageError = Box<dyn std::error::Error + Send + Sync>;

/// Directory listing and raw file fetch against one source-control provider.
///
/// Implementors map HTTP status to the taxonomy: 401/403 to
/// [`DeployError::Auth`], 404 to [`DeployError::NotFound`], anything else
/// unexpected to [`DeployError::Provider`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceControlClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// List the entries under `target.source_dir` on `target.branch`.
    ///
    /// A response describing a single file instead of a directory is a
    /// [`DeployError::Provider`].
    async fn list_directory(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<Vec<RepoEntry>, DeployError>;

    /// Fetch the raw text content of one listed entry.
    async fn fetch_raw(
        &self,
        target: &DeploymentTarget,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<String, DeployError>;
}

/// Durable object storage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `bucket/key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Handle to a long-running platform operation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Operation: Send + Sync {
    /// Resolve once the operation reached a terminal state.
    async fn wait_until_done(&self) -> Result<(), PlatformError>;
}

/// Managed serverless function platform.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    /// Fetch a function by fully qualified name. A missing function is a
    /// [`PlatformError`] with [`StatusCode::NotFound`].
    async fn get_function(&self, name: &str) -> Result<ExistingFunction, PlatformError>;

    async fn create_function(
        &self,
        location: &str,
        function: &FunctionDescriptor,
    ) -> Result<Box<dyn Operation>, PlatformError>;

    async fn update_function(
        &self,
        function: &FunctionDescriptor,
    ) -> Result<Box<dyn Operation>, PlatformError>;
}
