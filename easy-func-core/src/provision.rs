//! Create-or-update provisioning of managed functions.
//!
//! Each call runs a small state machine:
//!
//! ```text
//! Probe --found--> Updating --done--> Deployed
//!   |                  \--error/timeout--> Failed
//!   +--not found--> Creating --done--> Deployed
//!   |                  \--error/timeout--> Failed
//!   +--other error--> Failed
//! ```
//!
//! Probing before writing makes repeated deployments converge instead of
//! failing with "already exists". Another writer can still create the function
//! between probe and create; that surfaces as a platform error.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::contract::{
    FunctionDescriptor, FunctionPlatform, HttpsTrigger, Operation, PlatformError, StatusCode,
    UploadedArtifact,
};
use crate::error::{DeployError, DeploymentErrorKind, INVALID_CONFIG_MESSAGE};

/// Platform limit on function name length.
pub const MAX_FUNCTION_NAME_LEN: usize = 63;

const INVALID_RESOURCE_SIGNATURE: &str = "Invalid resource field value in the request.";

/// Lower-case `name`, replace everything outside `[a-z0-9-]` with `-` and
/// truncate to [`MAX_FUNCTION_NAME_LEN`] characters.
pub fn sanitize_function_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .take(MAX_FUNCTION_NAME_LEN)
        .collect()
}

/// Which transition the provisioner took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionAction {
    Created,
    Updated,
}

/// Inputs that do not vary per function.
#[derive(Debug, Clone)]
pub struct FunctionSettings {
    /// `projects/{project}/locations/{region}`
    pub location: String,
    pub runtime: String,
    pub service_account: Option<String>,
}

impl FunctionSettings {
    pub fn descriptor(
        &self,
        platform_name: &str,
        entry_point: &str,
        artifact: &UploadedArtifact,
    ) -> FunctionDescriptor {
        FunctionDescriptor {
            name: format!(
                "{}/functions/{}",
                self.location,
                sanitize_function_name(platform_name)
            ),
            entry_point: entry_point.to_string(),
            runtime: self.runtime.clone(),
            source_archive_url: artifact.location(),
            https_trigger: HttpsTrigger::default(),
            service_account: self.service_account.clone(),
        }
    }
}

pub struct FunctionProvisioner<P> {
    platform: P,
    operation_timeout: Duration,
}

impl<P: FunctionPlatform> FunctionProvisioner<P> {
    pub fn new(platform: P, operation_timeout: Duration) -> Self {
        Self {
            platform,
            operation_timeout,
        }
    }

    /// Create the function if absent, update it otherwise, and wait for the
    /// platform operation to finish. Returns the fully qualified name.
    pub async fn provision(&self, descriptor: &FunctionDescriptor) -> Result<String, DeployError> {
        self.provision_with_action(descriptor)
            .await
            .map(|(name, _)| name)
    }

    pub async fn provision_with_action(
        &self,
        descriptor: &FunctionDescriptor,
    ) -> Result<(String, ProvisionAction), DeployError> {
        let name = descriptor.name.as_str();
        info!(function = name, "Probing for existing function");

        let (operation, action) = match self.platform.get_function(name).await {
            Ok(existing) => {
                debug!(function = name, status = ?existing.status, "Function exists, updating");
                let op = self
                    .platform
                    .update_function(descriptor)
                    .await
                    .map_err(|e| classify(name, e))?;
                (op, ProvisionAction::Updated)
            }
            Err(e) if e.code == StatusCode::NotFound => {
                debug!(function = name, "Function does not exist, creating");
                let op = self
                    .platform
                    .create_function(descriptor.location(), descriptor)
                    .await
                    .map_err(|e| classify(name, e))?;
                (op, ProvisionAction::Created)
            }
            Err(e) if is_invalid_config(&e) => return Err(classify(name, e)),
            Err(e) => {
                error!(function = name, error = %e, "Existence probe failed");
                return Err(DeployError::Provider {
                    service: "function platform".into(),
                    message: format!("probing {name} failed: {e}"),
                    diagnostic: e.details,
                });
            }
        };

        info!(function = name, ?action, "Waiting for platform operation to complete");
        self.await_operation(name, operation.as_ref()).await?;
        info!(function = name, ?action, "Function deployed");
        Ok((descriptor.name.clone(), action))
    }

    async fn await_operation(&self, name: &str, operation: &dyn Operation) -> Result<(), DeployError> {
        match tokio::time::timeout(self.operation_timeout, operation.wait_until_done()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(function = name, error = %e, "Platform operation failed");
                Err(classify(name, e))
            }
            Err(_) => {
                error!(function = name, timeout = ?self.operation_timeout, "Platform operation timed out");
                Err(DeployError::Deployment {
                    kind: DeploymentErrorKind::Timeout,
                    function: name.to_string(),
                    message: format!(
                        "operation did not complete within {:?}",
                        self.operation_timeout
                    ),
                })
            }
        }
    }
}

fn is_invalid_config(e: &PlatformError) -> bool {
    e.code == StatusCode::InvalidArgument
        && (e.message.contains(INVALID_RESOURCE_SIGNATURE)
            || e
                .details
                .as_deref()
                .is_some_and(|d| d.contains(INVALID_RESOURCE_SIGNATURE)))
}

fn classify(function: &str, e: PlatformError) -> DeployError {
    if is_invalid_config(&e) {
        DeployError::Deployment {
            kind: DeploymentErrorKind::InvalidConfig,
            function: function.to_string(),
            message: INVALID_CONFIG_MESSAGE.to_string(),
        }
    } else {
        let message = match &e.details {
            Some(details) => format!("{e} ({details})"),
            None => e.to_string(),
        };
        DeployError::Deployment {
            kind: DeploymentErrorKind::Platform,
            function: function.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_symbols_and_lowercases() {
        assert_eq!(sanitize_function_name("My Func!!"), "my-func--");
        assert_eq!(sanitize_function_name("easy_func_hello_http"), "easy-func-hello-http");
    }

    #[test]
    fn sanitize_truncates_to_platform_limit() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_function_name(&long).len(), MAX_FUNCTION_NAME_LEN);
    }

    #[test]
    fn sanitize_counts_characters_not_bytes() {
        // Non-ASCII characters become a single '-' each.
        assert_eq!(sanitize_function_name("héllo"), "h-llo");
    }

    #[test]
    fn descriptor_uses_sanitized_name_under_location() {
        let settings = FunctionSettings {
            location: "projects/p/locations/europe-west1".into(),
            runtime: "python39".into(),
            service_account: Some("sa@p.iam.gserviceaccount.com".into()),
        };
        let artifact = UploadedArtifact {
            bucket: "easy-func".into(),
            storage_key: "deployments/hello_abc.zip".into(),
        };
        let descriptor = settings.descriptor("easy_func_Hello_http", "hello", &artifact);
        assert_eq!(
            descriptor.name,
            "projects/p/locations/europe-west1/functions/easy-func-hello-http"
        );
        assert_eq!(descriptor.source_archive_url, "gs://easy-func/deployments/hello_abc.zip");
        assert_eq!(descriptor.service_account.as_deref(), Some("sa@p.iam.gserviceaccount.com"));
    }

    #[test]
    fn invalid_resource_is_rewritten() {
        let e = PlatformError::new(StatusCode::InvalidArgument, "bad request")
            .with_details(INVALID_RESOURCE_SIGNATURE);
        let err = classify("f", e);
        assert!(matches!(
            err,
            DeployError::Deployment { kind: DeploymentErrorKind::InvalidConfig, ref message, .. }
                if message == INVALID_CONFIG_MESSAGE
        ));
    }

    #[test]
    fn other_platform_errors_pass_diagnostic_through() {
        let err = classify("f", PlatformError::new(StatusCode::PermissionDenied, "no access"));
        assert!(matches!(
            err,
            DeployError::Deployment { kind: DeploymentErrorKind::Platform, ref message, .. }
                if message.contains("no access")
        ));
    }
}
