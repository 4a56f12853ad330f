use std::time::Duration;

use tracing::{debug, info};

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_FOLDER: &str = "deployments";
pub const DEFAULT_RUNTIME: &str = "python39";
pub const DEFAULT_NAME_PREFIX: &str = "easy_func_";
pub const DEFAULT_NAME_SUFFIX: &str = "_http";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(540);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Everything a deployment run needs besides the target and the token.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub project_id: String,
    pub region: String,
    /// Service account the deployed functions run as.
    pub service_account: Option<String>,
    pub bucket: String,
    /// Object key prefix for uploaded archives.
    pub folder: String,
    pub runtime: String,
    pub name_prefix: String,
    pub name_suffix: String,
    /// Upper bound on per-function pipelines in flight.
    pub max_concurrency: usize,
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
    pub endpoints: ProviderEndpoints,
}

impl DeployConfig {
    /// Config with defaults for everything but the project and the bucket.
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: DEFAULT_REGION.to_string(),
            service_account: None,
            bucket: bucket.into(),
            folder: DEFAULT_FOLDER.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            name_suffix: DEFAULT_NAME_SUFFIX.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            endpoints: ProviderEndpoints::default(),
        }
    }

    /// `projects/{project}/locations/{region}`
    pub fn location(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.region)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.project_id.trim().is_empty() {
            return Err("project id must not be empty".into());
        }
        if self.region.trim().is_empty() {
            return Err("region must not be empty".into());
        }
        if self.bucket.trim().is_empty() {
            return Err("bucket must not be empty".into());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".into());
        }
        if self.operation_timeout.is_zero() {
            return Err("operation_timeout must be greater than zero".into());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than zero".into());
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            project_id = %self.project_id,
            region = %self.region,
            bucket = %self.bucket,
            folder = %self.folder,
            runtime = %self.runtime,
            max_concurrency = self.max_concurrency,
            "Loaded DeployConfig"
        );
        debug!(?self, "DeployConfig loaded (full debug)");
    }
}

/// API base URLs of the source-control providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub github: String,
    pub gitlab: String,
    pub bitbucket: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            github: "https://api.github.com".to_string(),
            gitlab: "https://gitlab.com/api/v4".to_string(),
            bitbucket: "https://api.bitbucket.org/2.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_platform_conventions() {
        let cfg = DeployConfig::new("my-project", "easy-func");
        assert_eq!(cfg.location(), "projects/my-project/locations/us-central1");
        assert_eq!(cfg.runtime, "python39");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = DeployConfig::new("my-project", "easy-func");
        cfg.max_concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut cfg = DeployConfig::new("my-project", "easy-func");
        cfg.poll_interval = Duration::ZERO;
        assert_eq!(cfg.validate().unwrap_err(), "poll_interval must be greater than zero");

        let mut cfg = DeployConfig::new("my-project", "easy-func");
        cfg.operation_timeout = Duration::ZERO;
        assert_eq!(cfg.validate().unwrap_err(), "operation_timeout must be greater than zero");
    }
}
