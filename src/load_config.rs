/// `load_config` module: reads the YAML deployment config and applies
/// environment overrides, producing a validated [`DeployConfig`].
///
/// This is the only place where user-supplied YAML is parsed. Google
/// credentials and source-control tokens never live in the file: the first
/// come from application default credentials, the second from the command
/// line or `EASY_FUNC_SCM_TOKEN`.
///
/// # Environment overrides
/// - `GOOGLE_CLOUD_PROJECT_ID` replaces `gcp.project_id`
/// - `GOOGLE_CLOUD_REGION` replaces `gcp.region`
/// - `GOOGLE_CLOUD_SERVICE_ACCOUNT_EMAIL` replaces `gcp.service_account`
/// - `GCS_BUCKET_NAME` replaces `storage.bucket`
///
/// # Errors
/// All failures are `anyhow::Error` with the offending path or field in the
/// message, and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use easy_func_core::config::{DeployConfig, ProviderEndpoints};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const ENV_PROJECT_ID: &str = "GOOGLE_CLOUD_PROJECT_ID";
pub const ENV_REGION: &str = "GOOGLE_CLOUD_REGION";
pub const ENV_SERVICE_ACCOUNT: &str = "GOOGLE_CLOUD_SERVICE_ACCOUNT_EMAIL";
pub const ENV_BUCKET: &str = "GCS_BUCKET_NAME";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub gcp: GcpSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub functions: FunctionsSection,
    #[serde(default)]
    pub providers: ProvidersSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcpSection {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionsSection {
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub name_suffix: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersSection {
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub gitlab: Option<String>,
    #[serde(default)]
    pub bitbucket: Option<String>,
}

fn env_override(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Loads the YAML file at `path`, applies environment overrides and validates
/// the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DeployConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let file: FileConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let config = resolve(file)?;
    config.trace_loaded();
    Ok(config)
}

/// Merge file values, environment overrides and defaults into a
/// [`DeployConfig`].
pub fn resolve(file: FileConfig) -> Result<DeployConfig> {
    let project_id = env_override(ENV_PROJECT_ID)
        .or(file.gcp.project_id)
        .ok_or_else(|| anyhow!("gcp.project_id is required (or set {ENV_PROJECT_ID})"))?;
    let bucket = env_override(ENV_BUCKET)
        .or(file.storage.bucket)
        .ok_or_else(|| anyhow!("storage.bucket is required (or set {ENV_BUCKET})"))?;

    let mut config = DeployConfig::new(project_id, bucket);
    if let Some(region) = env_override(ENV_REGION).or(file.gcp.region) {
        config.region = region;
    }
    config.service_account = env_override(ENV_SERVICE_ACCOUNT).or(file.gcp.service_account);
    if let Some(folder) = file.storage.folder {
        config.folder = folder;
    }

    let functions = file.functions;
    if let Some(runtime) = functions.runtime {
        config.runtime = runtime;
    }
    if let Some(prefix) = functions.name_prefix {
        config.name_prefix = prefix;
    }
    if let Some(suffix) = functions.name_suffix {
        config.name_suffix = suffix;
    }
    if let Some(n) = functions.max_concurrency {
        config.max_concurrency = n;
    }
    if let Some(secs) = functions.operation_timeout_secs {
        config.operation_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = functions.poll_interval_secs {
        config.poll_interval = Duration::from_secs(secs);
    }

    let defaults = ProviderEndpoints::default();
    config.endpoints = ProviderEndpoints {
        github: file.providers.github.unwrap_or(defaults.github),
        gitlab: file.providers.gitlab.unwrap_or(defaults.gitlab),
        bitbucket: file.providers.bitbucket.unwrap_or(defaults.bitbucket),
    };

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        anyhow!("Invalid configuration: {e}")
    })?;
    Ok(config)
}
