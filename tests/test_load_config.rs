use easy_func::load_config::{load_config, ENV_BUCKET, ENV_PROJECT_ID, ENV_REGION, ENV_SERVICE_ACCOUNT};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_env() {
    for name in [ENV_PROJECT_ID, ENV_REGION, ENV_SERVICE_ACCOUNT, ENV_BUCKET] {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn full_config_is_loaded() {
    clear_env();
    let file = config_file(
        r#"
gcp:
  project_id: acme-prod
  region: europe-west1
  service_account: deployer@acme-prod.iam.gserviceaccount.com
storage:
  bucket: acme-functions
  folder: releases
functions:
  runtime: python311
  name_prefix: ""
  name_suffix: ""
  max_concurrency: 8
  operation_timeout_secs: 120
  poll_interval_secs: 5
providers:
  gitlab: https://gitlab.acme.internal/api/v4
"#,
    );

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.location(), "projects/acme-prod/locations/europe-west1");
    assert_eq!(
        config.service_account.as_deref(),
        Some("deployer@acme-prod.iam.gserviceaccount.com")
    );
    assert_eq!(config.bucket, "acme-functions");
    assert_eq!(config.folder, "releases");
    assert_eq!(config.runtime, "python311");
    assert_eq!(config.name_prefix, "");
    assert_eq!(config.max_concurrency, 8);
    assert_eq!(config.operation_timeout, Duration::from_secs(120));
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.endpoints.gitlab, "https://gitlab.acme.internal/api/v4");
    assert_eq!(config.endpoints.github, "https://api.github.com");
}

#[test]
#[serial]
fn minimal_config_gets_defaults() {
    clear_env();
    let file = config_file("gcp:\n  project_id: acme\nstorage:\n  bucket: easy-func\n");

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.region, "us-central1");
    assert_eq!(config.folder, "deployments");
    assert_eq!(config.runtime, "python39");
    assert_eq!(config.name_prefix, "easy_func_");
    assert_eq!(config.name_suffix, "_http");
    assert_eq!(config.max_concurrency, 4);
    assert!(config.service_account.is_none());
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    clear_env();
    env::set_var(ENV_PROJECT_ID, "from-env");
    env::set_var(ENV_BUCKET, "env-bucket");
    env::set_var(ENV_REGION, "asia-east1");
    let file = config_file("gcp:\n  project_id: from-file\nstorage:\n  bucket: file-bucket\n");

    let config = load_config(file.path());
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.project_id, "from-env");
    assert_eq!(config.bucket, "env-bucket");
    assert_eq!(config.region, "asia-east1");
}

#[test]
#[serial]
fn missing_project_is_rejected() {
    clear_env();
    let file = config_file("storage:\n  bucket: easy-func\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("gcp.project_id"));
}

#[test]
#[serial]
fn zero_concurrency_is_rejected() {
    clear_env();
    let file = config_file(
        "gcp:\n  project_id: acme\nstorage:\n  bucket: easy-func\nfunctions:\n  max_concurrency: 0\n",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("max_concurrency"));
}

#[test]
#[serial]
fn zero_poll_interval_is_rejected() {
    clear_env();
    let file = config_file(
        "gcp:\n  project_id: acme\nstorage:\n  bucket: easy-func\nfunctions:\n  poll_interval_secs: 0\n",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("poll_interval must be greater than zero"));
}

#[test]
#[serial]
fn zero_operation_timeout_is_rejected() {
    clear_env();
    let file = config_file(
        "gcp:\n  project_id: acme\nstorage:\n  bucket: easy-func\nfunctions:\n  operation_timeout_secs: 0\n",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("operation_timeout must be greater than zero"));
}

#[test]
#[serial]
fn unknown_keys_are_rejected() {
    clear_env();
    let file = config_file("gcp:\n  project_id: acme\n  zone: us-central1-a\nstorage:\n  bucket: easy-func\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}
