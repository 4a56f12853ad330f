//! High-level pipeline: discover → extract → package → upload → provision.
//!
//! [`Deployer::deploy`] fetches the function sources of one
//! [`DeploymentTarget`] and runs one pipeline per file:
//!   - derive the function name from the file's base name
//!   - extract the entry point (files without one never reach storage)
//!   - package the source into a content-addressed zip
//!   - upload the zip to the configured bucket
//!   - create or update the platform function and wait for it
//!
//! # Error Handling
//! A failing listing fails the whole run. After that, every file gets its own
//! outcome: one failing pipeline never erases the work of its siblings.
//! [`DeploymentSummary::into_results`] recovers the "first error wins" view.
//!
//! # Concurrency
//! Pipelines run concurrently on the calling task, at most
//! `max_concurrency` at a time, and outcomes keep discovery order. Siblings of
//! a failed pipeline are not cancelled.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};

use crate::config::DeployConfig;
use crate::contract::{
    AccessToken, DeploymentTarget, FunctionDescriptor, FunctionPlatform, ObjectStorage, SourceFile,
    UploadedArtifact,
};
use crate::entry_point::{extract_entry_point, EntryPointExtractor, TopLevelDef};
use crate::error::DeployError;
use crate::package::Packager;
use crate::provision::{sanitize_function_name, FunctionProvisioner, FunctionSettings};
use crate::source::{list_source_files, SourceClients};
use crate::store::ArtifactStore;
use crate::SOURCE_EXTENSION;

/// A successfully deployed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    /// Base name of the source file, without extension.
    pub function_name: String,
    pub uploaded_artifact: UploadedArtifact,
    pub function: FunctionDescriptor,
    /// Fully qualified platform name returned by provisioning.
    pub function_path: String,
}

impl DeploymentResult {
    pub fn entry_point(&self) -> &str {
        &self.function.entry_point
    }
}

/// Result of one per-file pipeline.
#[derive(Debug)]
pub struct FunctionOutcome {
    pub function_name: String,
    pub source_path: String,
    pub result: Result<DeploymentResult, DeployError>,
}

/// Ordered outcomes of one run, one per discovered source file.
#[derive(Debug, Default)]
pub struct DeploymentSummary {
    pub functions: Vec<FunctionOutcome>,
}

impl DeploymentSummary {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.functions.iter().all(|f| f.result.is_ok())
    }

    pub fn deployed(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.functions.iter().filter_map(|f| f.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FunctionOutcome, &DeployError)> {
        self.functions
            .iter()
            .filter_map(|f| f.result.as_ref().err().map(|e| (f, e)))
    }

    /// All results in order, or the first failure.
    pub fn into_results(self) -> Result<Vec<DeploymentResult>, DeployError> {
        self.functions.into_iter().map(|f| f.result).collect()
    }

    pub fn report(&self) -> DeploymentReport {
        DeploymentReport {
            functions: self
                .deployed()
                .map(|r| DeployedFunctionReport {
                    name: r.function_name.clone(),
                    entry_point: r.entry_point().to_string(),
                    artifact_location: r.uploaded_artifact.location(),
                    function_path: r.function_path.clone(),
                })
                .collect(),
            failures: self
                .failures()
                .map(|(f, e)| FailedFunctionReport {
                    name: f.function_name.clone(),
                    path: f.source_path.clone(),
                    class: e.class(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Serialisable view of a [`DeploymentSummary`].
#[derive(Debug, Serialize)]
pub struct DeploymentReport {
    pub functions: Vec<DeployedFunctionReport>,
    pub failures: Vec<FailedFunctionReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedFunctionReport {
    pub name: String,
    pub entry_point: String,
    pub artifact_location: String,
    pub function_path: String,
}

#[derive(Debug, Serialize)]
pub struct FailedFunctionReport {
    pub name: String,
    pub path: String,
    pub class: &'static str,
    pub error: String,
}

/// Base name of `path` without directory and source extension.
pub fn function_name(path: &str) -> String {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file_name
        .strip_suffix(SOURCE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .unwrap_or(file_name)
        .to_string()
}

struct PlannedFunction {
    file: SourceFile,
    function_name: String,
    platform_name: String,
    /// Other paths mapping to the same platform name, if any.
    collides_with: Option<Vec<String>>,
}

fn plan(files: Vec<SourceFile>, prefix: &str, suffix: &str) -> Vec<PlannedFunction> {
    let mut planned: Vec<PlannedFunction> = files
        .into_iter()
        .map(|file| {
            let function_name = function_name(&file.path);
            let platform_name = format!("{prefix}{function_name}{suffix}");
            PlannedFunction {
                file,
                function_name,
                platform_name,
                collides_with: None,
            }
        })
        .collect();

    let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
    for p in &planned {
        by_name
            .entry(sanitize_function_name(&p.platform_name))
            .or_default()
            .push(p.file.path.clone());
    }
    for p in &mut planned {
        if let Some(paths) = by_name.get(&sanitize_function_name(&p.platform_name)) {
            if paths.len() > 1 {
                p.collides_with = Some(paths.clone());
            }
        }
    }
    planned
}

/// Runs deployments against one storage backend and one function platform.
pub struct Deployer<S, P> {
    config: DeployConfig,
    sources: SourceClients,
    packager: Packager,
    extractor: Box<dyn EntryPointExtractor>,
    store: ArtifactStore<S>,
    provisioner: FunctionProvisioner<P>,
    settings: FunctionSettings,
}

impl<S: ObjectStorage, P: FunctionPlatform> Deployer<S, P> {
    pub fn new(config: DeployConfig, sources: SourceClients, storage: S, platform: P) -> Self {
        let settings = FunctionSettings {
            location: config.location(),
            runtime: config.runtime.clone(),
            service_account: config.service_account.clone(),
        };
        Self {
            packager: Packager::new(config.folder.clone()),
            extractor: Box::new(TopLevelDef),
            store: ArtifactStore::new(storage),
            provisioner: FunctionProvisioner::new(platform, config.operation_timeout),
            sources,
            settings,
            config,
        }
    }

    /// Replace the entry-point heuristic.
    pub fn with_extractor(mut self, extractor: impl EntryPointExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Deploy every function source of `target`.
    ///
    /// Fails only when discovery fails; per-function failures are reported in
    /// the summary.
    pub async fn deploy(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<DeploymentSummary, DeployError> {
        info!(
            provider = %target.provider,
            repository = %target.repository,
            branch = %target.branch,
            "[DEPLOY] Starting deployment run"
        );

        let files = list_source_files(self.sources.client(target.provider), target, token)
            .await
            .map_err(|e| {
                error!(error = %e, "[DEPLOY][ERROR] Source discovery failed");
                e
            })?;
        if files.is_empty() {
            info!(source_dir = %target.source_dir, "[DEPLOY] No function sources found");
            return Ok(DeploymentSummary::default());
        }

        let planned = plan(files, &self.config.name_prefix, &self.config.name_suffix);
        info!(
            functions = planned.len(),
            max_concurrency = self.config.max_concurrency,
            "[DEPLOY] Deploying functions"
        );

        let functions: Vec<FunctionOutcome> = stream::iter(planned)
            .map(|p| self.run(p))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let summary = DeploymentSummary { functions };
        info!(
            deployed = summary.deployed().count(),
            failed = summary.failures().count(),
            "[DEPLOY] Deployment run finished"
        );
        Ok(summary)
    }

    async fn run(&self, planned: PlannedFunction) -> FunctionOutcome {
        let span = info_span!("function", name = %planned.function_name, path = %planned.file.path);

        let result = match planned.collides_with {
            Some(paths) => {
                let name = sanitize_function_name(&planned.platform_name);
                span.in_scope(|| error!(platform_name = %name, "[DEPLOY][ERROR] Function name collision"));
                Err(DeployError::NameCollision { name, paths })
            }
            None => {
                self.pipeline(&planned.file, &planned.function_name, &planned.platform_name)
                    .instrument(span.clone())
                    .await
            }
        };

        match &result {
            Ok(r) => span.in_scope(|| info!(function_path = %r.function_path, "[DEPLOY] Function deployed")),
            Err(e) => span.in_scope(|| error!(error = %e, "[DEPLOY][ERROR] Function deployment failed")),
        }

        FunctionOutcome {
            function_name: planned.function_name,
            source_path: planned.file.path,
            result,
        }
    }

    async fn pipeline(
        &self,
        file: &SourceFile,
        function_name: &str,
        platform_name: &str,
    ) -> Result<DeploymentResult, DeployError> {
        let entry_point = extract_entry_point(self.extractor.as_ref(), &file.path, &file.content)?;
        info!(entry_point = %entry_point, "[DEPLOY] Entry point detected");

        let artifact = self
            .packager
            .package(function_name, &file.content)
            .map_err(|e| DeployError::provider("packager", format!("building archive failed: {e}")))?;
        let uploaded = self.store.upload(&self.config.bucket, &artifact).await?;

        let descriptor = self.settings.descriptor(platform_name, &entry_point, &uploaded);
        let function_path = self.provisioner.provision(&descriptor).await?;

        Ok(DeploymentResult {
            function_name: function_name.to_string(),
            uploaded_artifact: uploaded,
            function: descriptor,
            function_path,
        })
    }
}
