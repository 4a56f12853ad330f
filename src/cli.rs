///
/// This module implements the CLI interface for easy-func: command parsing,
/// wiring of the Google Cloud bindings and printing of the deployment report.
///
/// All pipeline logic (discovery, packaging, provisioning, error taxonomy)
/// lives in the [`easy-func-core`] crate. This module is CLI glue only.
///
/// ## How To Use
/// - From the shell: `easy-func deploy --config easy-func.yaml --provider github --owner acme --repo functions`.
/// - Programmatically and in integration tests: call [`run`] with a constructed [`Cli`].
///
/// [`easy-func-core`]: ../../easy-func-core/
use crate::auth::GoogleAuth;
use crate::functions::CloudFunctionsClient;
use crate::load_config::load_config;
use crate::storage::GcsClient;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use easy_func_core::contract::{AccessToken, DeploymentTarget, Provider};
use easy_func_core::deploy::Deployer;
use easy_func_core::source::SourceClients;
use std::path::PathBuf;

pub const ENV_SCM_TOKEN: &str = "EASY_FUNC_SCM_TOKEN";

/// CLI for easy-func: deploy functions from a repository to Google Cloud Functions.
#[derive(Parser)]
#[clap(
    name = "easy-func",
    version,
    about = "Deploy Python functions from a GitHub, GitLab or Bitbucket repository to Google Cloud Functions"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy every function source found in the repository directory
    Deploy {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,

        /// Source-control provider: github, gitlab or bitbucket
        #[clap(long)]
        provider: Provider,

        /// Repository owner, GitLab namespace or Bitbucket workspace
        #[clap(long, default_value = "")]
        owner: String,

        /// Repository name (or numeric GitLab project id)
        #[clap(long)]
        repo: String,

        #[clap(long, default_value = "main")]
        branch: String,

        /// Directory to scan for function sources
        #[clap(long, default_value = "src/functions")]
        source_dir: String,

        /// Source-control access token
        #[clap(long, env = ENV_SCM_TOKEN, hide_env_values = true)]
        token: Option<String>,
    },
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Deploy {
            config,
            provider,
            owner,
            repo,
            branch,
            source_dir,
            token,
        } => {
            let config = load_config(config)?;
            let token = token
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| anyhow!("no source-control token: pass --token or set {ENV_SCM_TOKEN}"))?;
            tracing::info!(command = "deploy", %provider, repository = %repo, token_len = token.len(), "Starting deployment");

            let http = reqwest::Client::new();
            let auth = GoogleAuth::from_environment()
                .await
                .context("Google Cloud credentials unavailable")?;
            let sources = SourceClients::new(http.clone(), &config.endpoints);
            let storage = GcsClient::new(http.clone(), auth.clone());
            let platform = CloudFunctionsClient::new(http, auth, config.poll_interval);
            let deployer = Deployer::new(config, sources, storage, platform);

            let target = DeploymentTarget {
                provider,
                owner,
                repository: repo,
                branch,
                source_dir,
            };
            let summary = deployer
                .deploy(&target, &AccessToken::new(token))
                .await
                .map_err(|e| {
                    tracing::error!(command = "deploy", error = %e, class = e.class(), "Deployment failed");
                    anyhow::Error::new(e)
                })?;

            println!("{}", serde_json::to_string_pretty(&summary.report())?);

            let failed = summary.failures().count();
            if failed > 0 {
                tracing::error!(command = "deploy", failed, "Some functions failed to deploy");
                return Err(anyhow!("{failed} of {} functions failed to deploy", summary.functions.len()));
            }
            tracing::info!(command = "deploy", deployed = summary.functions.len(), "Deployment complete");
            Ok(())
        }
    }
}
