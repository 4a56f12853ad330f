//! # source: discovering function sources in a repository
//!
//! [`list_source_files`] holds the provider-independent part of discovery:
//! listing, client-side filtering and the parallel raw fetch. The
//! provider-specific request shapes live in the [`github`], [`gitlab`] and
//! [`bitbucket`] bindings of [`SourceControlClient`].
//!
//! Fetching is fail-closed: if any single file fetch fails, no file is
//! returned. An empty result is valid and means "nothing to deploy".

pub mod bitbucket;
pub mod github;
pub mod gitlab;

use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Url;
use tracing::{debug, error, info};

use crate::config::ProviderEndpoints;
use crate::contract::{
    AccessToken, DeploymentTarget, EntryKind, Provider, RepoEntry, SourceControlClient, SourceFile,
};
use crate::error::DeployError;
use crate::SOURCE_EXTENSION;

pub use bitbucket::BitbucketClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Upper bound on followed pagination links for one listing.
pub(crate) const MAX_PAGES: usize = 50;

const DIAGNOSTIC_LIMIT: usize = 512;

/// List the function sources of `target` through `client`.
pub async fn list_source_files<C>(
    client: &C,
    target: &DeploymentTarget,
    token: &AccessToken,
) -> Result<Vec<SourceFile>, DeployError>
where
    C: SourceControlClient + ?Sized,
{
    if token.is_empty() {
        error!(provider = %target.provider, "No access token supplied");
        return Err(DeployError::Auth {
            provider: target.provider,
            message: "missing access token".into(),
        });
    }

    info!(
        provider = %target.provider,
        owner = %target.owner,
        repository = %target.repository,
        branch = %target.branch,
        source_dir = %target.source_dir,
        "Listing source directory"
    );
    let entries = client.list_directory(target, token).await?;
    let dir = target.normalized_dir();
    let total = entries.len();
    let matches: Vec<RepoEntry> = entries
        .into_iter()
        .filter(|entry| is_source_file(entry, dir))
        .collect();
    info!(
        provider = %target.provider,
        listed = total,
        matched = matches.len(),
        "Filtered directory listing"
    );

    let fetches = matches.iter().map(|entry| async move {
        debug!(path = %entry.path, "Fetching raw source");
        let content = client.fetch_raw(target, entry, token).await?;
        Ok::<_, DeployError>(SourceFile {
            path: entry.path.clone(),
            content,
        })
    });
    let files = try_join_all(fetches).await.map_err(|e| {
        error!(provider = %target.provider, error = %e, "Fetching source files failed");
        e
    })?;

    info!(provider = %target.provider, files = files.len(), "Fetched source files");
    Ok(files)
}

/// A regular file with the source extension, nested under `dir`.
pub fn is_source_file(entry: &RepoEntry, dir: &str) -> bool {
    let path = entry.path.trim_start_matches('/');
    entry.kind == EntryKind::File && is_under(path, dir) && has_source_extension(path)
}

fn is_under(path: &str, dir: &str) -> bool {
    dir.is_empty()
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn has_source_extension(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .strip_suffix(SOURCE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|stem| !stem.is_empty())
}

/// One client per provider; the deployer picks by [`DeploymentTarget::provider`].
#[derive(Clone)]
pub struct SourceClients {
    github: Arc<dyn SourceControlClient>,
    gitlab: Arc<dyn SourceControlClient>,
    bitbucket: Arc<dyn SourceControlClient>,
}

impl SourceClients {
    pub fn new(http: reqwest::Client, endpoints: &ProviderEndpoints) -> Self {
        Self {
            github: Arc::new(GitHubClient::new(http.clone(), &endpoints.github)),
            gitlab: Arc::new(GitLabClient::new(http.clone(), &endpoints.gitlab)),
            bitbucket: Arc::new(BitbucketClient::new(http, &endpoints.bitbucket)),
        }
    }

    /// Replace the client for the provider `client` reports.
    pub fn with_client(mut self, client: Arc<dyn SourceControlClient>) -> Self {
        match client.provider() {
            Provider::GitHub => self.github = client,
            Provider::GitLab => self.gitlab = client,
            Provider::Bitbucket => self.bitbucket = client,
        }
        self
    }

    pub fn client(&self, provider: Provider) -> &dyn SourceControlClient {
        match provider {
            Provider::GitHub => self.github.as_ref(),
            Provider::GitLab => self.gitlab.as_ref(),
            Provider::Bitbucket => self.bitbucket.as_ref(),
        }
    }
}

/// `base` with `segments` appended, each percent-encoded as one path segment.
pub(crate) fn endpoint<'a, I>(provider: Provider, base: &str, segments: I) -> Result<Url, DeployError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = Url::parse(base).map_err(|e| {
        DeployError::provider(provider.to_string(), format!("invalid API base url {base}: {e}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            DeployError::provider(provider.to_string(), format!("API base url {base} cannot be a base"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Drive a paginated listing of at most [`MAX_PAGES`] pages.
///
/// `fetch` reads the page at `cursor` and returns its entries together with
/// the cursor of the following page, if any.
pub(crate) async fn collect_pages<C, F, Fut>(
    provider: Provider,
    listing: &str,
    first: C,
    mut fetch: F,
) -> Result<Vec<RepoEntry>, DeployError>
where
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<(Vec<RepoEntry>, Option<C>), DeployError>>,
{
    let mut entries = Vec::new();
    let mut cursor = first;
    for _ in 0..MAX_PAGES {
        let (page, next) = fetch(cursor).await?;
        entries.extend(page);
        match next {
            Some(next) => cursor = next,
            None => return Ok(entries),
        }
    }
    error!(provider = %provider, max_pages = MAX_PAGES, "Pagination limit reached");
    Err(DeployError::provider(
        provider.to_string(),
        format!("{listing} exceeded {MAX_PAGES} pages"),
    ))
}

/// Split a repository-relative directory into non-empty segments.
pub(crate) fn dir_segments(dir: &str) -> impl Iterator<Item = &str> {
    dir.split('/').filter(|s| !s.is_empty())
}

/// Send `request`, mapping transport failures and non-success statuses.
pub(crate) async fn send(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, DeployError> {
    let response = request.send().await.map_err(|e| {
        error!(provider = %provider, error = ?e, "Source control request failed");
        DeployError::provider(provider.to_string(), format!("request failed: {e}"))
    })?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    error!(provider = %provider, status = %status, url = %url, "Source control API returned error");
    Err(status_error(provider, status, body))
}

/// Read the response body as text.
pub(crate) async fn body_text(
    provider: Provider,
    response: reqwest::Response,
) -> Result<String, DeployError> {
    response.text().await.map_err(|e| {
        DeployError::provider(provider.to_string(), format!("reading response body failed: {e}"))
    })
}

pub(crate) fn status_error(provider: Provider, status: reqwest::StatusCode, body: String) -> DeployError {
    let body = truncate_diagnostic(body);
    match status.as_u16() {
        401 | 403 => DeployError::Auth {
            provider,
            message: format!("{status}: {body}"),
        },
        404 => DeployError::NotFound {
            provider,
            message: format!("{status}: {body}"),
        },
        _ => DeployError::provider_with_body(
            provider.to_string(),
            format!("unexpected status {status}"),
            body,
        ),
    }
}

pub(crate) fn shape_mismatch(provider: Provider, expected: &str, body: &str) -> DeployError {
    DeployError::provider_with_body(
        provider.to_string(),
        format!("expected {expected}"),
        truncate_diagnostic(body.to_string()),
    )
}

fn truncate_diagnostic(mut body: String) -> String {
    if body.len() > DIAGNOSTIC_LIMIT {
        let mut cut = DIAGNOSTIC_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
