//! GitHub contents API binding.
//!
//! Listing: `GET /repos/{owner}/{repo}/contents/{dir}?ref={branch}`.
//! Raw fetch: the `download_url` of each listed file.
//! Auth: `Authorization: token <token>`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use super::{body_text, dir_segments, endpoint, send, shape_mismatch};
use crate::contract::{AccessToken, DeploymentTarget, EntryKind, Provider, RepoEntry, SourceControlClient};
use crate::error::DeployError;

const PROVIDER: Provider = Provider::GitHub;
const CLIENT_USER_AGENT: &str = concat!("easy-func/", env!("CARGO_PKG_VERSION"));

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder, token: &AccessToken) -> reqwest::RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("token {}", token.secret()))
            .header(USER_AGENT, CLIENT_USER_AGENT)
    }

    fn list_request(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<reqwest::RequestBuilder, DeployError> {
        let segments = ["repos", target.owner.as_str(), target.repository.as_str(), "contents"]
            .into_iter()
            .chain(dir_segments(target.normalized_dir()));
        let url = endpoint(PROVIDER, &self.api_base, segments)?;
        debug!(url = %url, "Listing GitHub contents");

        Ok(self
            .authorized(self.http.get(url), token)
            .header(ACCEPT, "application/vnd.github+json")
            .query(&[("ref", target.branch.as_str())]))
    }

    fn raw_request(
        &self,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<reqwest::RequestBuilder, DeployError> {
        let url = entry.download_url.as_deref().ok_or_else(|| {
            DeployError::provider(PROVIDER.to_string(), format!("no download_url for {}", entry.path))
        })?;
        Ok(self.authorized(self.http.get(url), token))
    }
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    download_url: Option<String>,
}

/// Parse a contents API response. A JSON object (single file) is rejected.
pub fn parse_listing(body: &str) -> Result<Vec<RepoEntry>, DeployError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| shape_mismatch(PROVIDER, "a JSON directory listing", body))?;
    if !value.is_array() {
        return Err(shape_mismatch(PROVIDER, "a directory listing, got a single entry", body));
    }
    let items: Vec<ContentItem> = serde_json::from_value(value)
        .map_err(|e| shape_mismatch(PROVIDER, &format!("directory entries ({e})"), body))?;

    Ok(items
        .into_iter()
        .map(|item| RepoEntry {
            kind: match item.kind.as_str() {
                "file" => EntryKind::File,
                "dir" => EntryKind::Directory,
                _ => EntryKind::Other,
            },
            path: item.path,
            download_url: item.download_url,
        })
        .collect())
}

#[async_trait]
impl SourceControlClient for GitHubClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn list_directory(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<Vec<RepoEntry>, DeployError> {
        let response = send(PROVIDER, self.list_request(target, token)?).await?;
        parse_listing(&body_text(PROVIDER, response).await?)
    }

    async fn fetch_raw(
        &self,
        _target: &DeploymentTarget,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<String, DeployError> {
        let response = send(PROVIDER, self.raw_request(entry, token)?).await?;
        body_text(PROVIDER, response).await
    }
}
