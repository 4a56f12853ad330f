//! GitLab repository API binding.
//!
//! Listing: `GET /projects/{id}/repository/tree?path={dir}&ref={branch}`,
//! paginated through the `x-next-page` header.
//! Raw fetch: `GET /projects/{id}/repository/files/{path}/raw?ref={branch}`.
//! Auth: `PRIVATE-TOKEN: <token>`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{body_text, collect_pages, endpoint, send, shape_mismatch};
use crate::contract::{AccessToken, DeploymentTarget, EntryKind, Provider, RepoEntry, SourceControlClient};
use crate::error::DeployError;

const PROVIDER: Provider = Provider::GitLab;
const PER_PAGE: &str = "100";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

pub struct GitLabClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitLabClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn project_url(&self, target: &DeploymentTarget, tail: &[&str]) -> Result<Url, DeployError> {
        let project = project_id(target);
        let segments = ["projects", project.as_str(), "repository"]
            .into_iter()
            .chain(tail.iter().copied());
        endpoint(PROVIDER, &self.api_base, segments)
    }

    fn tree_request(
        &self,
        url: Url,
        target: &DeploymentTarget,
        token: &AccessToken,
        page: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header(TOKEN_HEADER, token.secret())
            .query(&[
                ("path", target.normalized_dir()),
                ("ref", target.branch.as_str()),
                ("per_page", PER_PAGE),
                ("page", page),
            ])
    }

    fn raw_request(
        &self,
        target: &DeploymentTarget,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<reqwest::RequestBuilder, DeployError> {
        let url = self.project_url(target, &["files", entry.path.as_str(), "raw"])?;
        Ok(self
            .http
            .get(url)
            .header(TOKEN_HEADER, token.secret())
            .query(&[("ref", target.branch.as_str())]))
    }
}

/// Project identifier: `owner/repository`, or `repository` alone when no
/// owner is given (numeric project id).
pub fn project_id(target: &DeploymentTarget) -> String {
    if target.owner.trim().is_empty() {
        target.repository.clone()
    } else {
        format!("{}/{}", target.owner, target.repository)
    }
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

/// Parse one page of a tree response.
pub fn parse_tree_page(body: &str) -> Result<Vec<RepoEntry>, DeployError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| shape_mismatch(PROVIDER, "a JSON tree listing", body))?;
    if !value.is_array() {
        return Err(shape_mismatch(PROVIDER, "a tree listing array", body));
    }
    let items: Vec<TreeItem> = serde_json::from_value(value)
        .map_err(|e| shape_mismatch(PROVIDER, &format!("tree entries ({e})"), body))?;

    Ok(items
        .into_iter()
        .map(|item| RepoEntry {
            kind: match item.kind.as_str() {
                "blob" => EntryKind::File,
                "tree" => EntryKind::Directory,
                _ => EntryKind::Other,
            },
            path: item.path,
            download_url: None,
        })
        .collect())
}

/// Page number announced by `x-next-page`; absent or blank on the last page.
fn next_page(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SourceControlClient for GitLabClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn list_directory(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<Vec<RepoEntry>, DeployError> {
        let url = &self.project_url(target, &["tree"])?;
        collect_pages(PROVIDER, "tree listing", String::from("1"), |page| async move {
            debug!(url = %url, page = %page, "Listing GitLab tree page");
            let request = self.tree_request(url.clone(), target, token, &page);
            let response = send(PROVIDER, request).await?;
            let next = next_page(response.headers());
            let entries = parse_tree_page(&body_text(PROVIDER, response).await?)?;
            Ok((entries, next))
        })
        .await
    }

    async fn fetch_raw(
        &self,
        target: &DeploymentTarget,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<String, DeployError> {
        let response = send(PROVIDER, self.raw_request(target, entry, token)?).await?;
        body_text(PROVIDER, response).await
    }
}
