//! Bitbucket Cloud source API binding.
//!
//! Listing: `GET /repositories/{workspace}/{repo}/src/{branch}/{dir}/`,
//! paginated through the `next` link of each page. A `next` link is only
//! followed when it shares the origin of the API base.
//! Raw fetch: `GET /repositories/{workspace}/{repo}/src/{branch}/{path}`.
//! Auth: `Authorization: Bearer <token>`.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, error};

use super::{body_text, collect_pages, dir_segments, endpoint, send, shape_mismatch};
use crate::contract::{AccessToken, DeploymentTarget, EntryKind, Provider, RepoEntry, SourceControlClient};
use crate::error::DeployError;

const PROVIDER: Provider = Provider::Bitbucket;

pub struct BitbucketClient {
    http: reqwest::Client,
    api_base: String,
}

impl BitbucketClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn src_url(&self, target: &DeploymentTarget, path: &str) -> Result<Url, DeployError> {
        let segments = [
            "repositories",
            target.owner.as_str(),
            target.repository.as_str(),
            "src",
            target.branch.as_str(),
        ]
        .into_iter()
        .chain(dir_segments(path));
        endpoint(PROVIDER, &self.api_base, segments)
    }

    fn listing_url(&self, target: &DeploymentTarget) -> Result<Url, DeployError> {
        let mut url = self.src_url(target, target.normalized_dir())?;
        // The trailing slash asks for a listing rather than file content.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("");
        }
        Ok(url)
    }

    fn page_request(&self, url: Url, token: &AccessToken) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(token.secret())
    }

    fn raw_request(
        &self,
        target: &DeploymentTarget,
        entry: &RepoEntry,
        token: &AccessToken,
    ) -> Result<reqwest::RequestBuilder, DeployError> {
        Ok(self.page_request(self.src_url(target, &entry.path)?, token))
    }

    /// Parse a `next` link. Links outside the API origin are refused.
    fn next_url(&self, next: &str) -> Result<Url, DeployError> {
        let url = Url::parse(next).map_err(|e| {
            DeployError::provider(PROVIDER.to_string(), format!("invalid next page link {next}: {e}"))
        })?;
        let base = Url::parse(&self.api_base).map_err(|e| {
            DeployError::provider(PROVIDER.to_string(), format!("invalid API base url {}: {e}", self.api_base))
        })?;
        if url.origin() != base.origin() {
            error!(next = %next, api_base = %self.api_base, "Refusing next page link outside the API origin");
            return Err(DeployError::provider(
                PROVIDER.to_string(),
                format!("next page link {next} leaves the API origin"),
            ));
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct SrcPage {
    values: Vec<SrcItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SrcItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

/// Parse one listing page into its entries and the next page URL.
///
/// Bitbucket answers a file path with the raw file, which is not JSON and is
/// rejected here.
pub fn parse_src_page(body: &str) -> Result<(Vec<RepoEntry>, Option<String>), DeployError> {
    let page: SrcPage = serde_json::from_str(body)
        .map_err(|_| shape_mismatch(PROVIDER, "a paginated directory listing", body))?;
    let entries = page
        .values
        .into_iter()
        .map(|item| RepoEntry {
            kind: match item.kind.as_str() {
                "commit_file" => EntryKind::File,
                "commit_directory" => EntryKind::Directory,
                _ => EntryKind::Other,
            },
            path: item.path,
            download_url: None,
        })
        .collect();
    Ok((entries, page.next))
}

#[async_trait]
impl SourceControlClient for BitbucketClient {
    fn provider(&self) -> Provider {
        PROVIDER
    }

    async fn list_directory(
        &self,
        target: &DeploymentTarget,
        token: &AccessToken,
    ) -> Result<Vec<RepoEntry>, DeployError> {
        let first = self.listing_url(target)?;
        collect_pages(PROVIDER, "source listing", first, |url| async move {
            debug!(url = %url, "Listing Bitbucket source page");
            let response = send(PROVIDER, self.page_request(url, token)).await?;
            let (entries, next) = parse_src_page(&body_text(PROVIDER, response).await?)?;
            let next = next.as_deref().map(|next| self.next_url(next)).transpose()?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &str) -> DeploymentTarget {
        DeploymentTarget {
            provider: PROVIDER,
            owner: "team".into(),
            repository: "app".into(),
            branch: "main".into(),
            source_dir: dir.into(),
        }
    }

    #[test]
    fn parses_page_with_next_link() {
        let body = r#"{
            "pagelen": 10,
            "values": [
                {"type": "commit_file", "path": "src/functions/hello.py", "size": 42},
                {"type": "commit_directory", "path": "src/functions/lib"}
            ],
            "next": "https://api.bitbucket.org/2.0/repositories/team/app/src/main/src/functions/?page=2"
        }"#;
        let (entries, next) = parse_src_page(body).unwrap();
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert!(next.unwrap().ends_with("page=2"));
    }

    #[test]
    fn raw_file_instead_of_listing_is_rejected() {
        let body = "def hello(request):\n    return 'hi'\n";
        assert!(matches!(parse_src_page(body), Err(DeployError::Provider { .. })));
    }

    #[test]
    fn src_url_keeps_directory_segments() {
        let client = BitbucketClient::new(reqwest::Client::new(), "https://api.bitbucket.org/2.0");
        let t = target("/src/functions/");
        let url = client.src_url(&t, t.normalized_dir()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bitbucket.org/2.0/repositories/team/app/src/main/src/functions"
        );
    }

    fn client() -> BitbucketClient {
        BitbucketClient::new(reqwest::Client::new(), "https://api.bitbucket.org/2.0")
    }

    #[test]
    fn listing_request_shape() {
        let client = client();
        let url = client.listing_url(&target("src/functions")).unwrap();
        let request = client
            .page_request(url, &AccessToken::new("t"))
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.bitbucket.org/2.0/repositories/team/app/src/main/src/functions/"
        );
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "Bearer t");
    }

    #[test]
    fn raw_request_has_no_trailing_slash() {
        let entry = RepoEntry {
            path: "src/functions/hello.py".into(),
            kind: EntryKind::File,
            download_url: None,
        };
        let request = client()
            .raw_request(&target("src/functions"), &entry, &AccessToken::new("t"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.bitbucket.org/2.0/repositories/team/app/src/main/src/functions/hello.py"
        );
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "Bearer t");
    }

    #[test]
    fn next_link_on_the_api_origin_is_followed() {
        let url = client()
            .next_url("https://api.bitbucket.org/2.0/repositories/team/app/src/main/src/functions/?page=2")
            .unwrap();
        assert_eq!(url.query(), Some("page=2"));
    }

    #[test]
    fn next_link_to_another_origin_is_refused() {
        for next in [
            "https://collector.example.com/2.0/repositories/team/app/src/main/?page=2",
            "http://api.bitbucket.org/2.0/repositories/team/app/src/main/?page=2",
            "https://api.bitbucket.org:8443/2.0/repositories/team/app/src/main/?page=2",
        ] {
            assert!(
                matches!(client().next_url(next), Err(DeployError::Provider { .. })),
                "{next}"
            );
        }
        assert!(client().next_url("not a url").is_err());
    }
}
