//! Google Cloud Storage binding of [`ObjectStorage`].
//!
//! Uses the JSON API media upload: one `POST` with the object bytes as body.

use async_trait::async_trait;
use easy_func_core::contract::{ObjectStorage, StorageError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use tracing::{debug, error};

use crate::auth::GoogleAuth;

pub const DEFAULT_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

pub struct GcsClient {
    http: reqwest::Client,
    auth: GoogleAuth,
    upload_base: String,
}

impl GcsClient {
    pub fn new(http: reqwest::Client, auth: GoogleAuth) -> Self {
        Self {
            http,
            auth,
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
        }
    }
}

/// `{base}/b/{bucket}/o?uploadType=media&name={key}`
pub fn upload_url(base: &str, bucket: &str, key: &str) -> Result<Url, StorageError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| format!("upload base url {base} cannot be a base"))?
        .pop_if_empty()
        .extend(["b", bucket, "o"]);
    url.query_pairs_mut()
        .append_pair("uploadType", "media")
        .append_pair("name", key);
    Ok(url)
}

#[async_trait]
impl ObjectStorage for GcsClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = upload_url(&self.upload_base, bucket, key)?;
        debug!(url = %url, size = bytes.len(), "Uploading object");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.auth.authorization().await?)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, bucket, key, "Object upload rejected");
            return Err(format!("{status}: {body}").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_url_encodes_key_as_query_value() {
        let url = upload_url(DEFAULT_UPLOAD_BASE, "easy-func", "deployments/hello_ab12.zip").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/easy-func/o?uploadType=media&name=deployments%2Fhello_ab12.zip"
        );
    }
}
