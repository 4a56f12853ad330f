use tracing::{error, info};

use crate::contract::{ObjectStorage, PackagedArtifact, UploadedArtifact};
use crate::error::DeployError;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Uploads packaged artifacts. Uploads are unconditional: an object already
/// present at the key is overwritten with identical bytes.
pub struct ArtifactStore<S> {
    storage: S,
}

impl<S: ObjectStorage> ArtifactStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn upload(
        &self,
        bucket: &str,
        artifact: &PackagedArtifact,
    ) -> Result<UploadedArtifact, DeployError> {
        info!(
            bucket,
            key = %artifact.storage_key,
            function = %artifact.function_name,
            "Uploading function archive"
        );
        self.storage
            .put_object(
                bucket,
                &artifact.storage_key,
                artifact.bytes.clone(),
                ARCHIVE_CONTENT_TYPE,
            )
            .await
            .map_err(|e| {
                error!(error = %e, bucket, key = %artifact.storage_key, "Archive upload failed");
                DeployError::Storage {
                    bucket: bucket.to_string(),
                    key: artifact.storage_key.clone(),
                    message: e.to_string(),
                }
            })?;

        info!(bucket, key = %artifact.storage_key, "Archive uploaded");
        Ok(UploadedArtifact {
            bucket: bucket.to_string(),
            storage_key: artifact.storage_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockObjectStorage;
    use mockall::predicate::eq;

    fn artifact() -> PackagedArtifact {
        PackagedArtifact {
            function_name: "hello".into(),
            content_hash: "abc".into(),
            storage_key: "deployments/hello_abc.zip".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn upload_puts_zip_at_storage_key() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_put_object()
            .with(
                eq("easy-func"),
                eq("deployments/hello_abc.zip"),
                eq(vec![1u8, 2, 3]),
                eq("application/zip"),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let uploaded = ArtifactStore::new(storage)
            .upload("easy-func", &artifact())
            .await
            .unwrap();
        assert_eq!(uploaded.location(), "gs://easy-func/deployments/hello_abc.zip");
    }

    #[tokio::test]
    async fn transport_failure_is_a_storage_error() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_put_object()
            .returning(|_, _, _, _| Err("403 Forbidden".into()));

        let err = ArtifactStore::new(storage)
            .upload("easy-func", &artifact())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Storage { ref message, .. } if message == "403 Forbidden"));
    }
}
