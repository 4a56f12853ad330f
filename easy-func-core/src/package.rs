//! Content-addressed packaging of one source file into a zip archive.

use std::io::{Cursor, Write};

use sha2::{Digest, Sha256};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::contract::PackagedArtifact;
use crate::SOURCE_EXTENSION;

/// Builds archives whose object key is derived from the source content.
#[derive(Debug, Clone)]
pub struct Packager {
    folder: String,
}

impl Packager {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into().trim_matches('/').to_string(),
        }
    }

    /// Package `content` as the single entry `{function_name}.py`.
    ///
    /// Equal inputs yield equal keys and byte-identical archives.
    pub fn package(&self, function_name: &str, content: &str) -> ZipResult<PackagedArtifact> {
        let content_hash = content_hash(content);
        let storage_key = if self.folder.is_empty() {
            format!("{function_name}_{content_hash}.zip")
        } else {
            format!("{}/{function_name}_{content_hash}.zip", self.folder)
        };
        let bytes = zip_single_entry(&format!("{function_name}.{SOURCE_EXTENSION}"), content)?;

        tracing::debug!(
            function = function_name,
            storage_key = %storage_key,
            size = bytes.len(),
            "Packaged function source"
        );

        Ok(PackagedArtifact {
            function_name: function_name.to_string(),
            content_hash,
            storage_key,
            bytes,
        })
    }
}

/// Lower-case hex SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn zip_single_entry(entry_name: &str, content: &str) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    // Fixed timestamp keeps the archive bytes a function of the content only.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    writer.start_file(entry_name, options)?;
    writer.write_all(content.as_bytes())?;
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    const HELLO: &str = "def hello(request):\n    return 'hello'\n";

    #[test]
    fn storage_key_is_content_addressed() {
        let packager = Packager::new("deployments");
        let first = packager.package("hello", HELLO).unwrap();
        let second = packager.package("hello", HELLO).unwrap();
        assert_eq!(first.storage_key, second.storage_key);
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(
            first.storage_key,
            format!("deployments/hello_{}.zip", content_hash(HELLO))
        );

        let changed = packager.package("hello", "def hello(r):\n    return 1\n").unwrap();
        assert_ne!(first.storage_key, changed.storage_key);
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn archive_holds_exactly_the_source_file() {
        let artifact = Packager::new("deployments/").package("hello", HELLO).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "hello.py");
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        assert_eq!(body, HELLO);
    }

    #[test]
    fn empty_folder_yields_bare_key() {
        let artifact = Packager::new("").package("hello", HELLO).unwrap();
        assert!(artifact.storage_key.starts_with("hello_"));
    }
}
