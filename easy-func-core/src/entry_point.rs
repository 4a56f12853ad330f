//! Entry-point detection.
//!
//! This is a textual heuristic, not a parse: the first `def <name>(` or
//! `async def <name>(` that starts at column 0 wins. It sits behind
//! [`EntryPointExtractor`] so a real parser can replace it without touching
//! the pipeline.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DeployError;

static TOP_LEVEL_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(").expect("static regex")
});

pub trait EntryPointExtractor: Send + Sync {
    /// Name of the handler function declared in `content`, or `None`.
    fn extract(&self, content: &str) -> Option<String>;
}

/// Finds the first top-level `def` or `async def`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopLevelDef;

impl EntryPointExtractor for TopLevelDef {
    fn extract(&self, content: &str) -> Option<String> {
        TOP_LEVEL_DEF
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Extract the entry point of the file at `path` with `extractor`.
pub fn extract_entry_point(
    extractor: &dyn EntryPointExtractor,
    path: &str,
    content: &str,
) -> Result<String, DeployError> {
    extractor
        .extract(content)
        .ok_or_else(|| DeployError::EntryPointNotFound {
            path: path.to_string(),
        })
}
