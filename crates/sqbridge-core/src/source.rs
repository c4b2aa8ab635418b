//! Source text cache
//!
//! Source files are read once per session through a `FileAccessor` and kept
//! as split lines. Entries are never invalidated, so edits made to a file
//! after its first load are not seen until the next session.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Read access to source files
///
/// Abstracted so the bridge can run against the local filesystem, an IDE's
/// virtual workspace, or fixtures in tests.
#[async_trait]
pub trait FileAccessor: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String>;
}

/// Reads sources from the local filesystem
#[derive(Debug, Default, Clone)]
pub struct FsFileAccessor;

#[async_trait]
impl FileAccessor for FsFileAccessor {
    async fn read_file(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// A loaded source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub path: String,
    pub lines: Vec<String>,
}

impl SourceText {
    /// Split `contents` on `\n` or `\r\n`. A trailing newline leaves a final
    /// empty line, which still counts toward the line total.
    pub fn new(path: impl Into<String>, contents: &str) -> Self {
        let lines = contents
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        Self {
            path: path.into(),
            lines,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }
}

/// Memoized source texts keyed by path
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<String, Arc<SourceText>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached text for `path`, reading it on first access
    pub async fn load(&mut self, files: &dyn FileAccessor, path: &str) -> Result<Arc<SourceText>> {
        if let Some(text) = self.entries.get(path) {
            return Ok(Arc::clone(text));
        }

        let contents = files.read_file(path).await?;
        let text = Arc::new(SourceText::new(path, &contents));
        tracing::debug!("Loaded {} ({} lines)", path, text.line_count());

        self.entries.insert(path.to_string(), Arc::clone(&text));
        Ok(text)
    }
}
