//! Resource readers: fetch the raw bytes behind a [`ResourceRef`].

use crate::model::ResourceRef;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceReadError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("I/O error reading {uri}: {message}")]
    Io { uri: String, message: String },

    /// Absolute paths and `..` components are rejected.
    #[error("resource path escapes the resource root: {0}")]
    OutsideRoot(String),

    #[error("resource is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Source of raw resource content.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ResourceReadError`] when the resource is missing or unreadable.
    async fn read(&self, resource: &ResourceRef) -> Result<Bytes, ResourceReadError>;
}

/// Reads resources from files below a root directory.
#[derive(Debug, Clone)]
pub struct FsResourceReader {
    root: PathBuf,
}

impl FsResourceReader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a resource URI to a path below the root.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceReadError::OutsideRoot`] for absolute URIs or URIs with `..`.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, ResourceReadError> {
        let relative = Path::new(uri.trim_start_matches("./"));
        let safe = relative.components().all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !safe || uri.is_empty() {
            return Err(ResourceReadError::OutsideRoot(uri.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ResourceReader for FsResourceReader {
    async fn read(&self, resource: &ResourceRef) -> Result<Bytes, ResourceReadError> {
        let path = self.resolve(&resource.uri)?;
        match tokio::fs::read(&path).await {
            Ok(content) => {
                trace!(path = %path.display(), bytes = content.len(), "resource read");
                Ok(Bytes::from(content))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ResourceReadError::NotFound(resource.uri.clone()))
            }
            Err(e) => Err(ResourceReadError::Io { uri: resource.uri.clone(), message: e.to_string() }),
        }
    }
}

/// In-memory reader keyed by URI. Content can be replaced at any time.
#[derive(Debug, Default)]
pub struct InMemoryReader {
    resources: DashMap<String, Bytes>,
    reads: AtomicU64,
}

impl InMemoryReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(self, uri: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.insert(uri, content);
        self
    }

    pub fn insert(&self, uri: impl Into<String>, content: impl Into<Bytes>) {
        self.resources.insert(uri.into(), content.into());
    }

    pub fn remove(&self, uri: &str) -> Option<Bytes> {
        self.resources.remove(uri).map(|(_, content)| content)
    }

    /// Total number of `read` calls, including failed ones.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceReader for InMemoryReader {
    async fn read(&self, resource: &ResourceRef) -> Result<Bytes, ResourceReadError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.resources
            .get(&resource.uri)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ResourceReadError::NotFound(resource.uri.clone()))
    }
}
