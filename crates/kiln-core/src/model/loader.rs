//! Model loaders: the pluggable source of [`ResourceModel`] snapshots.

use super::{Group, ModelError, ResourceKind, ResourceModel, ResourceRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

/// Produces a complete [`ResourceModel`] from some configuration source.
///
/// Implementations either return a fully built model or an error; the provider never sees a
/// partially parsed model.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Loads a fresh model snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Unavailable`] when the source cannot be read and
    /// [`ModelError::Malformed`] when it cannot be parsed.
    async fn load(&self) -> Result<ResourceModel, ModelError>;
}

/// Loader that always returns the same in-memory model.
///
/// Used for embedding and tests where the group layout is known at compile time.
#[derive(Debug, Clone)]
pub struct StaticModelLoader {
    model: Arc<ResourceModel>,
}

impl StaticModelLoader {
    #[must_use]
    pub fn new(model: ResourceModel) -> Self {
        Self { model: Arc::new(model) }
    }
}

#[async_trait]
impl ModelLoader for StaticModelLoader {
    async fn load(&self) -> Result<ResourceModel, ModelError> {
        Ok((*self.model).clone())
    }
}

/// On-disk model document.
///
/// ```toml
/// [[groups]]
/// name = "g1"
/// resources = [
///     { kind = "style", uri = "a.css" },
///     { kind = "style", uri = "b.css" },
/// ]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default)]
    pub groups: Vec<GroupDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDocument {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub kind: ResourceKind,
    pub uri: String,
}

impl ModelDocument {
    /// Converts the document into a validated model.
    ///
    /// # Errors
    ///
    /// Propagates [`ResourceModel::new`] validation errors.
    pub fn into_model(self) -> Result<ResourceModel, ModelError> {
        ResourceModel::new(self.groups.into_iter().map(|group| {
            Group::new(
                group.name,
                group.resources.into_iter().map(|r| ResourceRef::new(r.kind, r.uri)).collect(),
            )
        }))
    }
}

/// Reads a model document from a TOML file, or JSON when the path ends in `.json`.
#[derive(Debug, Clone)]
pub struct FileModelLoader {
    path: PathBuf,
}

impl FileModelLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_json(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    /// Parses model text in the format implied by this loader's path.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Malformed`] on syntax errors and validation errors from
    /// [`ModelDocument::into_model`].
    pub fn parse(&self, text: &str) -> Result<ResourceModel, ModelError> {
        let document: ModelDocument = if self.is_json() {
            serde_json::from_str(text).map_err(|e| ModelError::Malformed(e.to_string()))?
        } else {
            toml::from_str(text).map_err(|e| ModelError::Malformed(e.to_string()))?
        };
        document.into_model()
    }
}

#[async_trait]
impl ModelLoader for FileModelLoader {
    async fn load(&self) -> Result<ResourceModel, ModelError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ModelError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let model = self.parse(&text)?;
        debug!(path = %self.path.display(), groups = model.len(), "model file parsed");
        Ok(model)
    }
}
