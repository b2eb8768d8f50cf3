//! Resource-group model.
//!
//! A [`ResourceModel`] is an immutable snapshot mapping group names to the ordered list of
//! resources that make up each group. Snapshots are built wholesale by a [`ModelLoader`] and
//! published by the [`ModelProvider`]; nothing mutates a model after construction.
//!
//! # Ownership
//!
//! ```text
//! ┌──────────────┐   load()   ┌───────────────┐  Arc<ResourceModel>  ┌────────────────┐
//! │ ModelLoader  │ ─────────► │ ModelProvider │ ───────────────────► │ RequestManager │
//! │ (pluggable)  │            │ (ArcSwap)     │                      │  (readers)     │
//! └──────────────┘            └───────────────┘                      └────────────────┘
//! ```
//!
//! Readers hold an `Arc` to the snapshot they loaded, so a reload swapping in a new model never
//! changes data under an in-flight request.

pub mod loader;
pub mod provider;

pub use loader::{FileModelLoader, ModelLoader, StaticModelLoader};
pub use provider::ModelProvider;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;

/// Content type of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Stylesheet (`.css`)
    Style,
    /// Script (`.js`)
    Script,
}

impl ResourceKind {
    /// Maps a request file extension to a kind. Unknown extensions yield `None`.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "css" => Some(Self::Style),
            "js" => Some(Self::Script),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Style => "css",
            Self::Script => "js",
        }
    }

    /// MIME type used when serving content of this kind.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Style => "text/css; charset=utf-8",
            Self::Script => "application/javascript; charset=utf-8",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a single resource: its kind and a URI-like location understood by the
/// configured [`ResourceReader`](crate::resource::ResourceReader).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub uri: String,
}

impl ResourceRef {
    #[must_use]
    pub fn new(kind: ResourceKind, uri: impl Into<String>) -> Self {
        Self { kind, uri: uri.into() }
    }

    #[must_use]
    pub fn style(uri: impl Into<String>) -> Self {
        Self::new(ResourceKind::Style, uri)
    }

    #[must_use]
    pub fn script(uri: impl Into<String>) -> Self {
        Self::new(ResourceKind::Script, uri)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.uri)
    }
}

/// A named, ordered collection of resources. Declaration order is output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    name: Arc<str>,
    resources: Vec<ResourceRef>,
}

impl Group {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, resources: Vec<ResourceRef>) -> Self {
        Self { name: name.into(), resources }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn resources(&self) -> &[ResourceRef] {
        &self.resources
    }

    /// Resources of the given kind in declaration order, or all of them when `kind` is `None`.
    pub fn resources_of(
        &self,
        kind: Option<ResourceKind>,
    ) -> impl Iterator<Item = &ResourceRef> + '_ {
        self.resources.iter().filter(move |r| kind.map_or(true, |k| r.kind == k))
    }
}

/// Errors raised while building or loading a resource model.
///
/// `Clone` because a cold-start failure is shared with every caller waiting on the same
/// single-flight computation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Two groups share a name; the model is rejected as a whole.
    #[error("duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("group name must not be empty")]
    EmptyGroupName,

    /// Source data could not be read (missing file, I/O failure, remote source down).
    #[error("model source unavailable: {0}")]
    Unavailable(String),

    /// Source data was read but could not be parsed into a model.
    #[error("malformed model source: {0}")]
    Malformed(String),

    /// No model has ever been loaded and the loader failed.
    #[error("no resource model loaded yet: {0}")]
    ColdStart(Box<ModelError>),
}

/// Immutable mapping of group name to [`Group`].
///
/// Construction validates the whole group list up front, so a `ResourceModel` value is either
/// complete and consistent or never exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceModel {
    groups: HashMap<Arc<str>, Group>,
}

impl ResourceModel {
    /// Builds a model from a list of groups.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateGroup`] if two groups share a name and
    /// [`ModelError::EmptyGroupName`] if a group has an empty name.
    pub fn new(groups: impl IntoIterator<Item = Group>) -> Result<Self, ModelError> {
        let mut by_name = HashMap::new();
        for group in groups {
            if group.name.is_empty() {
                return Err(ModelError::EmptyGroupName);
            }
            if by_name.contains_key(&group.name) {
                return Err(ModelError::DuplicateGroup(group.name.to_string()));
            }
            by_name.insert(group.name.clone(), group);
        }
        Ok(Self { groups: by_name })
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Group names, sorted for stable output.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(|name| &**name).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
