//! Inbound request parsing and per-request context.

use super::ManagerError;
use crate::{cache::CacheKey, model::ResourceKind};
use std::sync::Arc;
use tokio::time::Instant;

/// A request for one group, optionally restricted to one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRequest {
    pub group: Arc<str>,
    pub kind: Option<ResourceKind>,
    pub minimize: bool,
}

impl GroupRequest {
    #[must_use]
    pub fn new(group: impl Into<Arc<str>>, kind: Option<ResourceKind>, minimize: bool) -> Self {
        Self { group: group.into(), kind, minimize }
    }

    /// Parses a request path and optional query string.
    ///
    /// The last path segment names the group. A `.css` or `.js` extension restricts the output
    /// to that kind; any other segment, dots included, is taken whole as the group name and
    /// selects every resource. `minimize` defaults to `true` and is turned off with
    /// `minimize=false` (or `0`/`no`).
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidRequest`] for an empty group name or an unparseable
    /// `minimize` value.
    pub fn from_path(path: &str, query: Option<&str>) -> Result<Self, ManagerError> {
        let file = path.rsplit('/').next().unwrap_or_default();

        let (group, kind) = match file.rsplit_once('.') {
            Some((stem, extension)) => match ResourceKind::from_extension(extension) {
                Some(kind) => (stem, Some(kind)),
                None => (file, None),
            },
            None => (file, None),
        };

        if group.is_empty() {
            return Err(ManagerError::InvalidRequest(format!("no group name in `{path}`")));
        }

        let minimize = match query.and_then(|query| query_param(query, "minimize")) {
            None => true,
            Some(value) => parse_flag(value).ok_or_else(|| {
                ManagerError::InvalidRequest(format!("invalid minimize value `{value}`"))
            })?,
        };

        Ok(Self::new(group, kind, minimize))
    }

    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(Arc::clone(&self.group), self.kind, self.minimize)
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Per-request context passed explicitly through the processing call chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: u64,
    pub request: GroupRequest,
    pub received_at: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new(id: u64, request: GroupRequest) -> Self {
        Self { id, request, received_at: Instant::now() }
    }
}
