//! Ordered transformation pipeline.
//!
//! A [`ProcessorChain`] runs in two stages:
//!
//! ```text
//!  resource[0] ─► pre steps ─┐
//!  resource[1] ─► pre steps ─┼─► concat ─► post steps ─► output
//!  resource[n] ─► pre steps ─┘
//! ```
//!
//! Pre steps see one resource at a time and are matched against that resource's kind. Post
//! steps see the merged content once and are matched against the requested kind: `any` steps
//! always run, typed steps run only when the request selects that kind.
//!
//! Minimizer steps are skipped unless the request has the minimize flag set.
//!
//! Every step is a pure function of its input and the context, so for fixed input and chain
//! configuration the output is byte-identical across runs.

pub mod builtin;

pub use builtin::{CommentStripper, SemicolonAppender, VariableSubstitution, WhitespaceMinifier};

use crate::{
    model::{ResourceKind, ResourceRef},
    resource::ResourceReadError,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::{trace, warn};

/// Resource kinds a step applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorScope {
    Style,
    Script,
    Any,
}

impl ProcessorScope {
    /// `Any` applies everywhere; a typed scope applies only to content of exactly that kind.
    #[inline]
    #[must_use]
    pub fn applies_to(self, kind: Option<ResourceKind>) -> bool {
        match self {
            Self::Any => true,
            Self::Style => kind == Some(ResourceKind::Style),
            Self::Script => kind == Some(ResourceKind::Script),
        }
    }
}

/// Metadata passed to every step alongside the content.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingContext<'a> {
    pub group: &'a str,
    /// Kind selected by the request, `None` when the whole group was requested.
    pub kind: Option<ResourceKind>,
    /// The resource being processed. Set in the pre stage, `None` in the post stage.
    pub resource: Option<&'a ResourceRef>,
    pub minimize: bool,
}

impl<'a> ProcessingContext<'a> {
    #[must_use]
    pub fn for_group(group: &'a str, kind: Option<ResourceKind>, minimize: bool) -> Self {
        Self { group, kind, resource: None, minimize }
    }

    #[must_use]
    pub fn with_resource(self, resource: &'a ResourceRef) -> Self {
        Self { resource: Some(resource), ..self }
    }

    /// Kind used for scope matching: the resource's own kind in the pre stage.
    #[inline]
    fn effective_kind(&self) -> Option<ResourceKind> {
        self.resource.map_or(self.kind, |resource| Some(resource.kind))
    }
}

/// Failure reported by a single step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One transformation unit.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn scope(&self) -> ProcessorScope;

    /// Minimizer steps only run when the minimize flag is set.
    fn is_minimizer(&self) -> bool {
        false
    }

    /// Transforms `content`.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] when the content cannot be transformed.
    fn process(&self, content: &str, ctx: &ProcessingContext<'_>) -> Result<String, StepError>;
}

/// What to do when a step or a resource read fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the whole group and surface the error.
    #[default]
    FailFast,
    /// Log the failure and continue with the unmodified input.
    SkipAndContinue,
}

impl ErrorPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::SkipAndContinue => "skip-and-continue",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(Self::FailFast),
            "skip-and-continue" => Ok(Self::SkipAndContinue),
            other => Err(format!("unknown error policy: {other}")),
        }
    }
}

/// Unit name used when a resource could not be read.
pub const READER_UNIT: &str = "resource-reader";

/// A step or resource read failed under the fail-fast policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{unit} failed{}: {cause}", on_resource(.resource))]
pub struct ProcessingError {
    pub unit: String,
    /// Resource being processed, `None` for post-stage failures.
    pub resource: Option<String>,
    pub cause: String,
}

fn on_resource(resource: &Option<String>) -> String {
    resource.as_ref().map(|r| format!(" on {r}")).unwrap_or_default()
}

impl ProcessingError {
    #[must_use]
    pub fn read(resource: &ResourceRef, err: &ResourceReadError) -> Self {
        Self { unit: READER_UNIT.to_string(), resource: Some(resource.to_string()), cause: err.to_string() }
    }
}

/// Ordered, two-stage sequence of [`Processor`]s with an error policy.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    pre: Vec<Arc<dyn Processor>>,
    post: Vec<Arc<dyn Processor>>,
    policy: ErrorPolicy,
}

impl ProcessorChain {
    #[must_use]
    pub fn builder() -> ProcessorChainBuilder {
        ProcessorChainBuilder::default()
    }

    /// A chain with no steps. Output equals the concatenated input.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Built-in pipeline. Per resource: variable substitution in styles, script termination
    /// and style comment stripping. On the merged output: whitespace minification.
    ///
    /// Comment stripping runs per resource so that whole-group requests, which carry no kind,
    /// still have their style comments removed.
    #[must_use]
    pub fn standard(variables: BTreeMap<String, String>, policy: ErrorPolicy) -> Self {
        let mut builder = Self::builder().policy(policy);
        if !variables.is_empty() {
            builder = builder.pre(VariableSubstitution::new(variables));
        }
        builder
            .pre(SemicolonAppender)
            .pre(CommentStripper)
            .post(WhitespaceMinifier)
            .build()
    }

    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.pre.iter().chain(&self.post).map(|step| step.name()).collect()
    }

    /// Pre stage: runs per-resource steps on one resource's content.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::FailFast`], the first failing step's error.
    pub fn apply_to_resource(
        &self,
        content: String,
        ctx: &ProcessingContext<'_>,
    ) -> Result<String, ProcessingError> {
        self.run_stage(&self.pre, content, ctx)
    }

    /// Post stage: runs merged-content steps on the concatenated group content.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::FailFast`], the first failing step's error.
    pub fn apply(&self, content: String, ctx: &ProcessingContext<'_>) -> Result<String, ProcessingError> {
        let ctx = ProcessingContext { resource: None, ..*ctx };
        self.run_stage(&self.post, content, &ctx)
    }

    /// Applies the policy to a resource read failure.
    ///
    /// Returns `Ok(())` when the resource should be skipped, contributing no bytes.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::FailFast`], the read failure as a [`ProcessingError`].
    pub fn on_read_error(
        &self,
        resource: &ResourceRef,
        err: &ResourceReadError,
    ) -> Result<(), ProcessingError> {
        match self.policy {
            ErrorPolicy::FailFast => Err(ProcessingError::read(resource, err)),
            ErrorPolicy::SkipAndContinue => {
                warn!(resource = %resource, error = %err, "skipping unreadable resource");
                Ok(())
            }
        }
    }

    fn run_stage(
        &self,
        steps: &[Arc<dyn Processor>],
        mut content: String,
        ctx: &ProcessingContext<'_>,
    ) -> Result<String, ProcessingError> {
        let kind = ctx.effective_kind();
        for step in steps {
            if step.is_minimizer() && !ctx.minimize {
                continue;
            }
            if !step.scope().applies_to(kind) {
                continue;
            }

            match step.process(&content, ctx) {
                Ok(output) => {
                    trace!(step = step.name(), group = ctx.group, "step applied");
                    content = output;
                }
                Err(cause) => match self.policy {
                    ErrorPolicy::FailFast => {
                        return Err(ProcessingError {
                            unit: step.name().to_string(),
                            resource: ctx.resource.map(ToString::to_string),
                            cause: cause.0,
                        });
                    }
                    ErrorPolicy::SkipAndContinue => {
                        warn!(
                            step = step.name(),
                            group = ctx.group,
                            resource = ctx.resource.map(ToString::to_string),
                            error = %cause,
                            "step failed, passing content through"
                        );
                    }
                },
            }
        }
        Ok(content)
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |steps: &[Arc<dyn Processor>]| -> Vec<String> {
            steps.iter().map(|step| step.name().to_string()).collect()
        };
        f.debug_struct("ProcessorChain")
            .field("pre", &names(&self.pre))
            .field("post", &names(&self.post))
            .field("policy", &self.policy)
            .finish()
    }
}

#[derive(Default)]
pub struct ProcessorChainBuilder {
    pre: Vec<Arc<dyn Processor>>,
    post: Vec<Arc<dyn Processor>>,
    policy: ErrorPolicy,
}

impl ProcessorChainBuilder {
    /// Appends a per-resource step.
    #[must_use]
    pub fn pre(mut self, step: impl Processor + 'static) -> Self {
        self.pre.push(Arc::new(step));
        self
    }

    /// Appends a merged-content step.
    #[must_use]
    pub fn post(mut self, step: impl Processor + 'static) -> Self {
        self.post.push(Arc::new(step));
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> ProcessorChain {
        ProcessorChain { pre: self.pre, post: self.post, policy: self.policy }
    }
}
