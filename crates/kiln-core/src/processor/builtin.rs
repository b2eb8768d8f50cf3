//! Built-in processing steps.

use super::{ProcessingContext, Processor, ProcessorScope, StepError};
use std::collections::BTreeMap;

/// Replaces `${name}` placeholders in stylesheets with configured values.
///
/// Style-scoped: in scripts `${...}` is template-literal syntax. An undefined name or an
/// unterminated placeholder is an error.
#[derive(Debug, Clone, Default)]
pub struct VariableSubstitution {
    variables: BTreeMap<String, String>,
}

impl VariableSubstitution {
    #[must_use]
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }
}

impl Processor for VariableSubstitution {
    fn name(&self) -> &str {
        "variable-substitution"
    }

    fn scope(&self) -> ProcessorScope {
        ProcessorScope::Style
    }

    fn process(&self, content: &str, _ctx: &ProcessingContext<'_>) -> Result<String, StepError> {
        let mut output = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| StepError::new("unterminated placeholder"))?;
            let name = &after[..end];
            let value = self
                .variables
                .get(name)
                .ok_or_else(|| StepError::new(format!("undefined variable `{name}`")))?;
            output.push_str(value);
            rest = &after[end + 1..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

/// Terminates each script resource with a semicolon so concatenated scripts cannot run into
/// each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemicolonAppender;

impl Processor for SemicolonAppender {
    fn name(&self) -> &str {
        "semicolon-appender"
    }

    fn scope(&self) -> ProcessorScope {
        ProcessorScope::Script
    }

    fn process(&self, content: &str, _ctx: &ProcessingContext<'_>) -> Result<String, StepError> {
        let trimmed = content.trim_end();
        if trimmed.is_empty() {
            return Ok(content.to_string());
        }
        let mut output = String::with_capacity(trimmed.len() + 2);
        output.push_str(trimmed);
        if !trimmed.ends_with(';') {
            output.push(';');
        }
        output.push('\n');
        Ok(output)
    }
}

/// Removes `/* ... */` comments from stylesheets. Quoted strings are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentStripper;

impl Processor for CommentStripper {
    fn name(&self) -> &str {
        "comment-stripper"
    }

    fn scope(&self) -> ProcessorScope {
        ProcessorScope::Style
    }

    fn is_minimizer(&self) -> bool {
        true
    }

    fn process(&self, content: &str, _ctx: &ProcessingContext<'_>) -> Result<String, StepError> {
        let mut output = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();
        let mut quote: Option<char> = None;

        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                output.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    output.push(c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut closed = false;
                    while let Some(inner) = chars.next() {
                        if inner == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(StepError::new("unterminated comment"));
                    }
                }
                _ => output.push(c),
            }
        }

        Ok(output)
    }
}

/// Trims every line and drops blank lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceMinifier;

impl Processor for WhitespaceMinifier {
    fn name(&self) -> &str {
        "whitespace-minifier"
    }

    fn scope(&self) -> ProcessorScope {
        ProcessorScope::Any
    }

    fn is_minimizer(&self) -> bool {
        true
    }

    fn process(&self, content: &str, _ctx: &ProcessingContext<'_>) -> Result<String, StepError> {
        let lines: Vec<&str> =
            content.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
        Ok(lines.join("\n"))
    }
}
