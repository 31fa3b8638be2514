//! The validation boundary.
//!
//! Every value that crosses a process boundary (workflow input and output,
//! activity arguments and results, signal, query and update payloads) goes
//! through [`validate`] or [`validate_now`]. Schemas come from any vendor;
//! the only thing this layer knows about them is the [`Schema`] trait.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ContractError;

/// One step of the path from the validated root to an offending value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// An object property.
    Key(String),
    /// An array element.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{key}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A single reason a value failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Where in the value the problem is. Empty means the root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Human-readable description.
    pub message: String,
}

impl Issue {
    /// An issue at the root of the value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// An issue at the given path.
    pub fn at(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Prefix this issue's path with `segment`.
    pub fn nested(mut self, segment: impl Into<PathSegment>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str(&self.message);
        }
        f.write_str("$")?;
        for segment in &self.path {
            write!(f, "{segment}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Render an issue list as a single `; `-separated line.
pub fn describe_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of validating one value: the (possibly normalized) value, or
/// every issue found.
pub type Outcome = Result<serde_json::Value, Vec<Issue>>;

/// What a schema hands back from [`Schema::validate`].
pub enum Validation {
    /// Validation finished without suspending.
    Ready(Outcome),
    /// Validation needs to suspend (remote lookups, async refinements).
    Pending(BoxFuture<'static, Outcome>),
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Validation::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<Outcome> for Validation {
    fn from(outcome: Outcome) -> Self {
        Validation::Ready(outcome)
    }
}

/// The single capability every schema vendor implements.
///
/// Implementations must not panic on malformed input: a value that does not
/// conform is reported through `Err(issues)`, never by unwinding.
pub trait Schema: Send + Sync {
    /// Validate `value`, returning it (possibly normalized) or its issues.
    fn validate(&self, value: serde_json::Value) -> Validation;

    /// Whether [`Schema::validate`] may return [`Validation::Pending`].
    ///
    /// Query payloads are validated synchronously, so a schema that answers
    /// `true` here is rejected when a query handler is registered.
    fn is_async(&self) -> bool {
        false
    }

    /// JSON Schema document describing accepted values, if the vendor can
    /// produce one.
    fn json_schema(&self) -> Option<serde_json::Value> {
        None
    }
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    fn validate(&self, value: serde_json::Value) -> Validation {
        (**self).validate(value)
    }

    fn is_async(&self) -> bool {
        (**self).is_async()
    }

    fn json_schema(&self) -> Option<serde_json::Value> {
        (**self).json_schema()
    }
}

/// Shared, type-erased schema handle stored in contracts.
pub type SchemaRef = Arc<dyn Schema>;

/// Validate `value` against `schema`, suspending if the schema needs to.
pub async fn validate(schema: &dyn Schema, value: serde_json::Value) -> Outcome {
    match schema.validate(value) {
        Validation::Ready(outcome) => outcome,
        Validation::Pending(pending) => pending.await,
    }
}

/// Validate `value` against `schema` without suspending.
///
/// Used on the query path. A schema that nonetheless returns
/// [`Validation::Pending`] is a configuration fault and reported as
/// [`ContractError::Configuration`].
pub fn validate_now(schema: &dyn Schema, value: serde_json::Value) -> Result<Outcome, ContractError> {
    match schema.validate(value) {
        Validation::Ready(outcome) => Ok(outcome),
        Validation::Pending(_) => Err(ContractError::Configuration(
            "schema suspended on a path that must validate synchronously".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NonNull;

    impl Schema for NonNull {
        fn validate(&self, value: serde_json::Value) -> Validation {
            if value.is_null() {
                Validation::Ready(Err(vec![Issue::new("value is required")]))
            } else {
                Validation::Ready(Ok(value))
            }
        }
    }

    struct Deferred;

    impl Schema for Deferred {
        fn validate(&self, value: serde_json::Value) -> Validation {
            Validation::Pending(Box::pin(async move { Ok(value) }))
        }

        fn is_async(&self) -> bool {
            true
        }
    }

    #[test]
    fn issue_display_includes_path() {
        let issue = Issue::new("expected number")
            .nested("value")
            .nested(2usize)
            .nested("items");
        assert_eq!(issue.to_string(), "$.items[2].value: expected number");
        assert_eq!(Issue::new("bad").to_string(), "bad");
    }

    #[test]
    fn issue_serializes_path_untagged() {
        let issue = Issue::at(vec!["a".into(), 0usize.into()], "nope");
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            json!({"path": ["a", 0], "message": "nope"})
        );
    }

    #[tokio::test]
    async fn validate_awaits_pending_schemas() {
        assert_eq!(validate(&Deferred, json!(3)).await, Ok(json!(3)));
        assert!(validate(&NonNull, json!(null)).await.is_err());
    }

    #[test]
    fn validate_now_rejects_pending_schemas() {
        assert_eq!(validate_now(&NonNull, json!(1)).unwrap(), Ok(json!(1)));
        let err = validate_now(&Deferred, json!(1)).unwrap_err();
        assert!(matches!(err, ContractError::Configuration(_)));
    }
}
