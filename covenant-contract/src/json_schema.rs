//! A JSON Schema subset, compiled once and checked structurally.
//!
//! Supported keywords: `type` (string or list), `properties`, `required`,
//! `additionalProperties` (boolean or schema), `items`, `enum`, `const`,
//! `minimum`, `maximum`, `exclusiveMinimum`, `exclusiveMaximum`,
//! `minLength`, `maxLength`, `pattern`, `minItems`, `maxItems` and `anyOf`.
//! Unknown keywords are ignored. Every violation is collected, not just the
//! first.

use std::collections::BTreeMap;
use std::sync::Arc;

use covenant_core::{ContractError, Issue, Outcome, PathSegment, Schema, Validation};
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => JsonType::String,
            "number" => JsonType::Number,
            "integer" => JsonType::Integer,
            "boolean" => JsonType::Boolean,
            "array" => JsonType::Array,
            "object" => JsonType::Object,
            "null" => JsonType::Null,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            JsonType::Boolean => value.is_boolean(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
            JsonType::Null => value.is_null(),
        }
    }
}

/// Return the JSON type name for a value (for error messages).
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default)]
enum Additional {
    #[default]
    Allowed,
    Forbidden,
    Schema(Box<Node>),
}

#[derive(Debug, Default)]
struct Node {
    types: Vec<JsonType>,
    properties: BTreeMap<String, Node>,
    required: Vec<String>,
    additional: Additional,
    items: Option<Box<Node>>,
    enumeration: Option<Vec<Value>>,
    constant: Option<Value>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    any_of: Vec<Node>,
}

fn compile_error(at: &str, message: impl std::fmt::Display) -> ContractError {
    ContractError::Configuration(format!("invalid JSON Schema at {at}: {message}"))
}

fn number(object: &Map<String, Value>, key: &str, at: &str) -> Result<Option<f64>, ContractError> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| compile_error(at, format!("'{key}' must be a number"))),
    }
}

fn count(object: &Map<String, Value>, key: &str, at: &str) -> Result<Option<usize>, ContractError> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| compile_error(at, format!("'{key}' must be a non-negative integer"))),
    }
}

impl Node {
    fn compile(schema: &Value, at: &str) -> Result<Self, ContractError> {
        let object = match schema {
            Value::Object(object) => object,
            Value::Bool(true) => return Ok(Node::default()),
            Value::Bool(false) => {
                return Ok(Node {
                    enumeration: Some(Vec::new()),
                    ..Node::default()
                });
            }
            other => {
                return Err(compile_error(
                    at,
                    format!("expected an object, found {}", json_type_name(other)),
                ));
            }
        };

        let mut node = Node::default();

        match object.get("type") {
            None => {}
            Some(Value::String(name)) => node.types.push(
                JsonType::parse(name).ok_or_else(|| compile_error(at, format!("unknown type '{name}'")))?,
            ),
            Some(Value::Array(names)) => {
                for name in names {
                    let parsed = name
                        .as_str()
                        .and_then(JsonType::parse)
                        .ok_or_else(|| compile_error(at, format!("unknown type {name}")))?;
                    node.types.push(parsed);
                }
            }
            Some(_) => return Err(compile_error(at, "'type' must be a string or a list")),
        }

        if let Some(properties) = object.get("properties") {
            let properties = properties
                .as_object()
                .ok_or_else(|| compile_error(at, "'properties' must be an object"))?;
            for (key, property) in properties {
                let child = Node::compile(property, &format!("{at}/properties/{key}"))?;
                node.properties.insert(key.clone(), child);
            }
        }

        if let Some(required) = object.get("required") {
            let required = required
                .as_array()
                .ok_or_else(|| compile_error(at, "'required' must be a list"))?;
            for key in required {
                let key = key
                    .as_str()
                    .ok_or_else(|| compile_error(at, "'required' entries must be strings"))?;
                node.required.push(key.to_owned());
            }
        }

        node.additional = match object.get("additionalProperties") {
            None | Some(Value::Bool(true)) => Additional::Allowed,
            Some(Value::Bool(false)) => Additional::Forbidden,
            Some(schema) => Additional::Schema(Box::new(Node::compile(
                schema,
                &format!("{at}/additionalProperties"),
            )?)),
        };

        if let Some(items) = object.get("items") {
            node.items = Some(Box::new(Node::compile(items, &format!("{at}/items"))?));
        }

        if let Some(values) = object.get("enum") {
            let values = values
                .as_array()
                .ok_or_else(|| compile_error(at, "'enum' must be a list"))?;
            node.enumeration = Some(values.clone());
        }
        node.constant = object.get("const").cloned();

        node.minimum = number(object, "minimum", at)?;
        node.maximum = number(object, "maximum", at)?;
        node.exclusive_minimum = number(object, "exclusiveMinimum", at)?;
        node.exclusive_maximum = number(object, "exclusiveMaximum", at)?;
        node.min_length = count(object, "minLength", at)?;
        node.max_length = count(object, "maxLength", at)?;
        node.min_items = count(object, "minItems", at)?;
        node.max_items = count(object, "maxItems", at)?;

        if let Some(pattern) = object.get("pattern") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| compile_error(at, "'pattern' must be a string"))?;
            node.pattern = Some(Regex::new(pattern).map_err(|e| compile_error(at, e))?);
        }

        if let Some(branches) = object.get("anyOf") {
            let branches = branches
                .as_array()
                .ok_or_else(|| compile_error(at, "'anyOf' must be a list"))?;
            for (index, branch) in branches.iter().enumerate() {
                node.any_of
                    .push(Node::compile(branch, &format!("{at}/anyOf/{index}"))?);
            }
        }

        Ok(node)
    }

    fn check(&self, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) {
        let report = |issues: &mut Vec<Issue>, message: String| {
            issues.push(Issue::at(path.to_vec(), message));
        };

        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = self.types.iter().map(|t| t.name()).collect();
            report(
                issues,
                format!(
                    "expected {}, found {}",
                    expected.join(" or "),
                    json_type_name(value)
                ),
            );
            return;
        }

        if let Some(constant) = &self.constant
            && value != constant
        {
            report(issues, format!("expected {constant}"));
        }
        if let Some(allowed) = &self.enumeration
            && !allowed.contains(value)
        {
            if allowed.is_empty() {
                report(issues, "no value is allowed here".to_owned());
            } else {
                let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                report(issues, format!("expected one of {}", allowed.join(", ")));
            }
        }

        match value {
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    self.check_number(n, path, issues);
                }
            }
            Value::String(s) => self.check_string(s, path, issues),
            Value::Array(items) => self.check_array(items, path, issues),
            Value::Object(object) => self.check_object(object, path, issues),
            _ => {}
        }

        if !self.any_of.is_empty() {
            let matched = self.any_of.iter().any(|branch| {
                let mut scratch = Vec::new();
                branch.check(value, path, &mut scratch);
                scratch.is_empty()
            });
            if !matched {
                report(issues, "does not match any allowed alternative".to_owned());
            }
        }
    }

    fn check_number(&self, n: f64, path: &[PathSegment], issues: &mut Vec<Issue>) {
        let mut report = |message: String| issues.push(Issue::at(path.to_vec(), message));
        if let Some(min) = self.minimum
            && n < min
        {
            report(format!("must be at least {min}"));
        }
        if let Some(max) = self.maximum
            && n > max
        {
            report(format!("must be at most {max}"));
        }
        if let Some(min) = self.exclusive_minimum
            && n <= min
        {
            report(format!("must be greater than {min}"));
        }
        if let Some(max) = self.exclusive_maximum
            && n >= max
        {
            report(format!("must be less than {max}"));
        }
    }

    fn check_string(&self, s: &str, path: &[PathSegment], issues: &mut Vec<Issue>) {
        let mut report = |message: String| issues.push(Issue::at(path.to_vec(), message));
        let length = s.chars().count();
        if let Some(min) = self.min_length
            && length < min
        {
            report(format!("must be at least {min} characters long"));
        }
        if let Some(max) = self.max_length
            && length > max
        {
            report(format!("must be at most {max} characters long"));
        }
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(s)
        {
            report(format!("does not match pattern '{}'", pattern.as_str()));
        }
    }

    fn check_array(&self, items: &[Value], path: &[PathSegment], issues: &mut Vec<Issue>) {
        if let Some(min) = self.min_items
            && items.len() < min
        {
            issues.push(Issue::at(path.to_vec(), format!("must have at least {min} items")));
        }
        if let Some(max) = self.max_items
            && items.len() > max
        {
            issues.push(Issue::at(path.to_vec(), format!("must have at most {max} items")));
        }
        if let Some(schema) = &self.items {
            for (index, item) in items.iter().enumerate() {
                let mut child = path.to_vec();
                child.push(PathSegment::Index(index));
                schema.check(item, &child, issues);
            }
        }
    }

    fn check_object(&self, object: &Map<String, Value>, path: &[PathSegment], issues: &mut Vec<Issue>) {
        for key in &self.required {
            if !object.contains_key(key) {
                let mut child = path.to_vec();
                child.push(PathSegment::Key(key.clone()));
                issues.push(Issue::at(child, "required field is missing"));
            }
        }
        for (key, value) in object {
            let mut child = path.to_vec();
            child.push(PathSegment::Key(key.clone()));
            match self.properties.get(key) {
                Some(schema) => schema.check(value, &child, issues),
                None => match &self.additional {
                    Additional::Allowed => {}
                    Additional::Forbidden => {
                        issues.push(Issue::at(child, "unexpected field"));
                    }
                    Additional::Schema(schema) => schema.check(value, &child, issues),
                },
            }
        }
    }
}

/// A compiled JSON Schema document.
///
/// Validation never rewrites the value: on success the input is returned
/// as given.
#[derive(Debug, Clone)]
pub struct JsonSchema {
    source: Arc<Value>,
    root: Arc<Node>,
}

impl JsonSchema {
    /// Compile `document`, rejecting malformed keywords up front.
    pub fn compile(document: Value) -> Result<Self, ContractError> {
        let root = Node::compile(&document, "#")?;
        Ok(Self {
            source: Arc::new(document),
            root: Arc::new(root),
        })
    }

    /// A schema that accepts every value.
    pub fn any() -> Self {
        Self {
            source: Arc::new(Value::Object(Map::new())),
            root: Arc::new(Node::default()),
        }
    }

    /// Check `value` and return every issue found.
    pub fn check(&self, value: &Value) -> Vec<Issue> {
        let mut issues = Vec::new();
        self.root.check(value, &[], &mut issues);
        issues
    }

    fn outcome(&self, value: Value) -> Outcome {
        let issues = self.check(&value);
        if issues.is_empty() {
            Ok(value)
        } else {
            Err(issues)
        }
    }
}

impl Schema for JsonSchema {
    fn validate(&self, value: Value) -> Validation {
        Validation::Ready(self.outcome(value))
    }

    fn json_schema(&self) -> Option<Value> {
        Some(self.source.as_ref().clone())
    }
}
