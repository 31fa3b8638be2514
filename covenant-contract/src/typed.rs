//! Schemas backed by Rust types and closures.

use std::fmt;
use std::marker::PhantomData;

use covenant_core::{Issue, Outcome, Schema, Validation};
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Schema that accepts exactly the values `T` deserializes from.
///
/// A successful validation returns `T` serialized back, so defaults and
/// renames declared on `T` are applied to the value that continues on.
///
/// ```
/// use covenant_contract::TypedSchema;
/// use covenant_core::{Schema, Validation};
/// use serde_json::json;
///
/// #[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
/// struct Refund {
///     order_id: String,
///     #[serde(default)]
///     partial: bool,
/// }
///
/// let schema = TypedSchema::<Refund>::new();
/// let Validation::Ready(outcome) = schema.validate(json!({"order_id": "o-1"})) else {
///     unreachable!()
/// };
/// assert_eq!(outcome.unwrap(), json!({"order_id": "o-1", "partial": false}));
/// ```
pub struct TypedSchema<T> {
    document: Value,
    _type: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: Serialize + DeserializeOwned + schemars::JsonSchema,
{
    /// Schema for `T`, with its JSON Schema generated by `schemars`.
    pub fn new() -> Self {
        let document = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            document,
            _type: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T>
where
    T: Serialize + DeserializeOwned + schemars::JsonSchema,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

fn typed_outcome<T: Serialize + DeserializeOwned>(value: Value) -> Outcome {
    let parsed: T = serde_json::from_value(value).map_err(|e| vec![Issue::new(e.to_string())])?;
    serde_json::to_value(&parsed).map_err(|e| vec![Issue::new(e.to_string())])
}

impl<T> Schema for TypedSchema<T>
where
    T: Serialize + DeserializeOwned + schemars::JsonSchema,
{
    fn validate(&self, value: Value) -> Validation {
        Validation::Ready(typed_outcome::<T>(value))
    }

    fn json_schema(&self) -> Option<Value> {
        (!self.document.is_null()).then(|| self.document.clone())
    }
}

/// Schema defined by a synchronous closure.
pub struct FnSchema<F> {
    check: F,
}

impl<F> fmt::Debug for FnSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSchema")
    }
}

/// Build a schema from a synchronous validation closure.
pub fn schema_fn<F>(check: F) -> FnSchema<F>
where
    F: Fn(Value) -> Outcome + Send + Sync + 'static,
{
    FnSchema { check }
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> Outcome + Send + Sync + 'static,
{
    fn validate(&self, value: Value) -> Validation {
        Validation::Ready((self.check)(value))
    }
}

/// Schema whose validation may suspend (remote lookups, async refinements).
///
/// Reports [`Schema::is_async`] as `true`, so it cannot back a query.
pub struct AsyncFnSchema<F> {
    check: F,
}

impl<F> fmt::Debug for AsyncFnSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncFnSchema")
    }
}

/// Build a schema from an asynchronous validation closure.
pub fn async_schema_fn<F>(check: F) -> AsyncFnSchema<F>
where
    F: Fn(Value) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
{
    AsyncFnSchema { check }
}

impl<F> Schema for AsyncFnSchema<F>
where
    F: Fn(Value) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
{
    fn validate(&self, value: Value) -> Validation {
        Validation::Pending((self.check)(value))
    }

    fn is_async(&self) -> bool {
        true
    }
}
