//! The code that runs when a method is invoked is called a "handler".  All such code implements
//! [`Handler`], although it's not intended that most users will implement that directly.
//!
//! Handlers don't see the raw `params` of a request.  Each [`Method`] carries a [`Signature`]: the
//! ordered list of formal parameter names, and the default value of each optional one.  Before the
//! handler runs, the request params are bound against that signature, by position if the params
//! are an array and by name if they are an object, and the handler receives the result as
//! [`BoundArgs`] in signature order.  So a handler written once works with both calling styles.
//!
//! Signatures can be written by hand, or generated from an ordinary Rust function with the
//! `#[jsonrpc2::method]` attribute.
use std::borrow::Cow;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use itertools::Itertools;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{DispatchError, HandlerError, JsonMap, JsonValue, Params, error};

/// One formal parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: Cow<'static, str>,
    default: Option<JsonValue>,
}

impl ParamSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value bound when the caller doesn't supply one, or `None` if the parameter is required.
    pub fn default(&self) -> Option<&JsonValue> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Why request params could not be bound to a method's signature.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("missing required params: {}", .names.iter().join(", "))]
    MissingNamed { names: Vec<String> },

    #[error("expected at most {expected} positional params, got {actual}")]
    TooManyPositional { expected: usize, actual: usize },

    #[error("missing required positional param '{name}' at index {index}")]
    MissingPositional { name: String, index: usize },
}

/// Ordered list of a method's formal parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<ParamSpec>,
}

impl Signature {
    /// A signature with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter the caller must supply.
    pub fn required(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Append a parameter that takes `default` when the caller leaves it out.
    pub fn optional(mut self, name: impl Into<Cow<'static, str>>, default: impl Into<JsonValue>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Bind request params to this signature.
    ///
    /// Absent params are treated the same as an empty array.
    pub fn bind(&self, params: Option<Params>) -> Result<BoundArgs, ParamsError> {
        let values = match params {
            None => self.bind_positional(Vec::new())?,
            Some(Params::Array(values)) => self.bind_positional(values)?,
            Some(Params::Object(map)) => self.bind_named(map)?,
        };

        Ok(BoundArgs {
            names: self.params.iter().map(|spec| spec.name.clone()).collect(),
            values,
        })
    }

    fn bind_positional(&self, values: Vec<JsonValue>) -> Result<Vec<JsonValue>, ParamsError> {
        if values.len() > self.params.len() {
            return Err(ParamsError::TooManyPositional {
                expected: self.params.len(),
                actual: values.len(),
            });
        }

        let mut supplied = values.into_iter();
        self.params
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                supplied
                    .next()
                    .or_else(|| spec.default.clone())
                    .ok_or_else(|| ParamsError::MissingPositional {
                        name: spec.name.to_string(),
                        index,
                    })
            })
            .collect()
    }

    /// Keys that don't name a formal parameter are ignored.
    fn bind_named(&self, mut map: JsonMap) -> Result<Vec<JsonValue>, ParamsError> {
        let mut values = Vec::with_capacity(self.params.len());
        let mut missing = Vec::new();

        for spec in &self.params {
            match map.remove(spec.name.as_ref()).or_else(|| spec.default.clone()) {
                Some(value) => values.push(value),
                None => missing.push(spec.name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(ParamsError::MissingNamed { names: missing })
        }
    }
}

/// Arguments bound to a [`Signature`], in signature order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    names: Vec<Cow<'static, str>>,
    values: Vec<JsonValue>,
}

impl BoundArgs {
    /// Deserialize the argument at `index`.
    ///
    /// Fails with [`HandlerError::InvalidParams`] if the argument doesn't exist or isn't a valid
    /// `T`, so handlers can just use `?`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let value = self.values.get(index).ok_or_else(|| {
            HandlerError::invalid_params(format!("no argument at position {index}"))
        })?;

        T::deserialize(value).map_err(|e| {
            HandlerError::invalid_params(format!("argument '{}': {e}", self.names[index]))
        })
    }

    pub fn value(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index)
    }

    /// Look up an argument by its formal name.
    pub fn by_name(&self, name: &str) -> Option<&JsonValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|index| self.values.get(index))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }
}

/// Code that runs when a method is invoked.
///
/// Most handlers are async closures wrapped by [`Method::new`]; implement this directly for
/// handlers that need to be named types.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, args: BoundArgs) -> Result<JsonValue, HandlerError>;
}

/// Adapts an async function to [`Handler`], serializing whatever it returns.
struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut, R> Handler for HandlerFn<F>
where
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, args: BoundArgs) -> Result<JsonValue, HandlerError> {
        let result = (self.0)(args).await?;

        serde_json::to_value(result).map_err(|e| {
            HandlerError::Internal(anyhow::Error::new(e).context(format!(
                "serializing result of type {}",
                std::any::type_name::<R>()
            )))
        })
    }
}

/// A registered method: its alias, its signature, and its handler.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Method {
    alias: Arc<str>,
    signature: Arc<Signature>,
    handler: Arc<dyn Handler>,
}

impl Method {
    /// Build a method from an async function of its bound arguments.
    pub fn new<F, Fut, R>(alias: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        Self::from_handler(alias, signature, HandlerFn(handler))
    }

    pub fn from_handler(alias: impl Into<String>, signature: Signature, handler: impl Handler) -> Self {
        let alias: String = alias.into();
        Self {
            alias: Arc::from(alias),
            signature: Arc::new(signature),
            handler: Arc::new(handler),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Bind `params` to this method's signature and run the handler.
    pub async fn invoke(&self, params: Option<Params>) -> Result<JsonValue, DispatchError> {
        let args = self
            .signature
            .bind(params)
            .map_err(|e| DispatchError::InvalidParams {
                method: self.alias.to_string(),
                reason: e.to_string(),
            })?;

        // A panicking handler fails its own request and nothing else
        let result = AssertUnwindSafe(async { self.handler.handle(args).await })
            .catch_unwind()
            .await;

        match result {
            Ok(result) => result.map_err(|e| DispatchError::from_handler_error(&self.alias, e)),
            Err(panic) => {
                let message = error::panic_err_to_string(panic);
                tracing::error!(method = %self.alias, %message, "Method handler panicked");

                Err(DispatchError::Internal {
                    method: self.alias.to_string(),
                    source: anyhow::anyhow!("Handler panicked: {message}").into(),
                })
            }
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("alias", &self.alias)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorDetails;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn a_b2() -> Signature {
        Signature::new().required("a").optional("b", 2)
    }

    fn params(value: JsonValue) -> Option<Params> {
        Params::from_json(value)
    }

    #[test]
    fn named_binding_fills_defaults() {
        let args = a_b2().bind(params(json!({"a": 1}))).unwrap();
        assert_eq!(args.into_values(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn positional_binding_fills_defaults() {
        let args = a_b2().bind(params(json!([1]))).unwrap();
        assert_eq!(args.into_values(), vec![json!(1), json!(2)]);

        let args = a_b2().bind(params(json!([1, 5]))).unwrap();
        assert_eq!(args.into_values(), vec![json!(1), json!(5)]);
    }

    #[test]
    fn too_many_positional_params() {
        assert_eq!(
            a_b2().bind(params(json!([1, 2, 3]))),
            Err(ParamsError::TooManyPositional {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn missing_required_params() {
        assert_matches!(
            a_b2().bind(params(json!([]))),
            Err(ParamsError::MissingPositional { name, index: 0 }) if name == "a"
        );
        assert_matches!(
            a_b2().bind(None),
            Err(ParamsError::MissingPositional { name, .. }) if name == "a"
        );

        let err = Signature::new()
            .required("x")
            .required("y")
            .optional("z", 0)
            .bind(params(json!({"z": 1})))
            .unwrap_err();
        assert_eq!(err.to_string(), "missing required params: x, y");
    }

    #[test]
    fn unknown_named_params_are_tolerated() {
        let args = a_b2().bind(params(json!({"b": 7, "a": 1, "c": 3}))).unwrap();
        assert_eq!(args.by_name("a"), Some(&json!(1)));
        assert_eq!(args.by_name("b"), Some(&json!(7)));
        assert_eq!(args.by_name("c"), None);

        let args = Signature::new().bind(params(json!({"anything": true}))).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn null_default_is_a_real_default() {
        let signature = Signature::new().optional("maybe", JsonValue::Null);
        assert!(!signature.params()[0].is_required());
        let args = signature.bind(None).unwrap();
        assert_eq!(args.get::<Option<i32>>(0).unwrap(), None);
    }

    #[test]
    fn typed_access_reports_invalid_params() {
        let args = a_b2().bind(params(json!(["one"]))).unwrap();
        assert_matches!(args.get::<i64>(0), Err(HandlerError::InvalidParams(reason)) if reason.contains("'a'"));
        assert_eq!(args.get::<i64>(1).unwrap(), 2);
        assert_matches!(args.get::<i64>(2), Err(HandlerError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn method_invoke_binds_then_calls() {
        let signature = Signature::new().required("minuend").required("subtrahend");
        let method = Method::new("subtract", signature, |args: BoundArgs| async move {
            let minuend: i64 = args.get(0)?;
            let subtrahend: i64 = args.get(1)?;
            Ok(minuend - subtrahend)
        });

        assert_eq!(method.invoke(params(json!([42, 23]))).await.unwrap(), json!(19));
        assert_eq!(
            method.invoke(params(json!({"subtrahend": 23, "minuend": 42}))).await.unwrap(),
            json!(19)
        );
        assert_matches!(
            method.invoke(params(json!([42]))).await,
            Err(DispatchError::InvalidParams { method, .. }) if method == "subtract"
        );
        assert_matches!(
            method.invoke(params(json!(["42", 23]))).await,
            Err(DispatchError::InvalidParams { .. })
        );
    }

    #[tokio::test]
    async fn handler_errors_are_classified() {
        let app = Method::new("app", Signature::new(), |_args: BoundArgs| async move {
            Err::<(), _>(HandlerError::from(ErrorDetails::server_error(-32001, "busy", json!(3))))
        });
        assert_matches!(
            app.invoke(None).await,
            Err(DispatchError::Application { details, .. }) => {
                assert_eq!(details.code.code(), -32001);
                assert_eq!(details.data, Some(json!(3)));
            }
        );

        let internal = Method::new("internal", Signature::new(), |_args: BoundArgs| async move {
            Err::<(), _>(HandlerError::from(anyhow::anyhow!("boom")))
        });
        assert_matches!(internal.invoke(None).await, Err(DispatchError::Internal { .. }));
    }

    #[tokio::test]
    async fn handler_panics_become_internal_errors() {
        let method = Method::new("explode", Signature::new().optional("fuse", 0), |args: BoundArgs| async move {
            let fuse: i64 = args.get(0)?;
            if fuse > 0 {
                panic!("fuse {fuse} burned down");
            }
            Ok(fuse)
        });

        assert_matches!(
            method.invoke(params(json!([3]))).await,
            Err(DispatchError::Internal { method, source }) => {
                assert_eq!(method, "explode");
                assert_eq!(source.to_string(), "Handler panicked: fuse 3 burned down");
            }
        );

        // The method is still usable afterwards
        assert_eq!(method.invoke(None).await.unwrap(), json!(0));
    }

    struct Answer;

    #[async_trait]
    impl Handler for Answer {
        async fn handle(&self, _args: BoundArgs) -> Result<JsonValue, HandlerError> {
            Ok(json!(42))
        }
    }

    #[tokio::test]
    async fn named_handler_types() {
        let method = Method::from_handler("answer", Signature::new(), Answer);
        assert_eq!(method.alias(), "answer");
        assert_eq!(method.invoke(params(json!([]))).await.unwrap(), json!(42));
        assert!(format!("{method:?}").contains("answer"));
    }
}
