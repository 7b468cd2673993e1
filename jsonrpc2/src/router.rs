//! After JSON RPC messages have been decoded, those that represent method calls or notifications
//! need to be routed to the corresponding handler, and that handler invoked.  The logic to perform
//! this is called "routing", and is implemented in the [`Router`] type in this module.
//!
//! The set of methods is fixed before the server starts serving.  Registering the same alias
//! twice is a setup error, not something discovered when a request arrives.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{BoundArgs, Method, Signature};
use crate::{DispatchError, HandlerError, JsonRpcError, JsonValue, Params, Result};

/// Anything that can resolve a method alias and invoke it.
///
/// [`Router`] is the implementation most servers want.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn invoke(&self, method: &str, params: Option<Params>) -> Result<JsonValue, DispatchError>;
}

/// Yes/no gate consulted before a registered method is invoked.
pub trait Authoriser: Send + Sync + 'static {
    fn is_authorised(&self, method: &Method) -> bool;
}

impl<F> Authoriser for F
where
    F: Fn(&Method) -> bool + Send + Sync + 'static,
{
    fn is_authorised(&self, method: &Method) -> bool {
        self(method)
    }
}

/// Maps method aliases to [`Method`]s.
#[derive(Clone, Default)]
pub struct Router {
    methods: HashMap<String, Method>,
    authoriser: Option<Arc<dyn Authoriser>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every invocation to pass `authoriser` first.
    pub fn with_authoriser(mut self, authoriser: impl Authoriser) -> Self {
        self.authoriser = Some(Arc::new(authoriser));
        self
    }

    /// Register a method under its alias.
    pub fn register(&mut self, method: Method) -> Result<()> {
        if self.methods.contains_key(method.alias()) {
            return Err(JsonRpcError::DuplicateMethod {
                alias: method.alias().to_string(),
            });
        }

        self.methods.insert(method.alias().to_string(), method);
        Ok(())
    }

    /// Register several methods at once.
    ///
    /// If any alias is a duplicate, either of an existing method or of another in `methods`,
    /// nothing is registered.
    pub fn register_all(&mut self, methods: impl IntoIterator<Item = Method>) -> Result<()> {
        let methods: Vec<Method> = methods.into_iter().collect();

        let mut seen = std::collections::HashSet::new();
        for method in &methods {
            if self.methods.contains_key(method.alias()) || !seen.insert(method.alias()) {
                return Err(JsonRpcError::DuplicateMethod {
                    alias: method.alias().to_string(),
                });
            }
        }

        for method in methods {
            self.methods.insert(method.alias().to_string(), method);
        }

        Ok(())
    }

    /// Shorthand for registering [`Method::new`].
    pub fn register_handler<F, Fut, R>(
        &mut self,
        alias: impl Into<String>,
        signature: Signature,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: serde::Serialize + Send + 'static,
    {
        self.register(Method::new(alias, signature, handler))
    }

    pub fn get(&self, alias: &str) -> Option<&Method> {
        self.methods.get(alias)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[async_trait]
impl Dispatch for Router {
    async fn invoke(&self, method: &str, params: Option<Params>) -> Result<JsonValue, DispatchError> {
        let Some(handler) = self.methods.get(method) else {
            return Err(DispatchError::MethodNotFound {
                method: method.to_string(),
            });
        };

        if let Some(authoriser) = &self.authoriser {
            if !authoriser.is_authorised(handler) {
                return Err(DispatchError::Unauthorised {
                    method: method.to_string(),
                });
            }
        }

        handler.invoke(params).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut aliases: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        aliases.sort_unstable();

        f.debug_struct("Router")
            .field("methods", &aliases)
            .field("authoriser", &self.authoriser.is_some())
            .finish()
    }
}
