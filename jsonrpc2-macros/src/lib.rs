//! Procedural macros for the `jsonrpc2` crate.
//!
//! Use these through the re-exports in `jsonrpc2` rather than depending on this crate directly;
//! the generated code refers to `::jsonrpc2` by path.

use proc_macro::TokenStream;
use syn::{ItemFn, ItemImpl, Meta, Token, parse_macro_input, punctuated::Punctuated};

mod method_attr;
mod methods_attr;
mod utils;

/// Turn a free function into a JSON-RPC method.
///
/// The function is left as it was, and a constructor named `<function>_method` is generated
/// alongside it, returning a `jsonrpc2::Method` ready to register with a router.  Each function
/// parameter becomes a JSON-RPC parameter of the same name, in the same position, and is
/// deserialized from whatever the caller sent.
///
/// - `#[method(name = "math.subtract")]` registers the method under an alias other than the
///   function name.
/// - `#[default(expr)]` on a parameter makes it optional; `expr` is converted to JSON with
///   `serde_json::json!` and used when the caller omits the parameter.
/// - Parameters of type `Option<T>` are optional, and are `None` when omitted.
///
/// The function may be `async` or not.  If it returns a `Result`, the error type must convert
/// into `jsonrpc2::HandlerError`; any other return type is taken as the successful result.
/// Parameters must be owned types, since they are deserialized fresh for every call.
///
/// # Example
///
/// ```rust,ignore
/// use jsonrpc2::{HandlerError, method};
///
/// #[method]
/// async fn subtract(minuend: i64, subtrahend: i64) -> i64 {
///     minuend - subtrahend
/// }
///
/// #[method(name = "sum")]
/// fn add_up(a: i64, #[default(0)] b: i64, c: Option<i64>) -> Result<i64, HandlerError> {
///     Ok(a + b + c.unwrap_or_default())
/// }
///
/// let router_methods = [subtract_method(), add_up_method()];
/// ```
#[proc_macro_attribute]
pub fn method(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input = parse_macro_input!(input as ItemFn);
    method_attr::method_impl(args, input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Expose the public methods of a type as JSON-RPC methods.
///
/// Put this on an inherent `impl` block.  Every `pub` method in it that takes `&self` becomes a
/// JSON-RPC method registered as `Type.method`, and a `methods(self: Arc<Self>) -> Vec<Method>`
/// constructor is generated that returns all of them, sharing the one value.  Other methods, such
/// as constructors or anything taking `&mut self`, are left alone.
///
/// - `#[methods(prefix = "calc")]` registers them as `calc.method` instead.  An empty prefix
///   registers them under their bare names.
/// - Parameters work as they do for [`macro@method`]: `#[default(expr)]` and `Option<T>` make a
///   parameter optional, and a `Result` return must have an error that converts into
///   `jsonrpc2::HandlerError`.
///
/// The type must be `Send + Sync + 'static`, and exposed methods must return owned values.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use jsonrpc2::methods;
///
/// #[derive(Default)]
/// struct Counter {
///     value: AtomicI64,
/// }
///
/// #[methods]
/// impl Counter {
///     pub fn add(&self, #[default(1)] by: i64) -> i64 {
///         self.value.fetch_add(by, Ordering::SeqCst) + by
///     }
///
///     pub fn get(&self) -> i64 {
///         self.value.load(Ordering::SeqCst)
///     }
/// }
///
/// // Registers "Counter.add" and "Counter.get"
/// let router_methods = Arc::new(Counter::default()).methods();
/// ```
#[proc_macro_attribute]
pub fn methods(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input = parse_macro_input!(input as ItemImpl);
    methods_attr::methods_impl(args, input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
