//! Pieces shared by the attribute macros: reading parameters off a function signature, and
//! generating the code that binds them and calls the function.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Expr, Lit, MetaNameValue, Pat, PatType, Result, ReturnType, Signature, Type};

/// One function parameter, as the generated code needs to see it.
pub struct MethodParam {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expr>,
}

/// Collect the parameters, stripping the `#[default]` attributes from the function as they are
/// read.
pub fn extract_params<'a>(inputs: impl IntoIterator<Item = &'a mut PatType>) -> Result<Vec<MethodParam>> {
    let mut params: Vec<MethodParam> = Vec::new();

    for pat_type in inputs {
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &pat_type.pat,
                "JSON-RPC method parameters must be plain identifiers",
            ));
        };
        let name = pat_ident.ident.unraw().to_string();

        let mut default = None;
        for attr in pat_type.attrs.iter().filter(|attr| attr.path().is_ident("default")) {
            if default.is_some() {
                return Err(syn::Error::new_spanned(attr, "duplicate #[default] attribute"));
            }
            default = Some(attr.parse_args::<Expr>()?);
        }
        pat_type.attrs.retain(|attr| !attr.path().is_ident("default"));

        params.push(MethodParam {
            name,
            ty: (*pat_type.ty).clone(),
            default,
        });
    }

    Ok(params)
}

/// The `jsonrpc2::Signature` the parameters describe.
pub fn signature_expr(params: &[MethodParam]) -> TokenStream {
    let specs = params.iter().map(|param| {
        let name = &param.name;
        match (&param.default, is_option_type(&param.ty)) {
            (Some(default), _) => quote! { .optional(#name, ::jsonrpc2::__private::serde_json::json!(#default)) },
            (None, true) => quote! { .optional(#name, ::jsonrpc2::JsonValue::Null) },
            (None, false) => quote! { .required(#name) },
        }
    });

    quote! { ::jsonrpc2::Signature::new() #(#specs)* }
}

/// Statements that pull each argument out of `__args`, call `callee` with them, and turn whatever
/// it returns into a `Result<_, HandlerError>`.
pub fn handler_body(params: &[MethodParam], callee: TokenStream, sig: &Signature) -> TokenStream {
    let locals: Vec<_> = (0..params.len()).map(|index| format_ident!("__arg_{}", index)).collect();
    let extractions = params.iter().zip(&locals).enumerate().map(|(index, (param, local))| {
        let ty = &param.ty;
        quote! { let #local: #ty = __args.get(#index)?; }
    });

    let call = if sig.asyncness.is_some() {
        quote! { #callee(#(#locals),*).await }
    } else {
        quote! { #callee(#(#locals),*) }
    };

    let wrap_result = if returns_result(&sig.output) {
        quote! { result.map_err(::std::convert::Into::<::jsonrpc2::HandlerError>::into) }
    } else {
        quote! { ::std::result::Result::Ok::<_, ::jsonrpc2::HandlerError>(result) }
    };

    quote! {
        #(#extractions)*
        let result = #call;
        #wrap_result
    }
}

/// The value of a `key = "..."` argument.
pub fn string_value(nv: &MetaNameValue) -> Result<String> {
    if let Expr::Lit(expr_lit) = &nv.value
        && let Lit::Str(s) = &expr_lit.lit
    {
        Ok(s.value())
    } else {
        Err(syn::Error::new_spanned(&nv.value, "expected a string literal"))
    }
}

pub fn is_option_type(ty: &Type) -> bool {
    last_segment_is(ty, "Option")
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => last_segment_is(ty, "Result"),
    }
}

fn last_segment_is(ty: &Type, name: &str) -> bool {
    if let Type::Path(type_path) = ty {
        type_path.qself.is_none() && type_path.path.segments.last().is_some_and(|segment| segment.ident == name)
    } else {
        false
    }
}
