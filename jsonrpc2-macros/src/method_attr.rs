//! Implementation of the `#[method]` attribute macro

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{FnArg, ItemFn, Meta, Result, Token, punctuated::Punctuated};

use crate::utils::{extract_params, handler_body, signature_expr, string_value};

pub fn method_impl(args: Punctuated<Meta, Token![,]>, mut input: ItemFn) -> Result<TokenStream> {
    let mut alias = None;

    for arg in args {
        match arg {
            Meta::NameValue(nv) if nv.path.is_ident("name") => {
                let name = string_value(&nv)?;
                if name.is_empty() {
                    return Err(syn::Error::new_spanned(&nv.value, "method name must not be empty"));
                }
                alias = Some(name);
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unsupported argument; expected #[method] or #[method(name = \"...\")]",
                ));
            }
        }
    }

    if !input.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.sig.generics,
            "#[method] functions cannot be generic",
        ));
    }

    let mut typed = Vec::new();
    for arg in &mut input.sig.inputs {
        match arg {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "#[method] can only be applied to free functions; use #[methods] on the impl block",
                ));
            }
            FnArg::Typed(pat_type) => typed.push(pat_type),
        }
    }
    let params = extract_params(typed)?;

    let fn_name = input.sig.ident.clone();
    let alias = alias.unwrap_or_else(|| fn_name.unraw().to_string());
    let signature = signature_expr(&params);
    let body = handler_body(&params, quote! { #fn_name }, &input.sig);

    let vis = &input.vis;
    let constructor = format_ident!("{}_method", fn_name.unraw());
    let doc = format!("The `{alias}` JSON-RPC method, implemented by [`{fn_name}`].");

    Ok(quote! {
        #input

        #[doc = #doc]
        #vis fn #constructor() -> ::jsonrpc2::Method {
            ::jsonrpc2::Method::new(#alias, #signature, |__args: ::jsonrpc2::BoundArgs| async move {
                #body
            })
        }
    })
}
