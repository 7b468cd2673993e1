//! Implementation of the `#[methods]` attribute macro

use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    FnArg, ImplItem, ItemImpl, Meta, Result, Signature, Token, Type, Visibility, punctuated::Punctuated,
};

use crate::utils::{extract_params, handler_body, signature_expr, string_value};

pub fn methods_impl(args: Punctuated<Meta, Token![,]>, mut input: ItemImpl) -> Result<TokenStream> {
    let mut prefix = None;

    for arg in args {
        match arg {
            Meta::NameValue(nv) if nv.path.is_ident("prefix") => prefix = Some(string_value(&nv)?),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unsupported argument; expected #[methods] or #[methods(prefix = \"...\")]",
                ));
            }
        }
    }

    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[methods] goes on an inherent impl block, not a trait impl",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[methods] impl blocks cannot be generic",
        ));
    }

    let prefix = match prefix {
        Some(prefix) => prefix,
        None => type_name(&input.self_ty)?,
    };

    let mut constructors = Vec::new();
    let mut aliases = Vec::new();

    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if !matches!(method.vis, Visibility::Public(_)) || !takes_shared_self(&method.sig) {
            continue;
        }
        if !method.sig.generics.params.is_empty() {
            return Err(syn::Error::new_spanned(
                &method.sig.generics,
                "public methods of a #[methods] impl block cannot be generic",
            ));
        }

        let typed = method.sig.inputs.iter_mut().filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => Some(pat_type),
            FnArg::Receiver(_) => None,
        });
        let params = extract_params(typed)?;

        let fn_name = method.sig.ident.clone();
        let alias = if prefix.is_empty() {
            fn_name.unraw().to_string()
        } else {
            format!("{prefix}.{}", fn_name.unraw())
        };
        let signature = signature_expr(&params);
        let body = handler_body(&params, quote! { __this.#fn_name }, &method.sig);

        constructors.push(quote! {
            {
                let __this = ::std::sync::Arc::clone(&self);
                ::jsonrpc2::Method::new(#alias, #signature, move |__args: ::jsonrpc2::BoundArgs| {
                    let __this = ::std::sync::Arc::clone(&__this);
                    async move { #body }
                })
            }
        });
        aliases.push(alias);
    }

    let self_ty = &input.self_ty;
    let doc = if aliases.is_empty() {
        "This type exposes no JSON-RPC methods.".to_string()
    } else {
        format!("The JSON-RPC methods of this value: `{}`.", aliases.join("`, `"))
    };

    Ok(quote! {
        #input

        impl #self_ty {
            #[doc = #doc]
            pub fn methods(self: ::std::sync::Arc<Self>) -> ::std::vec::Vec<::jsonrpc2::Method> {
                ::std::vec![#(#constructors),*]
            }
        }
    })
}

/// Only `&self` methods can be called through the shared `Arc` the handlers hold.
fn takes_shared_self(sig: &Signature) -> bool {
    sig.receiver()
        .is_some_and(|receiver| receiver.reference.is_some() && receiver.mutability.is_none())
}

fn type_name(ty: &Type) -> Result<String> {
    if let Type::Path(type_path) = ty
        && type_path.qself.is_none()
        && let Some(segment) = type_path.path.segments.last()
    {
        Ok(segment.ident.unraw().to_string())
    } else {
        Err(syn::Error::new_spanned(
            ty,
            "can't name the methods of this type; use #[methods(prefix = \"...\")]",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand(args: Punctuated<Meta, Token![,]>, input: ItemImpl) -> Result<String> {
        methods_impl(args, input).map(|tokens| tokens.to_string())
    }

    #[test]
    fn public_shared_self_methods_are_exposed() {
        let expanded = expand(
            Punctuated::new(),
            parse_quote! {
                impl Calculator {
                    pub fn new() -> Self { Calculator }
                    pub async fn add(&self, a: i64, #[default(1)] b: i64) -> i64 { a + b }
                    pub fn reset(&mut self) {}
                    pub fn into_inner(self) {}
                    fn helper(&self) {}
                    pub(crate) fn internal(&self) {}
                }
            },
        )
        .unwrap();

        assert!(expanded.contains("pub fn methods (self : :: std :: sync :: Arc < Self >)"));
        assert!(expanded.contains(r#""Calculator.add""#));
        assert!(expanded.contains(r#". optional ("b" , :: jsonrpc2 :: __private :: serde_json :: json ! (1))"#));
        assert!(expanded.contains("__this . add (__arg_0 , __arg_1) . await"));
        for skipped in ["new", "reset", "into_inner", "helper", "internal"] {
            assert!(!expanded.contains(&format!(r#""Calculator.{skipped}""#)), "{skipped} was exposed");
        }

        // The #[default] attribute is consumed
        assert!(!expanded.contains("# [default"));
    }

    #[test]
    fn prefix_can_be_chosen_or_dropped() {
        let expanded = expand(
            parse_quote!(prefix = "calc"),
            parse_quote! {
                impl crate::Calculator {
                    pub fn r#type(&self) -> String { String::new() }
                }
            },
        )
        .unwrap();
        assert!(expanded.contains(r#""calc.type""#));

        let expanded = expand(
            parse_quote!(prefix = ""),
            parse_quote! {
                impl Calculator {
                    pub fn clear(&self) -> Result<(), HandlerError> { Ok(()) }
                }
            },
        )
        .unwrap();
        assert!(expanded.contains(r#""clear""#));
        assert!(expanded.contains("result . map_err"));
    }

    #[test]
    fn rejects_unsupported_impl_blocks() {
        assert!(expand(Punctuated::new(), parse_quote! { impl Default for Calculator {} }).is_err());
        assert!(expand(Punctuated::new(), parse_quote! { impl<T> Wrapper<T> {} }).is_err());
        assert!(expand(Punctuated::new(), parse_quote! { impl (i64, i64) {} }).is_err());
        assert!(expand(parse_quote!(prefix = 1), parse_quote! { impl Calculator {} }).is_err());
        assert!(expand(parse_quote!(name = "x"), parse_quote! { impl Calculator {} }).is_err());
        assert!(
            expand(
                Punctuated::new(),
                parse_quote! { impl Calculator { pub fn generic<T>(&self, value: T) {} } }
            )
            .is_err()
        );
    }
}
