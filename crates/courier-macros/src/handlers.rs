//! `#[handlers]` attribute implementation.
//!
//! Generates, next to the unchanged impl block:
//!
//! 1. `impl courier::DescribeHandler` building the type's `HandlerDescriptor`
//! 2. a `linkme` entry in `courier::HANDLERS` (unless `unlinked`)

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{FnArg, ImplItem, ItemImpl, ReturnType, Signature, Type};

// ============================================================================
// Options
// ============================================================================

#[derive(Default)]
struct Options {
    /// `default`: construct the handler with `Default`.
    default: bool,
    /// `unlinked`: skip the link-time registration.
    unlinked: bool,
}

fn parse_options(attr: TokenStream) -> syn::Result<Options> {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("default") {
            options.default = true;
            Ok(())
        } else if meta.path.is_ident("unlinked") {
            options.unlinked = true;
            Ok(())
        } else {
            Err(meta.error("unknown option, expected `default` or `unlinked`"))
        }
    });
    syn::parse::Parser::parse2(parser, attr)?;
    Ok(options)
}

// ============================================================================
// Method analysis
// ============================================================================

/// What a handler method returns.
enum Output {
    /// No return type.
    Nothing,
    /// A `Result` (or an alias ending in `Result`), passed through.
    Fallible,
    /// Any other type, always a success.
    Value,
}

struct HandleMethod<'a> {
    name: &'a syn::Ident,
    request: &'a Type,
    asynchronous: bool,
    cancellable: bool,
    output: Output,
}

fn analyze(sig: &Signature) -> syn::Result<HandleMethod<'_>> {
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "handler methods cannot be generic",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new(
                sig.span(),
                "handler methods must take `&self`",
            ));
        }
    }

    let typed: Vec<&Type> = inputs
        .map(|arg| match arg {
            FnArg::Typed(pat) => Ok(&*pat.ty),
            FnArg::Receiver(r) => Err(syn::Error::new(r.span(), "unexpected receiver")),
        })
        .collect::<syn::Result<_>>()?;

    let (request, cancellable) = match typed.as_slice() {
        [request] => (*request, false),
        [request, _cancel] => (*request, true),
        _ => {
            return Err(syn::Error::new(
                sig.inputs.span(),
                "handler methods take the request and optionally a cancellation token",
            ));
        }
    };
    if let Type::Reference(r) = request {
        return Err(syn::Error::new(r.span(), "the request must be taken by value"));
    }

    let output = match &sig.output {
        ReturnType::Default => Output::Nothing,
        ReturnType::Type(_, ty) if is_result(ty) => Output::Fallible,
        ReturnType::Type(..) => Output::Value,
    };

    Ok(HandleMethod {
        name: &sig.ident,
        request,
        asynchronous: sig.asyncness.is_some(),
        cancellable,
        output,
    })
}

fn is_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident.to_string().ends_with("Result")),
        Type::Group(group) => is_result(&group.elem),
        Type::Paren(paren) => is_result(&paren.elem),
        _ => false,
    }
}

// ============================================================================
// Code generation
// ============================================================================

fn builder_call(method: &HandleMethod<'_>) -> TokenStream {
    let name = method.name;
    let request = method.request;

    let args = if method.cancellable {
        quote!(__request, __cancel)
    } else {
        quote!(__request)
    };
    let call = if method.asynchronous {
        quote!(__handler.#name(#args).await)
    } else {
        quote!(__handler.#name(#args))
    };
    let body = match method.output {
        Output::Fallible => call,
        Output::Value => quote! {
            ::core::result::Result::Ok::<_, ::courier::BoxError>(#call)
        },
        Output::Nothing => quote! {{
            #call;
            ::core::result::Result::Ok::<(), ::courier::BoxError>(())
        }},
    };

    match (method.asynchronous, method.cancellable) {
        (false, false) => quote! {
            .sync(|__handler: &Self, __request: #request| #body)
        },
        (false, true) => quote! {
            .sync_cancellable(
                |__handler: &Self, __request: #request, __cancel: &::courier::CancellationToken| {
                    #body
                }
            )
        },
        (true, false) => quote! {
            .future(|__handler: ::std::sync::Arc<Self>, __request: #request| async move {
                #body
            })
        },
        (true, true) => quote! {
            .future_cancellable(
                |__handler: ::std::sync::Arc<Self>,
                 __request: #request,
                 __cancel: ::courier::CancellationToken| async move { #body }
            )
        },
    }
}

fn static_name(self_ty: &Type) -> syn::Result<syn::Ident> {
    let Type::Path(path) = self_ty else {
        return Err(syn::Error::new(
            self_ty.span(),
            "#[handlers] needs a named handler type",
        ));
    };
    let Some(last) = path.path.segments.last() else {
        return Err(syn::Error::new(self_ty.span(), "empty type path"));
    };
    let upper = last.ident.to_string().to_uppercase();
    Ok(format_ident!("__COURIER_HANDLER_{}", upper, span = Span::call_site()))
}

// ============================================================================
// Entry point
// ============================================================================

pub fn expand(attr: TokenStream, mut item: ItemImpl) -> syn::Result<TokenStream> {
    let options = parse_options(attr)?;

    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[handlers] goes on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(
            item.generics.span(),
            "generic handler types are not supported",
        ));
    }

    let mut calls = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let marked = method.attrs.iter().any(|a| a.path().is_ident("handle"));
        method.attrs.retain(|a| !a.path().is_ident("handle"));
        if !marked && method.sig.ident != "handle" {
            continue;
        }
        calls.push(builder_call(&analyze(&method.sig)?));
    }
    if calls.is_empty() {
        return Err(syn::Error::new(
            item.self_ty.span(),
            "#[handlers] found no `handle` method (name one `handle` or mark it `#[handle]`)",
        ));
    }

    let self_ty = &item.self_ty;
    let factory = options.default.then(|| quote!(.with_default()));
    let link = if options.unlinked {
        None
    } else {
        let name = static_name(self_ty)?;
        Some(quote! {
            #[::courier::linkme::distributed_slice(::courier::HANDLERS)]
            #[linkme(crate = ::courier::linkme)]
            static #name: fn() -> ::courier::HandlerDescriptor =
                <#self_ty as ::courier::DescribeHandler>::describe;
        })
    };

    Ok(quote! {
        #item

        impl ::courier::DescribeHandler for #self_ty {
            fn describe() -> ::courier::HandlerDescriptor {
                ::courier::HandlerDescriptor::builder::<Self>()
                    .module_path(::core::module_path!())
                    #factory
                    #(#calls)*
                    .build()
            }
        }

        #link
    })
}
