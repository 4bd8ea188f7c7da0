//! `#[subscriber]` implementation.
//!
//! Scans an inherent impl block for methods marked
//! `#[subscribe(code = …, scheduler = …)]`, strips the markers, and emits an
//! `impl Subscriber` that declares each marked method.
//!
//! | Receiver | Declared as |
//! |----------|-------------|
//! | `&self` | instance handler (`Subscriptions::method`) |
//! | none | static handler (`Subscriptions::function`) |
//! | anything else | compile error |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Expr, FnArg, ImplItem, ImplItemFn, ItemImpl, Path, Receiver, spanned::Spanned,
};

/// Arguments of the outer `#[subscriber(…)]` attribute.
pub struct SubscriberArgs {
    krate: Path,
}

impl Default for SubscriberArgs {
    fn default() -> Self {
        Self {
            krate: syn::parse_quote!(::codebus_core),
        }
    }
}

impl SubscriberArgs {
    pub fn parse(attr: TokenStream) -> syn::Result<Self> {
        let mut args = Self::default();
        if attr.is_empty() {
            return Ok(args);
        }
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("crate") {
                args.krate = meta.value()?.parse::<syn::LitStr>()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported #[subscriber] argument, expected `crate = \"…\"`"))
            }
        });
        syn::parse::Parser::parse2(parser, attr)?;
        Ok(args)
    }
}

/// One `#[subscribe(…)]` marker.
struct Marker {
    code: Expr,
    scheduler: Expr,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn expand(args: SubscriberArgs, mut item: ItemImpl) -> syn::Result<TokenStream> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[subscriber] goes on an inherent impl block, not a trait impl",
        ));
    }

    let krate = &args.krate;
    let mut declarations = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let Some(marker) = take_marker(method)? else {
            continue;
        };
        declarations.push(declaration(method, &marker)?);
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        #item

        impl #impl_generics #krate::Subscriber for #self_ty #where_clause {
            fn subscriptions(subs: &mut #krate::Subscriptions<Self>) {
                #(#declarations)*
            }
        }
    })
}

// ============================================================================
// Marker parsing
// ============================================================================

/// Removes the `#[subscribe]` attribute from `method` and parses it.
fn take_marker(method: &mut ImplItemFn) -> syn::Result<Option<Marker>> {
    let Some(index) = method
        .attrs
        .iter()
        .position(|a| a.path().is_ident("subscribe"))
    else {
        return Ok(None);
    };
    let attr = method.attrs.remove(index);

    if method.attrs.iter().any(|a| a.path().is_ident("subscribe")) {
        return Err(syn::Error::new(
            method.sig.ident.span(),
            "a method takes at most one #[subscribe]",
        ));
    }

    let mut code: Option<Expr> = None;
    let mut scheduler: Option<Expr> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("code") {
            code = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("scheduler") {
            scheduler = Some(meta.value()?.parse()?);
        } else {
            return Err(meta.error("expected `code` or `scheduler`"));
        }
        Ok(())
    })?;

    let span = attr.span();
    let code = code.ok_or_else(|| syn::Error::new(span, "#[subscribe] requires `code = …`"))?;
    let scheduler = scheduler
        .ok_or_else(|| syn::Error::new(span, "#[subscribe] requires `scheduler = …`"))?;
    Ok(Some(Marker { code, scheduler }))
}

// ============================================================================
// Code generation
// ============================================================================

fn declaration(method: &ImplItemFn, marker: &Marker) -> syn::Result<TokenStream> {
    let sig = &method.sig;
    if sig.asyncness.is_some() {
        return Err(syn::Error::new(
            sig.asyncness.span(),
            "handlers are synchronous; pick a scheduler instead of `async`",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "handlers cannot be generic",
        ));
    }

    let ident = &sig.ident;
    let name = ident.to_string();
    let Marker { code, scheduler } = marker;

    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => {
            check_receiver(receiver)?;
            Ok(quote! {
                subs.method(#name, #code, #scheduler, Self::#ident);
            })
        }
        _ => Ok(quote! {
            subs.function(#name, #code, #scheduler, Self::#ident);
        }),
    }
}

fn check_receiver(receiver: &Receiver) -> syn::Result<()> {
    if receiver.reference.is_none() || receiver.mutability.is_some() {
        return Err(syn::Error::new(
            receiver.span(),
            "handlers take `&self`; use interior mutability for state",
        ));
    }
    Ok(())
}
