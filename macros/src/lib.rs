extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Fields, Ident, ItemEnum, Variant, parse_macro_input};

fn wildcard_pattern(prefix: &TokenStream2, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    match variant.fields {
        Fields::Unit => quote! { #prefix::#ident },
        Fields::Unnamed(_) => quote! { #prefix::#ident(..) },
        Fields::Named(_) => quote! { #prefix::#ident { .. } },
    }
}

/// Derives `fn mnemonic(&self) -> &'static str`, the lowercased variant name.
#[proc_macro_derive(Mnemonic)]
pub fn mnemonic_derive(input: TokenStream) -> TokenStream {
    let enum_ = parse_macro_input!(input as ItemEnum);
    let ident = &enum_.ident;
    let (impl_generics, ty_generics, where_clause) = enum_.generics.split_for_impl();

    let mut branches = quote! {};
    for variant in &enum_.variants {
        let pattern = wildcard_pattern(&quote! { Self }, variant);
        let mnemonic = variant.ident.to_string().to_lowercase();
        branches.extend(quote! { #pattern => #mnemonic, });
    }

    quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    #branches
                }
            }
        }
    }
    .into()
}

#[proc_macro_derive(EnumKind, attributes(enum_kind))]
pub fn enumkind_derive(input: TokenStream) -> TokenStream {
    let enum_ = parse_macro_input!(input as ItemEnum);

    let enum_ident = &enum_.ident;
    let meta = enum_
        .attrs
        .iter()
        .find(|attr| attr.meta.path().is_ident("enum_kind"))
        .expect("Expected #[enum_kind(Name)] attribute");
    let new_ident: Ident = meta.parse_args().expect("Expected a single kind name");
    let (impl_generics, ty_generics, where_clause) = enum_.generics.split_for_impl();

    let vis = &enum_.vis;
    let mut new_variants = quote! {};
    let mut from_branches = quote! {};
    for variant in &enum_.variants {
        let ident = &variant.ident;
        new_variants.extend(quote! { #ident, });
        let pattern = wildcard_pattern(&quote! { #enum_ident }, variant);
        from_branches.extend(quote! { #pattern => #new_ident::#ident, });
    }

    quote! {
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        #vis enum #new_ident {
            #new_variants
        }

        impl #impl_generics From<#enum_ident #ty_generics> for #new_ident #where_clause {
            fn from(from: #enum_ident #ty_generics) -> #new_ident {
                match from {
                    #from_branches
                }
            }
        }
    }
    .into()
}
