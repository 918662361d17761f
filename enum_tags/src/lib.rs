// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::fmt;

use proc_macro::TokenStream;
use quote::quote;

enum Visibility {
    Public(proc_macro2::Span),
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public(..) => "public",
            Self::Private => "private",
        }
        .fmt(f)
    }
}

impl syn::parse::Parse for Visibility {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let identifier = input.parse::<syn::Ident>()?;
        match identifier.to_string().as_str() {
            "public" => Ok(Self::Public(identifier.span())),
            "private" => Ok(Self::Private),
            _ => Err(syn::Error::new_spanned(
                identifier,
                "Unexpected visibility: expected `public` or `private`",
            )),
        }
    }
}

struct OpTagsArgs {
    visibility: Visibility,
    repr_type: syn::Type,
}

impl syn::parse::Parse for OpTagsArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        mod kw {
            use syn::custom_keyword;

            custom_keyword!(repr);
        }

        let visibility = input.parse()?;

        input.parse::<syn::Token![,]>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing comma after `{}` visibility", visibility),
            ));
            error
        })?;

        input.parse::<kw::repr>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing `repr` after `{},`", visibility),
            ));
            error
        })?;

        let content;
        syn::parenthesized!(content in input);
        let repr_type = content.parse()?;

        Ok(Self {
            visibility,
            repr_type,
        })
    }
}

/// The pattern matching a variant regardless of its fields.
fn variant_pattern(
    variant_name: &syn::Ident,
    fields: &syn::Fields,
) -> proc_macro2::TokenStream {
    match fields {
        syn::Fields::Named(_) => quote! { Self::#variant_name { .. } },
        syn::Fields::Unnamed(_) => quote! { Self::#variant_name(..) },
        syn::Fields::Unit => quote! { Self::#variant_name },
    }
}

fn parse_discriminant(expr: &syn::Expr) -> syn::Result<usize> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(int_literal),
            ..
        }) => int_literal.base10_parse::<usize>(),
        other => Err(syn::Error::new_spanned(
            other,
            "Only literal discriminants are allowed",
        )),
    }
}

fn impl_op_tags(
    enum_visibility: syn::Visibility,
    enum_name: syn::Ident,
    repr_type: syn::Type,
    variants: impl Iterator<Item = syn::Variant>,
) -> proc_macro2::TokenStream {
    let mut tag_idents = vec![];
    let mut tag_cases = vec![];
    let mut mnemonic_cases = vec![];
    let mut discriminant = 0;

    for variant in variants {
        let variant_name = variant.ident;
        let mnemonic = variant_name.to_string().to_ascii_uppercase();
        let tag_ident = quote::format_ident!("{}_TAG", mnemonic);

        if let Some((_, custom_discriminant)) = &variant.discriminant {
            match parse_discriminant(custom_discriminant) {
                Ok(value) => discriminant = value,
                Err(error) => return error.into_compile_error(),
            }
        }

        tag_idents.push(quote! {
            #[doc = concat!("Opcode word for `", #mnemonic, "`.")]
            #enum_visibility const #tag_ident: #repr_type = #discriminant as _;
        });

        let pattern = variant_pattern(&variant_name, &variant.fields);
        tag_cases.push(quote! { #pattern => #discriminant as _ });
        mnemonic_cases.push(quote! { #pattern => #mnemonic });

        discriminant += 1;
    }

    quote! {
        impl #enum_name {
            #(#tag_idents)*

            #[doc = "`#[op_tags]`-generated getter for this variant's opcode word."]
            #enum_visibility const fn tag(&self) -> #repr_type {
                match self {
                    #(#tag_cases),*
                }
            }

            #[doc = "`#[op_tags]`-generated assembler mnemonic for this variant."]
            #enum_visibility const fn mnemonic(&self) -> &'static str {
                match self {
                    #(#mnemonic_cases),*
                }
            }
        }
    }
}

/// Constructs an `impl` for the given `enum` with an opcode constant
/// `<VARIANT>_TAG` for each variant, a `tag()` getter and a `mnemonic()`
/// getter returning the upper-cased variant name.
///
/// Usage examples:
///
/// * `#[op_tags(public, repr(i64))]`
/// * `#[op_tags(private, repr(u8))]`
///
/// Note that the `repr` type can be any numerical type to which a `usize` can
/// be casted to implicitly with the `as` keyword --- it is not the same as the
/// type for which you may `#[repr(...)]` the `enum`.
#[proc_macro_attribute]
pub fn op_tags(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as OpTagsArgs);

    let input_item = syn::parse_macro_input!(input as syn::DeriveInput);
    let input_item_cloned = input_item.clone();

    let data_enum = match input_item.data {
        syn::Data::Enum(data_enum) => data_enum,
        syn::Data::Struct(syn::DataStruct {
            struct_token: syn::token::Struct { span },
            ..
        })
        | syn::Data::Union(syn::DataUnion {
            union_token: syn::token::Union { span },
            ..
        }) => {
            return syn::Error::new(span, "Item must be an `enum`")
                .into_compile_error()
                .into();
        }
    };

    let visibility = match args.visibility {
        Visibility::Public(span) => {
            syn::Visibility::Public(syn::token::Pub { span })
        }
        Visibility::Private => syn::Visibility::Inherited,
    };

    let tags_impl = impl_op_tags(
        visibility,
        input_item.ident,
        args.repr_type,
        data_enum.variants.into_iter(),
    );

    quote! {
        #input_item_cloned

        #tags_impl
    }
    .into()
}
