use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use std::collections::BTreeMap;
use syn::{
    Data, DeriveInput, Error as SynError, Fields, Generics, Ident, LitInt, LitStr,
    Result as SynResult,
    parse::{Parse, ParseStream},
    parse_macro_input, parse_quote,
};

struct CodeAttr {
    value: u32,
}

impl Parse for CodeAttr {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let lit: LitInt = input.parse()?;
        Ok(Self {
            value: lit.base10_parse()?,
        })
    }
}

struct VariantInfo {
    ident: Ident,
    fields: Fields,
    code: Option<u32>,
}

struct EnumInput {
    ident: Ident,
    generics: Generics,
    variants: Vec<VariantInfo>,
}

impl Parse for EnumInput {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let di: DeriveInput = input.parse()?;
        let ident = di.ident;
        let generics = di.generics;
        let data = match di.data {
            Data::Enum(e) => e,
            _ => {
                return Err(SynError::new(
                    Span::call_site(),
                    "InviteeBusinessError can only be derived for enums",
                ));
            }
        };
        let mut seen: BTreeMap<u32, Ident> = BTreeMap::new();
        let mut variants = Vec::new();
        for v in data.variants {
            let code = v
                .attrs
                .iter()
                .find(|a| a.path().is_ident("code"))
                .map(|a| a.parse_args::<CodeAttr>())
                .transpose()?
                .map(|c| c.value);
            if let Some(prev) = code.and_then(|c| seen.insert(c, v.ident.clone())) {
                return Err(SynError::new(
                    v.ident.span(),
                    format!(
                        "business code {} is already used by `{prev}`",
                        code.unwrap_or_default()
                    ),
                ));
            }
            variants.push(VariantInfo {
                ident: v.ident,
                fields: v.fields,
                code,
            });
        }
        Ok(Self {
            ident,
            generics,
            variants,
        })
    }
}

/// Implements `crate::errors::InviteeBusinessErrCode` for an error enum.
///
/// Variants annotated with `#[code(N)]` report `Some(N)`, the rest report `None`.
/// Every code also emits a zero-sized exported symbol, so reusing a code anywhere in the
/// final binary fails at link time.
#[proc_macro_derive(InviteeBusinessError, attributes(code))]
pub fn derive_invitee_err_code(input: TokenStream) -> TokenStream {
    let EnumInput {
        ident,
        generics,
        variants,
    } = parse_macro_input!(input as EnumInput);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut some_arms = Vec::new();
    let mut guards = Vec::new();

    for v in variants.iter() {
        if let Some(code) = v.code {
            let v_ident = &v.ident;
            let pat = match &v.fields {
                Fields::Unit => quote!(Self::#v_ident),
                Fields::Unnamed(_) => quote!(Self::#v_ident(..)),
                Fields::Named(_) => quote!(Self::#v_ident { .. }),
            };
            some_arms.push(quote!(#pat => Some(#code),));
            let guard_ident =
                format_ident!("__INVITEE_ERR_CODE_GUARD__{}_{}_{}", ident, v_ident, code);
            let guard_export_name =
                LitStr::new(&format!("__invitee_err_code__{}", code), Span::call_site());
            guards.push(quote! {
                #[doc(hidden)]
                #[used]
                #[allow(non_upper_case_globals)]
                #[unsafe(export_name = #guard_export_name)]
                #[cfg_attr(target_vendor = "apple", unsafe(link_section = "__DATA,.inv_err_code"))]
                #[cfg_attr(not(target_vendor = "apple"), unsafe(link_section = ".invitee_err_code"))]
                static #guard_ident: [u8; 0] = [];
            });
        }
    }

    let biz_trait: syn::Path = parse_quote!(crate::errors::InviteeBusinessErrCode);
    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics #biz_trait for #ident #ty_generics #where_clause {
            fn code(&self) -> Option<u32> {
                match self {
                    #(#some_arms)*
                    _ => None
                }
            }
        }
        #(#guards)*
    };
    TokenStream::from(expanded)
}
