//! Procedural macros for the docgate project.
//!
//! This crate provides compile-time code generation for docgate, currently the
//! `#[derive(Schema)]` macro that turns a record struct into a schema descriptor.

#[allow(unused_extern_crates)]
extern crate self as docgate_macros;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, LitStr, ext::IdentExt, meta::ParseNestedMeta, parse_macro_input};

/// Derives `docgate_core::schema::Schema` for a struct with named fields.
///
/// The collection name comes from `#[schema(collection = "...")]`. Field names are
/// listed in declaration order under their serialized names: a field's own
/// `#[serde(rename = "...")]` wins, otherwise the struct's `#[serde(rename_all = "...")]`
/// applies. Where serialize and deserialize names differ, the serialize name is used.
/// Fields marked `#[serde(skip)]`, `#[serde(skip_serializing)]` or `#[schema(skip)]`
/// are left out.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Schema)]
/// #[schema(collection = "products")]
/// #[serde(rename_all = "camelCase")]
/// pub struct Product {
///     pub _id: String,
///     pub name: String,
///     #[serde(rename = "unitPrice")]
///     pub price: f64,
/// }
/// ```
#[proc_macro_derive(Schema, attributes(schema, serde))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_schema(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand_schema(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let collection = collection_name(input)?;
    let rename_all = rename_rule(input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new_spanned(
                    ident,
                    "Schema can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                ident,
                "Schema can only be derived for structs",
            ));
        }
    };

    let mut names = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_ident) = &field.ident else {
            continue;
        };

        let mut name = None;
        let mut skip = false;

        for attr in &field.attrs {
            if attr.path().is_ident("serde") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        name = serialize_name(&meta)?.map(|lit| lit.value());
                    } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                        skip = true;
                    } else {
                        skip_meta(&meta)?;
                    }
                    Ok(())
                })?;
            } else if attr.path().is_ident("schema") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("skip") {
                        skip = true;
                        Ok(())
                    } else {
                        Err(meta.error("unsupported schema field attribute"))
                    }
                })?;
            }
        }

        if !skip {
            let name = name.unwrap_or_else(|| rename_all.apply(&field_ident.unraw().to_string()));
            names.push(LitStr::new(&name, Span::call_site()));
        }
    }

    Ok(quote! {
        impl #impl_generics ::docgate_core::schema::Schema for #ident #ty_generics #where_clause {
            fn collection_name() -> &'static str {
                #collection
            }

            fn fields() -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    })
}

fn collection_name(input: &DeriveInput) -> syn::Result<LitStr> {
    let mut collection = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("unsupported schema attribute"))
            }
        })?;
    }

    collection.ok_or_else(|| {
        Error::new_spanned(
            &input.ident,
            "missing #[schema(collection = \"...\")] attribute",
        )
    })
}

/// Reads the struct-level `#[serde(rename_all = "...")]` rule.
fn rename_rule(input: &DeriveInput) -> syn::Result<RenameRule> {
    let mut rule = RenameRule::None;

    for attr in &input.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Some(lit) = serialize_name(&meta)? {
                    rule = RenameRule::parse(&lit)?;
                }
            } else {
                skip_meta(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(rule)
}

/// Reads `key = "..."` or `key(serialize = "...", deserialize = "...")`, returning
/// the serialize-side name if one is given.
fn serialize_name(meta: &ParseNestedMeta) -> syn::Result<Option<LitStr>> {
    if meta.input.peek(syn::Token![=]) {
        return Ok(Some(meta.value()?.parse::<LitStr>()?));
    }

    let mut name = None;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("serialize") {
            name = Some(nested.value()?.parse::<LitStr>()?);
        } else if nested.path.is_ident("deserialize") {
            nested.value()?.parse::<LitStr>()?;
        } else {
            return Err(nested.error("expected `serialize` or `deserialize`"));
        }
        Ok(())
    })?;

    Ok(name)
}

/// Consumes a serde attribute this derive does not interpret.
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_meta(&nested))?;
    }
    Ok(())
}

/// The case conversions serde accepts for `rename_all`, applied to snake_case field names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenameRule {
    None,
    LowerCase,
    UpperCase,
    PascalCase,
    CamelCase,
    SnakeCase,
    ScreamingSnakeCase,
    KebabCase,
    ScreamingKebabCase,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "lowercase" => Ok(RenameRule::LowerCase),
            "UPPERCASE" => Ok(RenameRule::UpperCase),
            "PascalCase" => Ok(RenameRule::PascalCase),
            "camelCase" => Ok(RenameRule::CamelCase),
            "snake_case" => Ok(RenameRule::SnakeCase),
            "SCREAMING_SNAKE_CASE" => Ok(RenameRule::ScreamingSnakeCase),
            "kebab-case" => Ok(RenameRule::KebabCase),
            "SCREAMING-KEBAB-CASE" => Ok(RenameRule::ScreamingKebabCase),
            other => Err(Error::new_spanned(
                lit,
                format!("unknown rename_all rule `{other}`"),
            )),
        }
    }

    fn apply(self, field: &str) -> String {
        match self {
            RenameRule::None | RenameRule::SnakeCase => field.to_string(),
            RenameRule::LowerCase => field.to_ascii_lowercase(),
            RenameRule::UpperCase | RenameRule::ScreamingSnakeCase => field.to_ascii_uppercase(),
            RenameRule::PascalCase => pascal_case(field),
            RenameRule::CamelCase => {
                let pascal = pascal_case(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            RenameRule::KebabCase => field.replace('_', "-"),
            RenameRule::ScreamingKebabCase => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

fn pascal_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut capitalize = true;

    for c in field.chars() {
        if c == '_' {
            capitalize = true;
        } else if capitalize {
            out.push(c.to_ascii_uppercase());
            capitalize = false;
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_rules_follow_serde_conventions() {
        let cases = [
            ("lowercase", "unit_price"),
            ("UPPERCASE", "UNIT_PRICE"),
            ("PascalCase", "UnitPrice"),
            ("camelCase", "unitPrice"),
            ("snake_case", "unit_price"),
            ("SCREAMING_SNAKE_CASE", "UNIT_PRICE"),
            ("kebab-case", "unit-price"),
            ("SCREAMING-KEBAB-CASE", "UNIT-PRICE"),
        ];

        for (rule, expected) in cases {
            let rule = RenameRule::parse(&LitStr::new(rule, Span::call_site())).unwrap();
            assert_eq!(rule.apply("unit_price"), expected);
        }
    }

    #[test]
    fn leading_underscores_convert_like_serde() {
        assert_eq!(RenameRule::PascalCase.apply("_id"), "Id");
        assert_eq!(RenameRule::CamelCase.apply("_id"), "id");
        assert_eq!(RenameRule::KebabCase.apply("_id"), "-id");
    }

    #[test]
    fn unknown_rename_rules_are_rejected() {
        let input: DeriveInput = syn::parse_quote! {
            #[schema(collection = "things")]
            #[serde(rename_all = "Title Case")]
            struct Thing { name: String }
        };

        let err = expand_schema(&input).unwrap_err();
        assert!(err.to_string().contains("unknown rename_all rule"));
    }
}
