//! Procedural macros for the docrepo project.
//!
//! Provides `#[derive(Entity)]`, which implements `docrepo::entity::Entity` for a struct with
//! named fields.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, Entity)]
//! #[entity(collection = "accounts")]
//! pub struct UserAccount {
//!     #[serde(rename = "_id")]
//!     #[entity(id)]
//!     pub key: StrObjectId,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Lit, LitStr, Meta, MetaNameValue,
    Token, ext::IdentExt, parse_macro_input, punctuated::Punctuated, spanned::Spanned,
};

/// Derives `docrepo::entity::Entity`.
///
/// The identifier is the field marked `#[entity(id)]`, or else the field named `id` or `_id`.
/// It must be stored as `_id`: unless the field is named `_id`, it needs
/// `#[serde(rename = "_id")]`. The collection name is taken from `#[entity(collection = "...")]` on the struct and
/// defaults to the snake_case form of the struct name.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(Entity)] can only be used on structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(Entity)] requires a struct with named fields",
        ));
    };

    let collection = match parse_struct_options(&input.attrs)? {
        Some(collection) => collection,
        None => to_snake_case(&input.ident.to_string()),
    };
    if collection.is_empty() {
        return Err(syn::Error::new(input.span(), "collection name must not be empty"));
    }

    let id_field = find_id_field(fields.named.iter(), input.span())?;
    check_stored_as_primary_key(id_field)?;
    let id_ident = &id_field.ident;
    let id_type = &id_field.ty;

    let ident = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docrepo::entity::Entity for #ident #type_generics #where_clause {
            type Id = #id_type;

            fn id(&self) -> &Self::Id {
                &self.#id_ident
            }

            fn id_mut(&mut self) -> &mut Self::Id {
                &mut self.#id_ident
            }

            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}

fn parse_struct_options(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut collection = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported entity option, expected `collection = \"...\"`"))
            }
        })?;
    }

    Ok(collection)
}

fn is_marked_id(field: &Field) -> syn::Result<bool> {
    let mut marked = false;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                marked = true;
                Ok(())
            } else {
                Err(meta.error("unsupported entity field option, expected `id`"))
            }
        })?;
    }

    Ok(marked)
}

fn find_id_field<'a>(
    fields: impl Iterator<Item = &'a Field> + Clone,
    span: proc_macro2::Span,
) -> syn::Result<&'a Field> {
    let mut marked = Vec::new();
    for field in fields.clone() {
        if is_marked_id(field)? {
            marked.push(field);
        }
    }

    match marked.as_slice() {
        [field] => return Ok(field),
        [_, second, ..] => {
            return Err(syn::Error::new(
                second.span(),
                "only one field may be marked #[entity(id)]",
            ));
        }
        [] => {}
    }

    fields
        .into_iter()
        .find(|field| {
            field
                .ident
                .as_ref()
                .is_some_and(|ident| ident == "id" || ident == "_id")
        })
        .ok_or_else(|| {
            syn::Error::new(
                span,
                "no identifier field: name it `id` or mark it with #[entity(id)]",
            )
        })
}

fn check_stored_as_primary_key(field: &Field) -> syn::Result<()> {
    let name = field
        .ident
        .as_ref()
        .map(|ident| ident.unraw().to_string())
        .unwrap_or_default();
    let mut serialized = name.clone();
    let mut deserialized = name.clone();

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        for meta in metas {
            match meta {
                Meta::NameValue(rename) if rename.path.is_ident("rename") => {
                    serialized = string_value(&rename.value)?;
                    deserialized = serialized.clone();
                }
                Meta::List(list) if list.path.is_ident("rename") => {
                    let directions = list.parse_args_with(
                        Punctuated::<MetaNameValue, Token![,]>::parse_terminated,
                    )?;
                    for direction in directions {
                        if direction.path.is_ident("serialize") {
                            serialized = string_value(&direction.value)?;
                        } else if direction.path.is_ident("deserialize") {
                            deserialized = string_value(&direction.value)?;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if serialized == "_id" && deserialized == "_id" {
        return Ok(());
    }

    Err(syn::Error::new(
        field.span(),
        format!(
            "identifier field `{name}` must be stored as `_id`, add #[serde(rename = \"_id\")]"
        ),
    ))
}

fn string_value(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit { lit: Lit::Str(value), .. }) => Ok(value.value()),
        other => Err(syn::Error::new(other.span(), "expected a string literal")),
    }
}

/// Converts a type name to snake_case.
///
/// An uppercase letter starts a new word when it follows a lowercase letter or digit, or
/// when it begins a capitalized word after another character, so `HTTPRequest` becomes
/// `http_request` and `UserAccount2Log` becomes `user_account2_log`.
fn to_snake_case(name: &str) -> String {
    let chars = name.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(name.len() + 4);

    for (index, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && index > 0 {
            let prev = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            let after_word = prev.is_lowercase() || prev.is_ascii_digit();
            let starts_word = next_is_lower && prev != '_';

            if after_word || starts_word {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_splits_words() {
        assert_eq!(to_snake_case("User"), "user");
        assert_eq!(to_snake_case("UserAccount"), "user_account");
        assert_eq!(to_snake_case("HTTPRequest"), "http_request");
        assert_eq!(to_snake_case("Account2Log"), "account2_log");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn derive_uses_marked_field_and_collection_option() {
        let input: DeriveInput = syn::parse_quote! {
            #[entity(collection = "accounts")]
            struct Account {
                #[serde(rename = "_id")]
                #[entity(id)]
                key: String,
                id: u32,
            }
        };

        let output = expand_entity(input).unwrap().to_string();
        assert!(output.contains("type Id = String"));
        assert!(output.contains("\"accounts\""));
        assert!(output.contains("self . key"));
    }

    #[test]
    fn derive_falls_back_to_field_named_id() {
        let input: DeriveInput = syn::parse_quote! {
            struct UserProfile {
                #[serde(default, rename = "_id")]
                id: String,
            }
        };

        let output = expand_entity(input).unwrap().to_string();
        assert!(output.contains("\"user_profile\""));
        assert!(output.contains("self . id"));
    }

    #[test]
    fn derive_accepts_field_named_underscore_id() {
        let input: DeriveInput = syn::parse_quote! {
            struct Ticket {
                #[serde(skip_serializing_if = "String::is_empty")]
                _id: String,
            }
        };

        let output = expand_entity(input).unwrap().to_string();
        assert!(output.contains("self . _id"));
    }

    #[test]
    fn derive_rejects_identifier_not_stored_as_primary_key() {
        let unrenamed: DeriveInput = syn::parse_quote! {
            struct Account {
                id: String,
            }
        };
        let err = expand_entity(unrenamed).unwrap_err();
        assert!(err.to_string().contains("must be stored as `_id`"));

        let renamed_elsewhere: DeriveInput = syn::parse_quote! {
            struct Account {
                #[serde(rename = "identifier")]
                _id: String,
            }
        };
        assert!(expand_entity(renamed_elsewhere).is_err());

        let one_way: DeriveInput = syn::parse_quote! {
            struct Account {
                #[serde(rename(serialize = "_id"))]
                id: String,
            }
        };
        assert!(expand_entity(one_way).is_err());

        let both_ways: DeriveInput = syn::parse_quote! {
            struct Account {
                #[serde(rename(serialize = "_id", deserialize = "_id"))]
                id: String,
            }
        };
        assert!(expand_entity(both_ways).is_ok());
    }

    #[test]
    fn derive_rejects_structs_without_identifier() {
        let input: DeriveInput = syn::parse_quote! {
            struct Orphan {
                name: String,
            }
        };

        assert!(expand_entity(input).is_err());
    }
}
