#![forbid(unsafe_code)]

//! Derive macros for Taskframe.
//!
//! `#[derive(Owner)]` turns every `#[owned]` field of type
//! `OwnedCollection<Foo>` into a full owner/owned relationship. All names
//! come from the owned type, so a struct owning `Note` gets:
//!
//! | Generated                          | Purpose                              |
//! |------------------------------------|--------------------------------------|
//! | `new_notes(publisher, owner)`      | builds the field's collection        |
//! | `notes()` / `notes_recursive()`    | live items, optionally with children |
//! | `set_notes(items)`                 | diff-based replace, one round        |
//! | `add_note(item)` / `add_notes(..)` | append                               |
//! | `remove_note(&item)` / `remove_notes(&[..])` | remove; empty slice removes all |
//! | `note_added_event_type()`          | `"Task.noteAdded"`                   |
//! | `note_removed_event_type()`        | `"Task.noteRemoved"`                 |
//! | `notes_changed_event_type()`       | `"Task.notesChanged"`                |
//! | `modification_event_types()`       | changed types of every relationship  |
//!
//! Field options:
//!
//! - `#[owned(live = path)]`: `fn(&Foo) -> bool`; items failing it are
//!   treated as deleted by the getters.
//! - `#[owned(children = path)]`: `fn(&Foo) -> Vec<Foo>`; direct children
//!   used by the recursive getter.
//! - `#[owned(name = "Foo")]`: owned type name when the element type is not
//!   a plain path.
//!
//! Generated code refers to `::taskframe_runtime`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    Data, DeriveInput, ExprPath, Field, Fields, GenericArgument, LitStr, PathArguments, Type,
    parse_macro_input,
};

#[proc_macro_derive(Owner, attributes(owned))]
pub fn derive_owner(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// One `#[owned]` field.
struct Relationship {
    field: syn::Ident,
    element: Type,
    owned_name: String,
    live: Option<ExprPath>,
    children: Option<ExprPath>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Owner can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Owner requires named fields",
        ));
    };

    let mut relationships: Vec<Relationship> = Vec::new();
    for field in &fields.named {
        let Some(rel) = relationship(field)? else {
            continue;
        };
        if relationships.iter().any(|r| r.owned_name == rel.owned_name) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                format!("`{}` is owned by more than one field", rel.owned_name),
            ));
        }
        relationships.push(rel);
    }
    if relationships.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Owner needs at least one #[owned] field",
        ));
    }

    let owner = &input.ident;
    let owner_name = owner.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let methods = relationships.iter().map(|r| accessors(&owner_name, r));
    let changed: Vec<_> = relationships
        .iter()
        .map(|r| format_ident!("{}s_changed_event_type", snake_case(&r.owned_name)))
        .collect();

    Ok(quote! {
        impl #impl_generics #owner #ty_generics #where_clause {
            #(#methods)*

            /// Changed event types of every owned relationship.
            #[must_use]
            pub fn modification_event_types() -> ::std::vec::Vec<::taskframe_runtime::taskframe_core::EventType> {
                ::std::vec![#(Self::#changed()),*]
            }
        }
    })
}

fn relationship(field: &Field) -> syn::Result<Option<Relationship>> {
    let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("owned")) else {
        return Ok(None);
    };
    let Some(ident) = field.ident.clone() else {
        return Ok(None);
    };

    let mut name: Option<LitStr> = None;
    let mut live: Option<ExprPath> = None;
    let mut children: Option<ExprPath> = None;
    if !matches!(attr.meta, syn::Meta::Path(_)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("live") {
                live = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("children") {
                children = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("expected `name`, `live` or `children`"));
            }
            Ok(())
        })?;
    }

    let element = element_type(&field.ty)?;
    let owned_name = match name {
        Some(lit) => lit.value(),
        None => type_name(&element).ok_or_else(|| {
            syn::Error::new_spanned(
                &element,
                "cannot name this owned type; add #[owned(name = \"...\")]",
            )
        })?,
    };
    if owned_name.is_empty() {
        return Err(syn::Error::new(Span::call_site(), "owned type name is empty"));
    }

    Ok(Some(Relationship {
        field: ident,
        element,
        owned_name,
        live,
        children,
    }))
}

/// `T` in `OwnedCollection<T>`.
fn element_type(ty: &Type) -> syn::Result<Type> {
    let error = || syn::Error::new_spanned(ty, "#[owned] fields must be OwnedCollection<T>");
    let Type::Path(path) = ty else {
        return Err(error());
    };
    let last = path.path.segments.last().ok_or_else(error)?;
    if last.ident != "OwnedCollection" {
        return Err(error());
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return Err(error());
    };
    match args.args.first() {
        Some(GenericArgument::Type(element)) if args.args.len() == 1 => Ok(element.clone()),
        _ => Err(error()),
    }
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// `CategoryLink` -> `category_link`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

fn accessors(owner_name: &str, rel: &Relationship) -> TokenStream2 {
    let Relationship {
        field,
        element,
        owned_name,
        live,
        children,
    } = rel;
    let one = snake_case(owned_name);
    let many = format!("{one}s");

    let new = format_ident!("new_{}", many);
    let get = format_ident!("{}", many);
    let get_recursive = format_ident!("{}_recursive", many);
    let set = format_ident!("set_{}", many);
    let add_one = format_ident!("add_{}", one);
    let add_many = format_ident!("add_{}", many);
    let remove_one = format_ident!("remove_{}", one);
    let remove_many = format_ident!("remove_{}", many);
    let added = format_ident!("{}_added_event_type", one);
    let removed = format_ident!("{}_removed_event_type", one);
    let changed = format_ident!("{}s_changed_event_type", one);

    let with_live = live.as_ref().map(|p| quote!(.with_liveness(#p)));
    let with_children = children.as_ref().map(|p| quote!(.with_children(#p)));
    let rt = quote!(::taskframe_runtime);
    let types = quote! {
        #rt::reactive::CollectionEventTypes::for_owned(#owner_name, #owned_name)
    };

    quote! {
        #[must_use]
        pub fn #new(
            publisher: &#rt::taskframe_core::Publisher,
            owner: #rt::taskframe_core::SourceId,
        ) -> #rt::reactive::OwnedCollection<#element> {
            #rt::reactive::OwnedCollection::new(publisher, owner, #owner_name, #owned_name)
                #with_live
                #with_children
        }

        /// Owned items that are not deleted.
        #[must_use]
        pub fn #get(&self) -> ::std::vec::Vec<#element> {
            self.#field.items_where_live()
        }

        /// Owned items that are not deleted, followed by their descendants.
        #[must_use]
        pub fn #get_recursive(&self) -> ::std::vec::Vec<#element> {
            self.#field.items_recursive()
        }

        pub fn #set(
            &self,
            items: impl ::std::iter::IntoIterator<Item = #element>,
        ) -> #rt::reactive::Change<#element> {
            self.#field.set(items)
        }

        pub fn #add_one(&self, item: #element) -> bool {
            self.#field.add_one(item)
        }

        pub fn #add_many(
            &self,
            items: impl ::std::iter::IntoIterator<Item = #element>,
        ) -> ::std::vec::Vec<#element> {
            self.#field.add(items)
        }

        pub fn #remove_one(&self, item: &#element) -> bool {
            self.#field.remove_one(item)
        }

        /// Remove `items`; an empty slice removes everything.
        pub fn #remove_many(&self, items: &[#element]) -> ::std::vec::Vec<#element> {
            self.#field.remove(items)
        }

        #[must_use]
        pub fn #added() -> #rt::taskframe_core::EventType {
            #types.added
        }

        #[must_use]
        pub fn #removed() -> #rt::taskframe_core::EventType {
            #types.removed
        }

        #[must_use]
        pub fn #changed() -> #rt::taskframe_core::EventType {
            #types.changed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use syn::parse_quote;

    fn expanded(input: DeriveInput) -> String {
        expand(&input).unwrap().to_string()
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("Note"), "note");
        assert_eq!(snake_case("CategoryLink"), "category_link");
        assert_eq!(snake_case("Effort2Link"), "effort2_link");
        assert_eq!(snake_case("URL"), "url");
    }

    #[test]
    fn names_come_from_owned_type() {
        let out = expanded(parse_quote! {
            struct Task {
                source: SourceId,
                #[owned]
                notes: OwnedCollection<Note>,
                #[owned]
                files: taskframe_runtime::reactive::OwnedCollection<Attachment>,
            }
        });
        for name in [
            "fn new_notes",
            "fn notes",
            "fn notes_recursive",
            "fn set_notes",
            "fn add_note",
            "fn add_notes",
            "fn remove_note",
            "fn remove_notes",
            "fn note_added_event_type",
            "fn note_removed_event_type",
            "fn notes_changed_event_type",
            "fn attachments",
            "fn add_attachment",
            "fn attachments_changed_event_type",
            "fn modification_event_types",
        ] {
            assert!(out.contains(name), "missing {name}");
        }
        assert!(out.contains("self . files . items_where_live ()"));
        assert!(!out.contains("fn files"));
    }

    #[test]
    fn field_options_are_applied() {
        let out = expanded(parse_quote! {
            struct Category {
                #[owned(live = Note::is_live, children = Note::children)]
                notes: OwnedCollection<Note>,
            }
        });
        assert!(out.contains("with_liveness (Note :: is_live)"));
        assert!(out.contains("with_children (Note :: children)"));
    }

    #[test]
    fn explicit_name_overrides_element_type() {
        let out = expanded(parse_quote! {
            struct Task {
                #[owned(name = "Reminder")]
                reminders: OwnedCollection<Box<dyn Fn()>>,
            }
        });
        assert!(out.contains("fn reminder_added_event_type"));
    }

    #[test]
    fn rejects_non_collection_field() {
        let input: DeriveInput = parse_quote! {
            struct Task {
                #[owned]
                notes: Vec<Note>,
            }
        };
        let err = expand(&input).unwrap_err();
        assert!(err.to_string().contains("OwnedCollection<T>"));
    }

    #[test]
    fn rejects_duplicate_owned_type() {
        let input: DeriveInput = parse_quote! {
            struct Task {
                #[owned]
                notes: OwnedCollection<Note>,
                #[owned]
                more_notes: OwnedCollection<Note>,
            }
        };
        let err = expand(&input).unwrap_err();
        assert!(err.to_string().contains("more than one field"));
    }

    #[test]
    fn rejects_struct_without_owned_fields() {
        let input: DeriveInput = parse_quote! {
            struct Task { subject: String }
        };
        assert!(expand(&input).is_err());
    }
}
