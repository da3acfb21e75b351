//! Entity derive macro implementation

mod attrs;

use attrs::{FieldAttr, parse_entity_attr, parse_field_attr};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

struct PersistedField<'a> {
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
    column: String,
    attr: FieldAttr,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ));
        }
    };

    let entity_attr = parse_entity_attr(&input)?;
    let table = &entity_attr.table;

    let mut persisted = Vec::new();
    let mut skipped = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attr = parse_field_attr(field)?;
        if attr.skip {
            skipped.push(ident.to_string());
            continue;
        }
        persisted.push(PersistedField {
            ident,
            ty: &field.ty,
            column: attr.column.clone().unwrap_or_else(|| ident.to_string()),
            attr,
        });
    }

    let pk = primary_key(&input, &persisted)?;
    let pk_column = &pk.column;
    let pk_ident = pk.ident;

    let column_defs = persisted.iter().map(|f| {
        let ty = f.ty;
        let column = &f.column;
        let mut modifiers = TokenStream::new();
        if let Some(lit) = &f.attr.default {
            modifiers.extend(quote! { .default_value(#lit) });
        }
        if f.attr.default_now {
            modifiers.extend(quote! { .default_now() });
        }
        if f.attr.on_update_now {
            modifiers.extend(quote! { .on_update_now() });
        }
        quote! { .column(::pgdao::ColumnDef::of::<#ty>(#column) #modifiers) }
    });

    let struct_unique = entity_attr.unique.iter().map(|columns| {
        quote! { .unique([#(#columns),*]) }
    });
    let field_unique = persisted.iter().filter(|f| f.attr.unique).map(|f| {
        let column = &f.column;
        quote! { .unique([#column]) }
    });
    let soft_delete = persisted.iter().filter(|f| f.attr.soft_delete).map(|f| {
        let column = &f.column;
        quote! { .soft_delete(#column) }
    });

    let field_count = persisted.len();
    let to_record = persisted.iter().map(|f| {
        let ident = f.ident;
        let column = &f.column;
        quote! {
            record.set(#column, ::pgdao::ColumnValue::to_value(&self.#ident));
        }
    });
    let from_record = persisted.iter().map(|f| {
        let ident = f.ident;
        let ty = f.ty;
        let column = &f.column;
        quote! {
            #column => {
                out.#ident = <#ty as ::pgdao::ColumnValue>::from_value(value)
                    .map_err(|message| ::pgdao::OrmError::decode(#column, message))?;
            }
        }
    });

    Ok(quote! {
        impl ::pgdao::Entity for #name {
            fn descriptor() -> ::pgdao::OrmResult<&'static ::pgdao::EntityDescriptor> {
                static DESCRIPTOR: ::pgdao::DescriptorCell = ::pgdao::DescriptorCell::new();
                DESCRIPTOR.get_or_build(|| {
                    ::pgdao::EntityDescriptor::builder(#table)
                        #(#column_defs)*
                        .primary_key(#pk_column)
                        #(#struct_unique)*
                        #(#field_unique)*
                        #(#soft_delete)*
                        #(.exclude(#skipped))*
                        .build()
                })
            }

            fn to_record(&self) -> ::pgdao::Record {
                let mut record = ::pgdao::Record::with_capacity(#field_count);
                #(#to_record)*
                record
            }

            fn from_record(record: ::pgdao::Record) -> ::pgdao::OrmResult<Self> {
                let mut out = <Self as ::core::default::Default>::default();
                for (column, value) in record {
                    match column.as_str() {
                        #(#from_record)*
                        _ => {}
                    }
                }
                Ok(out)
            }

            fn primary_key_value(&self) -> ::pgdao::Value {
                ::pgdao::ColumnValue::to_value(&self.#pk_ident)
            }
        }
    })
}

/// The `#[dao(id)]` field, else the field named `id`.
fn primary_key<'f, 'a>(input: &DeriveInput, fields: &'f [PersistedField<'a>]) -> Result<&'f PersistedField<'a>> {
    let marked: Vec<_> = fields.iter().filter(|f| f.attr.is_id).collect();
    match marked.as_slice() {
        [pk] => Ok(pk),
        [] => fields.iter().find(|f| f.ident == "id").ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "Entity requires a #[dao(id)] field or a field named `id`",
            )
        }),
        [_, second, ..] => Err(syn::Error::new_spanned(
            second.ident,
            "only one field can be marked #[dao(id)]",
        )),
    }
}
