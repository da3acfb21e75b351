//! Attribute parsing for the Entity derive macro.
//!
//! Handles struct-level and field-level `#[dao(...)]` attributes.

use syn::{DeriveInput, Result};

/// Struct-level settings.
pub(super) struct EntityAttr {
    pub table: String,
    pub unique: Vec<Vec<String>>,
}

/// Field-level settings.
#[derive(Default)]
pub(super) struct FieldAttr {
    pub is_id: bool,
    pub column: Option<String>,
    pub unique: bool,
    pub default: Option<syn::Lit>,
    pub default_now: bool,
    pub on_update_now: bool,
    pub soft_delete: bool,
    pub skip: bool,
}

pub(super) fn parse_entity_attr(input: &DeriveInput) -> Result<EntityAttr> {
    let mut table = None;
    let mut unique = Vec::new();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("dao")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: syn::LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("unique") {
                let mut columns = Vec::new();
                meta.parse_nested_meta(|column| {
                    let ident = column.path.require_ident()?;
                    columns.push(ident.to_string());
                    Ok(())
                })?;
                if columns.is_empty() {
                    return Err(meta.error("unique(...) needs at least one column"));
                }
                unique.push(columns);
                Ok(())
            } else {
                Err(meta.error("unknown dao attribute; expected `table` or `unique(...)`"))
            }
        })?;
    }

    let table = table.ok_or_else(|| {
        syn::Error::new_spanned(
            &input.ident,
            "Entity requires #[dao(table = \"table_name\")] attribute",
        )
    })?;
    Ok(EntityAttr { table, unique })
}

pub(super) fn parse_field_attr(field: &syn::Field) -> Result<FieldAttr> {
    let mut out = FieldAttr::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("dao")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("id") {
                out.is_id = true;
            } else if path.is_ident("column") {
                let value: syn::LitStr = meta.value()?.parse()?;
                out.column = Some(value.value());
            } else if path.is_ident("unique") {
                out.unique = true;
            } else if path.is_ident("default") {
                out.default = Some(meta.value()?.parse()?);
            } else if path.is_ident("default_now") {
                out.default_now = true;
            } else if path.is_ident("on_update_now") {
                out.on_update_now = true;
            } else if path.is_ident("soft_delete") {
                out.soft_delete = true;
            } else if path.is_ident("skip") {
                out.skip = true;
            } else {
                return Err(meta.error("unknown dao field attribute"));
            }
            Ok(())
        })?;
    }

    if out.default.is_some() && out.default_now {
        return Err(syn::Error::new_spanned(
            field,
            "`default` and `default_now` are mutually exclusive",
        ));
    }
    if out.skip && (out.is_id || out.column.is_some() || out.soft_delete) {
        return Err(syn::Error::new_spanned(
            field,
            "a skipped field cannot carry column attributes",
        ));
    }
    Ok(out)
}
