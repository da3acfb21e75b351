//! Derive macros for pgdao
//!
//! Provides `#[derive(Entity)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod entity;

/// Derive `pgdao::Entity` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use pgdao::Entity;
///
/// #[derive(Debug, Default, Entity)]
/// #[dao(table = "public.files", unique(bucket, path))]
/// struct File {
///     #[dao(id)]
///     id: Option<i64>,
///     bucket: Option<String>,
///     path: Option<String>,
///     #[dao(default = "A")]
///     status: Option<String>,
///     #[dao(column = "created_at", default_now)]
///     created: Option<chrono::DateTime<chrono::Utc>>,
///     #[dao(default_now, on_update_now)]
///     updated_at: Option<chrono::DateTime<chrono::Utc>>,
///     #[dao(soft_delete, default = false)]
///     is_delete: Option<bool>,
///     #[dao(skip)]
///     cached_url: Option<String>,
/// }
/// ```
///
/// # Attributes
///
/// Struct level:
/// - `#[dao(table = "name")]` - table, optionally schema-qualified (required)
/// - `#[dao(unique(a, b))]` - composite unique constraint over column names
///
/// Field level:
/// - `#[dao(id)]` - primary key (defaults to a field named `id`)
/// - `#[dao(column = "name")]` - map the field to a different column
/// - `#[dao(unique)]` - single-column unique constraint
/// - `#[dao(default = <literal>)]` - value inserted when the field is `None`
/// - `#[dao(default_now)]` - insert the current time when the field is `None`
/// - `#[dao(on_update_now)]` - refresh with the current time on every update
/// - `#[dao(soft_delete)]` - boolean soft-delete flag
/// - `#[dao(skip)]` - not persisted
///
/// The struct must implement `Default`; columns missing from a fetched row
/// keep their default value.
#[proc_macro_derive(Entity, attributes(dao))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
