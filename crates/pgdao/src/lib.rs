//! # pgdao
//!
//! A descriptor-driven data-access layer for PostgreSQL.
//!
//! ## Features
//!
//! - **Descriptors**: every entity type declares its table, columns, primary key,
//!   unique constraints and defaults once, through `#[derive(Entity)]` or the
//!   [`EntityDescriptor`] builder
//! - **Filters**: positional predicates (`col("size").gt(10)`) and keyword
//!   filters (`.kw("status", "A")`); null keywords are skipped
//! - **Generic CRUD**: [`Dao<E>`] gives insert, batch insert, upsert, sparse
//!   update, select, count, exists, paging and delete for any entity
//! - **Units of work**: each operation checks out a pooled connection, runs in
//!   one transaction and commits or rolls back; [`transaction!`] groups several
//! - **Deadlines**: optional per-store or per-DAO time limits with server-side cancel
//!
//! ```ignore
//! use pgdao::{col, Dao, Entity, Filters, OrderBy, PageRequest, Select, Store, StoreConfig};
//!
//! #[derive(Debug, Default, Entity)]
//! #[dao(table = "files", unique(path))]
//! struct File {
//!     #[dao(id)]
//!     id: Option<i64>,
//!     path: Option<String>,
//!     #[dao(default = "A")]
//!     status: Option<String>,
//!     size: Option<i64>,
//! }
//!
//! let store = Store::new(&StoreConfig::from_env("PGSQL")?)?;
//! let files: Dao<File> = Dao::new(store);
//!
//! let mut file = File { path: Some("/a".into()), size: Some(3), ..Default::default() };
//! let id = files.insert(&mut file).await?;
//!
//! let page = files
//!     .page(
//!         Select::new()
//!             .filter(Filters::new().and(col("size").gt(0)).kw("status", "A"))
//!             .order_by(OrderBy::column("id")),
//!         PageRequest::new(1, 20),
//!     )
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod dao;
pub mod entity;
pub mod error;
pub mod filter;
pub mod ident;
pub mod mutation;
pub mod page;
pub mod pool;
pub mod query;
pub mod record;
pub mod session;
pub mod sql;
pub mod value;

pub use client::GenericClient;
pub use config::StoreConfig;
pub use dao::{Dao, Scoped};
pub use entity::{ColumnDef, ColumnDefault, DescriptorCell, Entity, EntityDescriptor, EntityDescriptorBuilder, describe};
pub use error::{OrmError, OrmResult};
pub use filter::{Column, Filters, Keyword, Op, Predicate, build_filters, col};
pub use ident::Ident;
pub use mutation::UpsertOptions;
pub use page::{Page, PageRequest, PageWindow};
pub use pool::Store;
pub use query::{ComposedQuery, OrderBy, Ordered, Projection, Select, compose};
pub use record::Record;
pub use session::Session;
pub use sql::Sql;
pub use value::{ColumnType, ColumnValue, Value};

#[cfg(feature = "derive")]
pub use pgdao_derive::Entity;
