#![forbid(unsafe_code)]

//! Video catalog API: filtered, cursor-paginated listing and CRUD over video
//! metadata documents, plus per-field keyword match counts.
//!
//! The query logic (`query`, `pager`, `counts`, `mutate`) is written against
//! the [`store::DocumentStore`] trait; `store` provides the SQLite
//! implementation and `api` the axum router the server binary mounts.

pub mod api;
pub mod config;
pub mod counts;
pub mod error;
pub mod fields;
pub mod mutate;
pub mod pager;
pub mod query;
pub mod record;
pub mod security;
pub mod store;
