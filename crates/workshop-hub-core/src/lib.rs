//! # Workshop Hub Core
//!
//! Runtime-free logic shared by the Workshop Hub binary: data models, page
//! chunking, manual classification, the bounded offline cache store, the
//! request strategy table, and the [`store::ManualStore`] abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.

pub mod cache;
pub mod chunk;
pub mod classify;
pub mod models;
pub mod route;
pub mod store;
