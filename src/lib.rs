//! # Workshop Hub
//!
//! Backend for a vehicle owners' community hub. Two subsystems live here:
//!
//! - **Manual ingestion**: PDF manuals are pulled from object storage,
//!   split into page-bounded chunks at sentence boundaries, classified, and
//!   persisted to SQLite with a per-manual status record.
//! - **Offline cache worker**: a caching layer in front of the hub's web
//!   origin that serves API calls network-first and static assets
//!   cache-first, with a bounded dynamic cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────┐
//! │ ObjectStore  │──▶│  ManualProcessor    │──▶│  SQLite   │
//! │  FS / S3     │   │ extract+chunk+tag   │   │ FTS5      │
//! └──────────────┘   └────────────────────┘   └────┬─────┘
//!                                                  │
//!                      ┌───────────────────────────┤
//!                      ▼                           ▼
//!                 ┌──────────┐              ┌─────────────┐
//!                 │   CLI    │              │ HTTP server │──▶ OfflineWorker ──▶ origin
//!                 │ (wshub)  │              │   (axum)    │
//!                 └──────────┘              └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wshub init                         # create database
//! wshub process G609-Service.pdf     # ingest one manual
//! wshub process-all --unprocessed    # ingest everything new
//! wshub status
//! wshub search "portal axle oil"
//! wshub serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite manual store |
//! | [`object_store`] | Manual storage trait and filesystem backend |
//! | [`s3`] | S3 backend |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`ingest`] | Manual processing pipeline |
//! | [`batch`] | Batch processing |
//! | [`offline`] | Offline cache worker |
//! | [`server`] | HTTP server |

pub mod app;
pub mod batch;
pub mod commands;
pub mod config;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod object_store;
pub mod offline;
pub mod s3;
pub mod server;
pub mod sqlite_store;
