//! Offline-first caching in front of the hub's web origin.

pub mod fetch;
pub mod message;
pub mod worker;

pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use message::{ControlMessage, MessageReply};
pub use worker::{Handled, OfflineWorker, WorkerState, OFFLINE_MESSAGE};
