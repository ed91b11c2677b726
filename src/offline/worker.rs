//! The offline cache worker.
//!
//! Sits between the hub's pages and the upstream origin. Every intercepted
//! GET is routed through a [`RouteTable`]: API calls are served network-first
//! with the cache as an offline fallback, everything else cache-first with a
//! background refresh. Two caches exist per worker version: a static cache
//! filled at install time and a dynamic cache whose size is capped by
//! `max_dynamic_entries`.
//!
//! Lifecycle:
//!
//! ```text
//! Parsed ──install()──▶ Installed ──activate() / skip_waiting()──▶ Activated
//! ```
//!
//! Background revalidations are tracked in a [`JoinSet`]; [`OfflineWorker::settle`]
//! waits for all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use workshop_hub_core::cache::CacheStorage;
use workshop_hub_core::models::{HttpRequest, HttpResponse, RequestKey};
use workshop_hub_core::route::{CachePolicy, RouteTable, Strategy};

use crate::config::OfflineConfig;

use super::fetch::{FetchError, Fetcher};
use super::message::{ControlMessage, MessageReply};

/// Message carried by synthetic offline API responses.
pub const OFFLINE_MESSAGE: &str =
    "You are currently offline. This data will be synced when you reconnect.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installed,
    Activated,
}

/// Outcome of [`OfflineWorker::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The worker does not intercept this request; send it to the network
    /// untouched.
    PassThrough,
    Response(HttpResponse),
}

struct Shared {
    origin: Url,
    static_name: String,
    dynamic_name: String,
    max_dynamic_entries: usize,
    caches: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl Shared {
    fn put_dynamic(&self, key: RequestKey, response: HttpResponse) {
        let evicted = self
            .caches
            .open(&self.dynamic_name)
            .put_bounded(key, response, self.max_dynamic_entries);
        for key in evicted {
            debug!(key = %key, "evicted from dynamic cache");
        }
    }

    /// Overwrite `key` in the cache it was served from.
    fn refresh(&self, store_name: &str, key: RequestKey, response: HttpResponse) {
        let Some(cache) = self.caches.get(store_name) else {
            debug!(cache = store_name, "cache gone before revalidation finished");
            return;
        };
        if store_name == self.dynamic_name {
            cache.put_bounded(key, response, self.max_dynamic_entries);
        } else {
            cache.put(key, response);
        }
    }
}

pub struct OfflineWorker {
    shared: Arc<Shared>,
    routes: RouteTable,
    policy: CachePolicy,
    offline_page: String,
    static_urls: Vec<String>,
    skip_waiting_on_install: bool,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

impl OfflineWorker {
    pub fn new(config: &OfflineConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::with_cache_storage(config, fetcher, Arc::new(CacheStorage::new()))
    }

    /// Build a worker over existing caches, e.g. ones left by an older
    /// worker version.
    pub fn with_cache_storage(
        config: &OfflineConfig,
        fetcher: Arc<dyn Fetcher>,
        caches: Arc<CacheStorage>,
    ) -> Result<Self> {
        let origin = Url::parse(&config.origin)
            .with_context(|| format!("invalid offline origin '{}'", config.origin))?;

        Ok(Self {
            shared: Arc::new(Shared {
                origin,
                static_name: config.static_cache_name(),
                dynamic_name: config.dynamic_cache_name(),
                max_dynamic_entries: config.max_dynamic_entries,
                caches,
                fetcher,
            }),
            routes: RouteTable::with_api_patterns(&config.api_patterns)?,
            policy: CachePolicy::new(&config.cacheable_patterns)?,
            offline_page: config.offline_page.clone(),
            static_urls: config.static_urls.clone(),
            skip_waiting_on_install: config.skip_waiting_on_install,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.shared.caches
    }

    pub fn static_cache_name(&self) -> &str {
        &self.shared.static_name
    }

    pub fn dynamic_cache_name(&self) -> &str {
        &self.shared.dynamic_name
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Absolute URL for a possibly relative one.
    pub fn resolve(&self, url: &str) -> Option<Url> {
        self.shared.origin.join(url).ok()
    }

    /// `path` and `query` on the configured origin. The host never changes,
    /// even for protocol-relative paths like `//other.host/x`.
    pub fn origin_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.shared.origin.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// Pre-cache the static manifest. Returns how many URLs were cached.
    pub async fn install(&self) -> usize {
        let cache = self.shared.caches.open(&self.shared.static_name);
        let mut cached = 0;

        for url in &self.static_urls {
            let Some(absolute) = self.resolve(url) else {
                warn!(url = %url, "skipping unresolvable static url");
                continue;
            };
            let request = HttpRequest::get(absolute.as_str());
            match self.shared.fetcher.fetch(&request).await {
                Ok(resp) if resp.is_ok() => {
                    cache.put(request.key(), resp);
                    cached += 1;
                }
                Ok(resp) => warn!(url = %absolute, status = resp.status, "static url not cached"),
                Err(e) => warn!(url = %absolute, error = %e, "static url not cached"),
            }
        }

        info!(
            cache = %self.shared.static_name,
            cached,
            total = self.static_urls.len(),
            "offline worker installed"
        );
        self.set_state(WorkerState::Installed);

        if self.skip_waiting_on_install {
            self.skip_waiting();
        }
        cached
    }

    /// Drop caches from other worker versions and take control of clients.
    /// Returns the names of deleted caches.
    pub fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.shared.caches.keys() {
            if name != self.shared.static_name && name != self.shared.dynamic_name {
                self.shared.caches.delete(&name);
                info!(cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }
        self.clients_claimed.store(true, Ordering::SeqCst);
        self.set_state(WorkerState::Activated);
        info!("offline worker activated");
        deleted
    }

    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
            self.activate();
        }
    }

    pub async fn on_message(&self, message: ControlMessage) -> MessageReply {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting();
                MessageReply {
                    ok: true,
                    cached: None,
                }
            }
            ControlMessage::CacheUrls { urls } => MessageReply {
                ok: true,
                cached: Some(self.cache_urls(&urls).await),
            },
        }
    }

    /// Fetch each URL and store successful responses in the dynamic cache.
    pub async fn cache_urls(&self, urls: &[String]) -> usize {
        let mut cached = 0;
        for url in urls {
            let Some(absolute) = self.resolve(url) else {
                warn!(url = %url, "skipping unresolvable url");
                continue;
            };
            let request = HttpRequest::get(absolute.as_str());
            match self.shared.fetcher.fetch(&request).await {
                Ok(resp) if resp.is_ok() => {
                    self.shared.put_dynamic(request.key(), resp);
                    cached += 1;
                }
                Ok(resp) => warn!(url = %absolute, status = resp.status, "url not cached"),
                Err(e) => warn!(url = %absolute, error = %e, "url not cached"),
            }
        }
        cached
    }

    /// Send a request the worker does not intercept straight to the network.
    pub async fn pass_through(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.shared.fetcher.fetch(request).await
    }

    /// Serve one intercepted request.
    pub async fn handle(&self, request: &HttpRequest) -> Handled {
        if !request.method.eq_ignore_ascii_case("GET") {
            return Handled::PassThrough;
        }
        let is_http = Url::parse(&request.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_http {
            return Handled::PassThrough;
        }

        let response = match self.routes.resolve(request) {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
        };
        Handled::Response(response)
    }

    async fn network_first(&self, request: &HttpRequest) -> HttpResponse {
        match self.shared.fetcher.fetch(request).await {
            Ok(resp) => {
                if resp.is_ok() {
                    self.shared.put_dynamic(request.key(), resp.clone());
                }
                resp
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network-first fetch failed");
                match self.shared.caches.match_request(&request.key()) {
                    Some((_, cached)) => cached,
                    None => HttpResponse::offline_json(OFFLINE_MESSAGE),
                }
            }
        }
    }

    async fn cache_first(&self, request: &HttpRequest) -> HttpResponse {
        let key = request.key();
        if let Some((store_name, cached)) = self.shared.caches.match_request(&key) {
            self.spawn_revalidation(request.clone(), store_name);
            return cached;
        }

        match self.shared.fetcher.fetch(request).await {
            Ok(resp) => {
                if resp.is_ok() && self.policy.is_cacheable(request) {
                    self.shared.put_dynamic(key, resp.clone());
                }
                resp
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "cache-first fetch failed");
                if request.is_navigation() {
                    self.offline_page().unwrap_or_else(HttpResponse::network_error)
                } else {
                    HttpResponse::network_error()
                }
            }
        }
    }

    fn offline_page(&self) -> Option<HttpResponse> {
        let url = self.resolve(&self.offline_page)?;
        self.shared
            .caches
            .get(&self.shared.static_name)?
            .get(&RequestKey::new("GET", url.as_str()))
    }

    fn spawn_revalidation(&self, request: HttpRequest, store_name: String) {
        let shared = Arc::clone(&self.shared);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match shared.fetcher.fetch(&request).await {
                Ok(resp) if resp.is_ok() => shared.refresh(&store_name, request.key(), resp),
                Ok(resp) => debug!(url = %request.url, status = resp.status, "revalidation skipped"),
                Err(e) => debug!(url = %request.url, error = %e, "revalidation failed"),
            }
        });
    }

    /// Wait for every outstanding background revalidation.
    pub async fn settle(&self) {
        loop {
            let mut pending = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    debug!(error = %e, "revalidation task did not complete");
                }
            }
        }
    }
}
