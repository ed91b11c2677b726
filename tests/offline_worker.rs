//! Offline cache worker behaviour against a scripted network.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeFetcher;
use workshop_hub::config::OfflineConfig;
use workshop_hub::offline::{
    ControlMessage, FetchError, Fetcher, Handled, HttpFetcher, OfflineWorker, WorkerState,
    OFFLINE_MESSAGE,
};
use workshop_hub_core::cache::CacheStorage;
use workshop_hub_core::models::{HttpRequest, HttpResponse, RequestKey};

const ORIGIN: &str = "https://hub.test";

fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

fn worker_with(config: OfflineConfig, fetcher: &Arc<FakeFetcher>) -> OfflineWorker {
    OfflineWorker::new(&config, fetcher.clone()).unwrap()
}

fn worker(fetcher: &Arc<FakeFetcher>) -> OfflineWorker {
    worker_with(OfflineConfig::for_origin(ORIGIN), fetcher)
}

fn serve_shell(fetcher: &FakeFetcher) {
    fetcher.serve(&url("/"), 200, "<html>home</html>");
    fetcher.serve(&url("/index.html"), 200, "<html>home</html>");
    fetcher.serve(&url("/manifest.json"), 200, "{}");
    fetcher.serve(&url("/offline.html"), 200, "<html>offline</html>");
}

async fn respond(worker: &OfflineWorker, request: &HttpRequest) -> HttpResponse {
    match worker.handle(request).await {
        Handled::Response(resp) => resp,
        Handled::PassThrough => panic!("expected {} to be intercepted", request.url),
    }
}

fn body(resp: &HttpResponse) -> String {
    String::from_utf8_lossy(&resp.body).into_owned()
}

#[tokio::test]
async fn install_precaches_shell_and_activates() {
    let fetcher = FakeFetcher::new();
    serve_shell(&fetcher);
    fetcher.serve(&url("/manifest.json"), 404, "gone");
    let worker = worker(&fetcher);
    assert_eq!(worker.state(), WorkerState::Parsed);

    let cached = worker.install().await;

    assert_eq!(cached, 3);
    assert_eq!(worker.state(), WorkerState::Activated);
    assert!(worker.is_skip_waiting());
    assert!(worker.clients_claimed());
    let shell = worker.caches().get("workshop-hub-v1").unwrap();
    assert!(shell.contains(&RequestKey::new("GET", &url("/offline.html"))));
    assert!(!shell.contains(&RequestKey::new("GET", &url("/manifest.json"))));
}

#[tokio::test]
async fn activation_deletes_caches_from_other_versions() {
    let caches = Arc::new(CacheStorage::new());
    caches.open("workshop-hub-v0");
    caches.open("workshop-hub-dynamic-v0");
    caches.open("workshop-hub-dynamic-v1");

    let fetcher = FakeFetcher::new();
    serve_shell(&fetcher);
    let mut config = OfflineConfig::for_origin(ORIGIN);
    config.skip_waiting_on_install = false;
    let worker = OfflineWorker::with_cache_storage(&config, fetcher.clone(), caches).unwrap();

    worker.install().await;
    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(worker.caches().keys().len(), 4);

    let mut deleted = worker.activate();
    deleted.sort();
    assert_eq!(deleted, vec!["workshop-hub-dynamic-v0", "workshop-hub-v0"]);
    let mut kept = worker.caches().keys();
    kept.sort();
    assert_eq!(kept, vec!["workshop-hub-dynamic-v1", "workshop-hub-v1"]);
    assert_eq!(worker.state(), WorkerState::Activated);
}

#[tokio::test]
async fn skip_waiting_message_activates_installed_worker() {
    let fetcher = FakeFetcher::new();
    serve_shell(&fetcher);
    let mut config = OfflineConfig::for_origin(ORIGIN);
    config.skip_waiting_on_install = false;
    let worker = worker_with(config, &fetcher);

    worker.install().await;
    assert!(!worker.is_skip_waiting());

    let reply = worker.on_message(ControlMessage::SkipWaiting).await;
    assert!(reply.ok);
    assert_eq!(reply.cached, None);
    assert_eq!(worker.state(), WorkerState::Activated);
}

#[tokio::test]
async fn api_requests_go_to_network_first_and_fall_back_to_cache() {
    let fetcher = FakeFetcher::new();
    fetcher.serve(&url("/api/posts"), 200, r#"[{"id":1}]"#);
    let worker = worker(&fetcher);
    let request = HttpRequest::get(url("/api/posts"));

    let live = respond(&worker, &request).await;
    assert_eq!(live.status, 200);
    let dynamic = worker.caches().get("workshop-hub-dynamic-v1").unwrap();
    assert!(dynamic.contains(&request.key()));

    fetcher.serve(&url("/api/posts"), 200, r#"[{"id":1},{"id":2}]"#);
    let fresh = respond(&worker, &request).await;
    assert_eq!(body(&fresh), r#"[{"id":1},{"id":2}]"#);

    fetcher.set_offline(true);
    let fallback = respond(&worker, &request).await;
    assert_eq!(fallback.status, 200);
    assert_eq!(body(&fallback), r#"[{"id":1},{"id":2}]"#);
}

#[tokio::test]
async fn uncached_api_request_offline_gets_json_503() {
    let fetcher = FakeFetcher::new();
    fetcher.set_offline(true);
    let worker = worker(&fetcher);

    let resp = respond(&worker, &HttpRequest::get(url("/api/trips/7"))).await;

    assert_eq!(resp.status, 503);
    assert_eq!(resp.header("Content-Type"), Some("application/json"));
    let json: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(json["error"], "offline");
    assert_eq!(json["message"], OFFLINE_MESSAGE);
}

#[tokio::test]
async fn failed_api_responses_are_not_cached() {
    let fetcher = FakeFetcher::new();
    fetcher.serve(&url("/api/vehicles"), 500, "boom");
    let worker = worker(&fetcher);
    let request = HttpRequest::get(url("/api/vehicles"));

    let resp = respond(&worker, &request).await;

    assert_eq!(resp.status, 500);
    let cached = worker
        .caches()
        .get("workshop-hub-dynamic-v1")
        .map_or(false, |c| c.contains(&request.key()));
    assert!(!cached);
}

#[tokio::test]
async fn cache_hits_are_stable_and_revalidate_once_each() {
    let fetcher = FakeFetcher::new();
    let image = url("/img/axle.png");
    fetcher.serve(&image, 200, "v1");
    let worker = worker(&fetcher);
    let request = HttpRequest::get(image.clone());

    let miss = respond(&worker, &request).await;
    assert_eq!(body(&miss), "v1");
    assert_eq!(fetcher.calls_for(&image), 1);

    fetcher.serve(&image, 200, "v2");
    for _ in 0..3 {
        let hit = respond(&worker, &request).await;
        assert_eq!(body(&hit), "v1");
    }

    worker.settle().await;
    assert_eq!(fetcher.calls_for(&image), 4);

    let refreshed = respond(&worker, &request).await;
    assert_eq!(body(&refreshed), "v2");
    worker.settle().await;
}

#[tokio::test]
async fn cache_hit_does_not_wait_for_revalidation() {
    let fetcher = FakeFetcher::new();
    let script = url("/app.js");
    fetcher.serve(&script, 200, "old");
    let worker = worker(&fetcher);
    let request = HttpRequest::get(script.clone());
    respond(&worker, &request).await;

    fetcher.serve(&script, 200, "new");
    let gate = fetcher.hold();
    let hit = tokio::time::timeout(Duration::from_secs(1), respond(&worker, &request))
        .await
        .expect("cache hit must not block on the network");
    assert_eq!(body(&hit), "old");

    gate.notify_one();
    fetcher.release();
    worker.settle().await;

    let dynamic = worker.caches().get("workshop-hub-dynamic-v1").unwrap();
    assert_eq!(body(&dynamic.get(&request.key()).unwrap()), "new");
}

#[tokio::test]
async fn revalidation_refreshes_the_cache_the_hit_came_from() {
    let fetcher = FakeFetcher::new();
    serve_shell(&fetcher);
    let worker = worker(&fetcher);
    worker.install().await;

    fetcher.serve(&url("/index.html"), 200, "<html>v2</html>");
    let request = HttpRequest::get(url("/index.html"));
    let hit = respond(&worker, &request).await;
    assert_eq!(body(&hit), "<html>home</html>");
    worker.settle().await;

    let shell = worker.caches().get("workshop-hub-v1").unwrap();
    assert_eq!(body(&shell.get(&request.key()).unwrap()), "<html>v2</html>");
    let in_dynamic = worker
        .caches()
        .get("workshop-hub-dynamic-v1")
        .map_or(false, |c| c.contains(&request.key()));
    assert!(!in_dynamic);
}

#[tokio::test]
async fn non_cacheable_static_responses_are_not_stored() {
    let fetcher = FakeFetcher::new();
    fetcher.serve(&url("/about"), 200, "about");
    let worker = worker(&fetcher);
    let request = HttpRequest::get(url("/about"));

    assert_eq!(body(&respond(&worker, &request).await), "about");
    assert!(worker.caches().match_request(&request.key()).is_none());
}

#[tokio::test]
async fn offline_navigation_gets_the_offline_page() {
    let fetcher = FakeFetcher::new();
    serve_shell(&fetcher);
    let worker = worker(&fetcher);
    worker.install().await;
    fetcher.set_offline(true);

    let page = respond(&worker, &HttpRequest::navigate(url("/garage/42"))).await;
    assert_eq!(body(&page), "<html>offline</html>");

    let asset = respond(&worker, &HttpRequest::get(url("/img/missing.png"))).await;
    assert_eq!(asset.status, 503);
    assert_eq!(body(&asset), "Network error");
}

#[tokio::test]
async fn offline_navigation_without_offline_page_is_a_network_error() {
    let fetcher = FakeFetcher::new();
    fetcher.set_offline(true);
    let worker = worker(&fetcher);

    let page = respond(&worker, &HttpRequest::navigate(url("/garage"))).await;

    assert_eq!(page.status, 503);
    assert_eq!(body(&page), "Network error");
}

#[tokio::test]
async fn non_get_and_non_http_requests_pass_through() {
    let fetcher = FakeFetcher::new();
    let worker = worker(&fetcher);

    let mut post = HttpRequest::get(url("/api/posts"));
    post.method = "POST".to_string();
    assert_eq!(worker.handle(&post).await, Handled::PassThrough);
    assert_eq!(
        worker.handle(&HttpRequest::get("ftp://hub.test/file")).await,
        Handled::PassThrough
    );
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn cache_urls_message_stores_successful_fetches() {
    let fetcher = FakeFetcher::new();
    fetcher.serve(&url("/manuals/g609.pdf"), 200, "%PDF");
    fetcher.serve(&url("/manuals/g617.pdf"), 200, "%PDF");
    let worker = worker(&fetcher);

    let reply = worker
        .on_message(ControlMessage::CacheUrls {
            urls: vec![
                "/manuals/g609.pdf".to_string(),
                url("/manuals/g617.pdf"),
                "/manuals/unknown.pdf".to_string(),
            ],
        })
        .await;

    assert!(reply.ok);
    assert_eq!(reply.cached, Some(2));
    let dynamic = worker.caches().get("workshop-hub-dynamic-v1").unwrap();
    assert_eq!(dynamic.len(), 2);
    assert!(dynamic.contains(&RequestKey::new("GET", &url("/manuals/g609.pdf"))));
}

#[tokio::test]
async fn dynamic_cache_is_capped_oldest_first() {
    let fetcher = FakeFetcher::new();
    let mut config = OfflineConfig::for_origin(ORIGIN);
    config.max_dynamic_entries = 3;
    let worker = worker_with(config, &fetcher);

    for i in 0..5 {
        let path = url(&format!("/img/{}.png", i));
        fetcher.serve(&path, 200, "img");
        respond(&worker, &HttpRequest::get(path)).await;
    }

    let dynamic = worker.caches().get("workshop-hub-dynamic-v1").unwrap();
    let keys: Vec<String> = dynamic.keys().iter().map(|k| k.to_string()).collect();
    assert_eq!(
        keys,
        vec![
            format!("GET {}", url("/img/2.png")),
            format!("GET {}", url("/img/3.png")),
            format!("GET {}", url("/img/4.png")),
        ]
    );
}

#[tokio::test]
async fn http_fetcher_returns_upstream_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/posts")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":1}]"#)
        .create_async()
        .await;

    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let resp = fetcher
        .fetch(&HttpRequest::get(format!("{}/api/posts", server.url())))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-type"), Some("application/json"));
    assert_eq!(resp.body, br#"[{"id":1}]"#.to_vec());
}

#[tokio::test]
async fn http_fetcher_reports_unreachable_hosts() {
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

    let err = fetcher
        .fetch(&HttpRequest::get("http://127.0.0.1:1/api/posts"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn origin_url_keeps_the_configured_host() {
    let fetcher = FakeFetcher::new();
    let worker = worker(&fetcher);

    let url = worker.origin_url("//evil.test/steal", Some("a=1"));
    assert_eq!(url.host_str(), Some("hub.test"));
    assert_eq!(url.scheme(), "https");
    assert_eq!(url.query(), Some("a=1"));

    let plain = worker.origin_url("/api/posts", None);
    assert_eq!(plain.as_str(), "https://hub.test/api/posts");
}
