//! End-to-end lifecycle tests: deploy, serve offline, redeploy.

use std::sync::Arc;

use edugenius_sw::{
    CacheConfig, CacheStorage, MemoryFetcher, Registration, Request, SwError, UpdateOutcome,
};
use url::Url;

const MANIFEST: [&str; 6] = [
    "/",
    "/index.html",
    "/pwalogo.png",
    "/manifest.json",
    "/assets/index-D4x9Qm2L.css",
    "/assets/index-B7kPz1aW.js",
];

fn origin() -> Url {
    Url::parse("https://edugenius.example.org/").unwrap()
}

fn config(version: &str) -> CacheConfig {
    CacheConfig::new(version, origin()).with_precache(MANIFEST)
}

fn serve(fetcher: &MemoryFetcher, config: &CacheConfig) {
    for url in config.precache_urls().unwrap() {
        fetcher.respond(&url, 200, format!("{} {}", config.version, url.path()));
    }
}

async fn deployed(version: &str) -> (Registration<MemoryFetcher>, Arc<MemoryFetcher>) {
    let fetcher = Arc::new(MemoryFetcher::new());
    let config = config(version);
    serve(&fetcher, &config);
    let (registration, _rx) =
        Registration::new(CacheStorage::new().shared(), Arc::clone(&fetcher));
    registration.update(config).await.unwrap();
    (registration, fetcher)
}

#[tokio::test]
async fn precached_urls_are_served_without_network() {
    let (registration, fetcher) = deployed("edugenius-v2").await;
    fetcher.set_offline(true);
    let before = fetcher.calls();

    for url in config("edugenius-v2").precache_urls().unwrap() {
        let response = registration.handle(Request::get(url.clone())).await.unwrap();
        assert!(response.from_cache, "{} should be cached", url);
        assert_eq!(response.status, 200);
    }
    assert_eq!(fetcher.calls(), before);
}

#[tokio::test]
async fn generation_v2_holds_all_manifest_keys() {
    let (registration, _) = deployed("edugenius-v2").await;

    let storage = registration.storage().read().await;
    assert_eq!(storage.keys(), vec!["edugenius-v2"]);
    let cache = storage.get("edugenius-v2").unwrap();
    assert_eq!(cache.len(), MANIFEST.len());
    for path in MANIFEST {
        let key = format!("GET {}", origin().join(path).unwrap());
        assert!(cache.match_request(&key).is_some(), "missing {}", key);
    }
}

#[tokio::test]
async fn redeploy_v3_replaces_v2() {
    let (registration, fetcher) = deployed("edugenius-v2").await;

    let v3 = config("edugenius-v3");
    serve(&fetcher, &v3);
    let outcome = registration.update(v3).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Activated {
            version: "edugenius-v3".to_string(),
            deleted: vec!["edugenius-v2".to_string()],
        }
    );
    assert_eq!(registration.storage().read().await.keys(), vec!["edugenius-v3"]);

    fetcher.set_offline(true);
    let response = registration
        .handle(Request::get(origin().join("/index.html").unwrap()))
        .await
        .unwrap();
    assert_eq!(&response.body[..], b"edugenius-v3 /index.html");
}

#[tokio::test]
async fn failed_precache_keeps_previous_generation_serving() {
    let (registration, fetcher) = deployed("edugenius-v2").await;

    let v3 = config("edugenius-v3");
    serve(&fetcher, &v3);
    fetcher.fail(&origin().join("/assets/index-B7kPz1aW.js").unwrap(), "dns failure");

    let err = registration.update(v3).await.unwrap_err();
    assert!(matches!(err, SwError::PrecacheFailure { ref url, .. } if url.ends_with(".js")));

    assert_eq!(registration.active_version().await.as_deref(), Some("edugenius-v2"));
    assert_eq!(registration.storage().read().await.keys(), vec!["edugenius-v2"]);

    let response = registration
        .handle(Request::get(origin().join("/manifest.json").unwrap()))
        .await
        .unwrap();
    assert!(response.from_cache);
    assert_eq!(&response.body[..], b"edugenius-v2 /manifest.json");
}

#[tokio::test]
async fn non_cacheable_responses_are_never_written() {
    let (registration, fetcher) = deployed("edugenius-v2").await;

    let missing = origin().join("/assets/gone.js").unwrap();
    let failing = origin().join("/api/grades").unwrap();
    let cross = Url::parse("https://embed.example.net/app").unwrap();
    let bounced = origin().join("/external-app").unwrap();
    fetcher.respond(&missing, 404, "");
    fetcher.respond(&failing, 500, "oops");
    fetcher.respond(&cross, 200, "<iframe>");
    fetcher.redirect(&bounced, &cross, 200, "<iframe>");

    for url in [&missing, &failing, &cross, &bounced] {
        for _ in 0..2 {
            let response = registration.handle(Request::get(url.clone())).await.unwrap();
            assert!(!response.from_cache);
        }
        assert_eq!(fetcher.calls_for(url), 2, "{} should hit the network twice", url);
    }

    let storage = registration.storage().read().await;
    assert_eq!(storage.get("edugenius-v2").unwrap().len(), MANIFEST.len());
}

#[tokio::test]
async fn cached_response_is_byte_identical_when_offline() {
    let (registration, fetcher) = deployed("edugenius-v2").await;

    let url = origin().join("/assets/lesson-3.png").unwrap();
    let png: Vec<u8> = (0u8..=255).collect();
    fetcher.respond(&url, 200, png.clone());
    let online = registration.handle(Request::get(url.clone())).await.unwrap();

    fetcher.set_offline(true);
    let offline = registration.handle(Request::get(url)).await.unwrap();

    assert!(offline.from_cache);
    assert_eq!(offline.body, online.body);
    assert_eq!(&offline.body[..], &png[..]);
}

#[tokio::test]
async fn offline_navigation_gets_shell_and_subresource_fails() {
    let (registration, fetcher) = deployed("edugenius-v2").await;
    fetcher.set_offline(true);

    let page = origin().join("/student/quizzes").unwrap();
    let shell = registration.handle(Request::navigate(page)).await.unwrap();
    assert_eq!(&shell.body[..], b"edugenius-v2 /index.html");

    let data = origin().join("/api/quizzes.json").unwrap();
    let err = registration.handle(Request::get(data)).await.unwrap_err();
    assert!(matches!(err, SwError::Network { .. }));
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let (registration, fetcher) = deployed("edugenius-v2").await;
    let registration = Arc::new(registration);

    let urls: Vec<Url> = (0..16)
        .map(|i| origin().join(&format!("/assets/chunk-{}.js", i)).unwrap())
        .collect();
    for url in &urls {
        fetcher.respond(url, 200, url.path().to_string());
    }

    let mut tasks = Vec::new();
    for url in urls.iter().chain(urls.iter()).cloned() {
        let registration = Arc::clone(&registration);
        tasks.push(tokio::spawn(async move {
            registration.handle(Request::get(url)).await
        }));
    }
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    let storage = registration.storage().read().await;
    assert_eq!(
        storage.get("edugenius-v2").unwrap().len(),
        MANIFEST.len() + urls.len()
    );
}

#[tokio::test]
async fn persisted_generation_serves_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (registration, _) = deployed("edugenius-v2").await;
    registration
        .storage()
        .read()
        .await
        .save_to_dir(dir.path())
        .unwrap();

    let storage = CacheStorage::load_from_dir(dir.path()).unwrap().shared();
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.set_offline(true);
    let controller =
        edugenius_sw::CacheController::new(config("edugenius-v2"), storage, fetcher).unwrap();

    let response = controller
        .handle(Request::navigate(origin().join("/teacher").unwrap()))
        .await
        .unwrap();
    assert_eq!(&response.body[..], b"edugenius-v2 /index.html");
}
