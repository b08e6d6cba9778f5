//! Serve/shutdown lifecycle tests against real listeners.

use std::sync::Arc;
use std::time::Duration;

use api_runtime::api::{Api, ApiBundle, BundleError, Operation};
use api_runtime::config::schema::{
    SERVER_OPENFEATURE_PROVIDER_NAME, SERVER_OPENFEATURE_PROVIDER_URL, SERVER_PORT,
    SERVER_SHUTDOWN_TIMEOUT,
};
use api_runtime::config::ConfigStore;
use api_runtime::flags::FlagError;
use api_runtime::lifecycle::{self, RunError};
use api_runtime::RuntimeError;
use tokio_util::sync::CancellationToken;

mod common;

fn slow_bundle(delay: Duration) -> ApiBundle {
    Arc::new(move |_store: &ConfigStore, api: &mut Api| -> Result<(), BundleError> {
        api.register(Operation::get("Slow", "/slow"), move || async move {
            tokio::time::sleep(delay).await;
            "done"
        })?;
        Ok(())
    })
}

#[tokio::test]
async fn test_cancelled_parent_stops_server() {
    let srv = common::create_server(Vec::new()).await.unwrap();
    let url = srv.url("/api/ingestion/");

    assert_eq!(reqwest::get(&url).await.unwrap().status(), 200);
    srv.stop().await.unwrap();

    assert!(reqwest::get(&url).await.is_err());
}

#[tokio::test]
async fn test_in_flight_request_finishes_within_grace_period() {
    let srv = common::create_server(vec![
        common::with_bundle(slow_bundle(Duration::from_millis(300))),
        common::with_shutdown_timeout(Duration::from_secs(3)),
    ])
    .await
    .unwrap();

    let url = srv.url("/slow");
    let request =
        tokio::spawn(async move { reqwest::get(url).await.unwrap().text().await.unwrap() });
    tokio::time::sleep(Duration::from_millis(100)).await;

    srv.stop().await.unwrap();
    assert_eq!(request.await.unwrap(), "done");
}

#[tokio::test]
async fn test_slow_request_exceeds_shutdown_deadline() {
    let srv = common::create_server(vec![
        common::with_bundle(slow_bundle(Duration::from_secs(3))),
        common::with_shutdown_timeout(Duration::from_millis(200)),
    ])
    .await
    .unwrap();

    let url = srv.url("/slow");
    tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    match srv.stop().await {
        Err(RunError::Shutdown(e)) => assert!(e.is_timeout(), "{e}"),
        other => panic!("expected shutdown timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_serves_until_cancelled() {
    let store = common::default_store()
        .with(SERVER_PORT, 0)
        .with(SERVER_SHUTDOWN_TIMEOUT, 1);
    let parent = CancellationToken::new();

    let canceller = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    lifecycle::start(&parent, &store, &api_runtime::api::default_bundles())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_start_rejects_invalid_provider_url() {
    let store = common::default_store()
        .with(SERVER_OPENFEATURE_PROVIDER_NAME, "go-feature-flag".to_string())
        .with(SERVER_OPENFEATURE_PROVIDER_URL, "http://relay .local".to_string());

    let err = lifecycle::start(&CancellationToken::new(), &store, &[])
        .await
        .unwrap_err();
    assert!(err.is_startup());
    assert!(matches!(
        err,
        RuntimeError::Flags(FlagError::InvalidProviderUrl { .. })
    ));
}

#[tokio::test]
async fn test_start_rejects_out_of_range_port() {
    let store = common::default_store().with(SERVER_PORT, 70_000);

    let err = lifecycle::start(&CancellationToken::new(), &store, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidPort(70_000)));
}

#[tokio::test]
async fn test_start_stops_at_first_bundle_failure() {
    let store = common::default_store().with(SERVER_PORT, 0);
    let bundles = vec![
        api_runtime::api::ingestion::bundle(),
        Arc::new(|_store: &ConfigStore, _api: &mut Api| -> Result<(), BundleError> {
            Err(api_runtime::config::ConfigError::MissingConfiguration(vec![
                "EXTRA_KEY".to_string(),
            ])
            .into())
        }) as ApiBundle,
    ];

    let err = lifecycle::start(&CancellationToken::new(), &store, &bundles)
        .await
        .unwrap_err();
    match err {
        RuntimeError::Bundle(BundleError::Config(e)) => assert_eq!(e.missing_keys(), ["EXTRA_KEY"]),
        other => panic!("unexpected error: {other}"),
    }
}
