//! Integration tests for the delivery request flow
//!
//! Runs `DeliveryService` against a mock HTTP server and checks the state
//! produced by feeding its signals through `DeliveryReducer`.

use std::sync::Arc;
use std::time::Duration;

use libcourier::client::{ApiClient, ReqwestTransport};
use libcourier::config::{ApiConfig, Config, RetryConfig};
use libcourier::delivery::{
    Delivery, DeliveryApi, DeliveryReducer, DeliveryService, DeliverySignal, DeliveryStatus,
};
use libcourier::dispatch::{spawn_reducer, SignalBus};
use libcourier::error::{Classify, ErrorKind, NOT_FOUND};
use libcourier::retry::RetryOptions;
use libcourier::{ApiCallState, Reducer};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn raw_delivery(id: &str, customer: &str) -> serde_json::Value {
    json!({
        "id": id,
        "address": "Stationsplein 1",
        "city": "Utrecht",
        "zipCode": "3511 ED",
        "latitude": 52.089,
        "longitude": 5.11,
        "customer": customer,
    })
}

fn service_for(server: &MockServer) -> DeliveryService {
    let config = Config {
        api: ApiConfig {
            base_url: server.uri(),
        },
        retry: RetryConfig {
            interval: "10ms".to_string(),
            attempts: Some(2),
        },
    };
    let client = ApiClient::new(&config).unwrap();
    DeliveryService::new(DeliveryApi::new(client), SignalBus::new())
}

#[tokio::test]
async fn test_refresh_populates_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deliveries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 12,
            "next": format!("{}/deliveries?page=2", server.uri()),
            "previous": null,
            "results": [raw_delivery("1", "Ann"), raw_delivery("2", "Bob")],
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let (state, handle) = spawn_reducer(DeliveryReducer::default(), service.bus().subscribe());

    let outcome = service.refresh(false).await;
    assert_eq!(outcome.unwrap().unwrap(), 12);

    drop(service);
    handle.await.unwrap();

    let state = state.borrow().clone();
    assert_eq!(state.list_request, ApiCallState::idle());
    assert_eq!(state.deliveries.len(), 2);
    assert_eq!(state.deliveries.get("2").unwrap().customer, "Bob");
}

#[tokio::test]
async fn test_invalid_envelope_surfaces_as_failed_state() {
    let server = MockServer::start().await;
    Mock::given(path("/deliveries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": "12",
            "next": null,
            "previous": null,
            "results": [],
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let (state, handle) = spawn_reducer(DeliveryReducer::default(), service.bus().subscribe());

    let error = service.refresh(false).await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidResponse);

    drop(service);
    handle.await.unwrap();

    assert_eq!(
        state.borrow().list_request,
        ApiCallState::failed("api.INVALID_RESPONSE")
    );
}

#[tokio::test]
async fn test_unreachable_server_gives_up_after_configured_attempts() {
    let transport = Arc::new(ReqwestTransport::new().unwrap());
    let client = ApiClient::with_transport("http://127.0.0.1:9", transport).with_retry(
        RetryOptions::new(vec![ErrorKind::Connection], Duration::from_millis(5)).with_attempts(2),
    );
    let service = DeliveryService::new(DeliveryApi::new(client), SignalBus::new());
    let mut signals = service.bus().subscribe();

    let error = service.refresh(true).await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Connection);

    assert_eq!(signals.recv().await.unwrap(), DeliverySignal::GetDeliveriesList);
    match signals.recv().await.unwrap() {
        DeliverySignal::SetDeliveriesListError { error } => {
            assert_eq!(error.code, "api.CONNECTION_ERROR");
        }
        other => panic!("Unexpected signal {:?}", other),
    }
}

#[tokio::test]
async fn test_finish_delivery_tracks_request_per_id_and_reloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/finishDelivery"))
        .and(body_json(json!({
            "deliveryId": "1",
            "latitude": 52.089,
            "longitude": 5.11,
            "status": "delivered",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/finishDelivery"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deliveries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [raw_delivery("3", "Cas")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    let (state, handle) = spawn_reducer(DeliveryReducer::default(), service.bus().subscribe());

    let first: Delivery = serde_json::from_value(raw_delivery("1", "Ann")).unwrap();
    let second: Delivery = serde_json::from_value(raw_delivery("2", "Bob")).unwrap();

    service.finish(&first, DeliveryStatus::Delivered).await.unwrap();
    let error = service
        .finish(&second, DeliveryStatus::Undelivered)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);

    drop(service);
    handle.await.unwrap();

    let state = state.borrow().clone();
    assert_eq!(state.finish_requests.get("1"), None);
    assert_eq!(
        state.finish_requests.get("2"),
        Some(&ApiCallState::failed(NOT_FOUND))
    );
    assert_eq!(state.deliveries.get("1").unwrap().customer, "Ann");
    assert_eq!(state.deliveries.get("3").unwrap().customer, "Cas");
}

#[tokio::test]
async fn test_state_snapshot_restores() {
    let reducer = DeliveryReducer::default();
    let initial = reducer.initial_state();
    let state = reducer.reduce(&initial, &DeliverySignal::FinishDelivery { id: "7".to_string() });

    let snapshot = serde_json::to_string(&state).unwrap();
    let restored = serde_json::from_str(&snapshot).unwrap();

    assert_eq!(state, restored);
}
