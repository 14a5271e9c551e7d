//! Integration tests for `AuthorityClient` using wiremock HTTP mocks.

use lastmile_authority::types::{
    AddressComponents, ComputeRouteRequest, LatLng, OutcomeKind, OutcomeRequest, RawAddress,
};
use lastmile_authority::{AuthorityClient, AuthorityError, RetryPolicy};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> AuthorityClient {
    AuthorityClient::new(base_url, Some("test-token"), 30, RetryPolicy::default())
        .expect("client construction should not fail")
}

fn no_retry_client(base_url: &str) -> AuthorityClient {
    AuthorityClient::new(
        base_url,
        None,
        30,
        RetryPolicy {
            max_retries: 0,
            backoff_base_ms: 0,
        },
    )
    .expect("client construction should not fail")
}

fn raw_address(text: &str) -> RawAddress {
    RawAddress {
        formatted_address: text.to_string(),
        components: AddressComponents {
            locality: Some("CABA".to_string()),
            country: Some("AR".to_string()),
            ..AddressComponents::default()
        },
        location: None,
        floor: None,
        apartment: None,
        packages: 1,
    }
}

#[tokio::test]
async fn normalize_returns_canonical_records_and_errors() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "addresses": [
            {
                "id": 101,
                "normalized_text": "Av. Corrientes 1234, CABA, AR",
                "latitude": -34.6037,
                "longitude": -58.3816,
                "floor": "3",
                "apartment": "B",
                "address_key": "a".repeat(64),
                "geo_key": "b".repeat(64),
                "package_count": 2
            }
        ],
        "errors": ["could not geocode 'Calle Falsa 123'"]
    });

    Mock::given(method("POST"))
        .and(path("/api/addresses/normalize"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .normalize_addresses(vec![
            raw_address("Av. Corrientes 1234"),
            raw_address("Calle Falsa 123"),
        ])
        .await
        .expect("should parse normalization response");

    assert_eq!(response.addresses.len(), 1);
    assert_eq!(response.addresses[0].id, 101);
    assert_eq!(response.addresses[0].package_count, 2);
    assert_eq!(response.errors.len(), 1);
}

#[tokio::test]
async fn compute_route_parses_ordered_points() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "route_id": 55,
        "distance_meters": 12_400,
        "duration_seconds": 1_980,
        "geometry": "mocked~polyline",
        "points": [
            { "point_id": 1, "order": 0, "geo_key": "origin-key",
              "latitude": -34.60, "longitude": -58.38, "addresses": [] },
            { "point_id": 2, "order": 1, "geo_key": "k1",
              "latitude": -34.61, "longitude": -58.39, "addresses": [] }
        ]
    });

    Mock::given(method("POST"))
        .and(path("/api/routes/compute"))
        .and(body_partial_json(serde_json::json!({
            "origin": { "latitude": -34.60, "longitude": -58.38 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let request = ComputeRouteRequest {
        origin: LatLng {
            latitude: -34.60,
            longitude: -58.38,
        },
        addresses: vec![],
    };
    let response = client
        .compute_route(&request)
        .await
        .expect("should parse route");

    assert_eq!(response.route_id, 55);
    assert_eq!(response.points.len(), 2);
    assert_eq!(response.points[1].order, 1);
    assert_eq!(response.geometry, "mocked~polyline");
}

#[tokio::test]
async fn start_route_parses_execution_records() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "run_id": 900,
        "deliveries": [
            { "execution_id": 1, "canonical_id": 101, "package_count": 2 },
            { "execution_id": 2, "geo_key": "k2" },
            { "execution_id": 3, "latitude": -34.61, "longitude": -58.39 }
        ]
    });

    Mock::given(method("POST"))
        .and(path("/api/routes/start"))
        .and(body_partial_json(serde_json::json!({
            "route_id": 55, "driver_id": 45
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client.start_route(55, 45).await.expect("should parse run");

    assert_eq!(response.run_id, 900);
    assert_eq!(response.deliveries.len(), 3);
    // Each record carries a different identity datum; none is mandatory.
    assert_eq!(response.deliveries[0].canonical_id, Some(101));
    assert_eq!(response.deliveries[1].geo_key.as_deref(), Some("k2"));
    assert_eq!(response.deliveries[2].latitude, Some(-34.61));
}

#[tokio::test]
async fn record_outcome_acknowledges() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/deliveries/outcome"))
        .and(body_partial_json(serde_json::json!({
            "execution_id": 7, "outcome": "completed"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "acknowledged": true, "run_status": "in_progress"
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .record_outcome(&OutcomeRequest {
            execution_id: 7,
            outcome: OutcomeKind::Completed,
            note: Some("left with doorman".to_string()),
            location: None,
        })
        .await
        .expect("should acknowledge");

    assert!(response.acknowledged);
    assert_eq!(response.run_status, "in_progress");
}

#[tokio::test]
async fn identical_previous_outcome_is_an_idempotent_replay() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/deliveries/outcome"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "acknowledged": false,
            "run_status": "in_progress",
            "previous_outcome": "completed"
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .record_outcome(&OutcomeRequest {
            execution_id: 7,
            outcome: OutcomeKind::Completed,
            note: None,
            location: None,
        })
        .await
        .expect("identical replay is not an error");

    assert_eq!(response.previous_outcome, Some(OutcomeKind::Completed));
}

#[tokio::test]
async fn conflicting_previous_outcome_is_a_hard_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/deliveries/outcome"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "acknowledged": false,
            "run_status": "in_progress",
            "previous_outcome": "completed"
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client
        .record_outcome(&OutcomeRequest {
            execution_id: 7,
            outcome: OutcomeKind::Failed,
            note: None,
            location: None,
        })
        .await;

    match result {
        Err(AuthorityError::OutcomeConflict {
            execution_id,
            existing,
            submitted,
        }) => {
            assert_eq!(execution_id, 7);
            assert_eq!(existing, "completed");
            assert_eq!(submitted, "failed");
        }
        other => panic!("expected OutcomeConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn api_error_body_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/routes/compute"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "at least two locations are required"
        })))
        .mount(&server)
        .await;

    let client = no_retry_client(&server.uri());
    let request = ComputeRouteRequest {
        origin: LatLng {
            latitude: 0.0,
            longitude: 0.0,
        },
        addresses: vec![],
    };
    let err = client.compute_route(&request).await.unwrap_err();

    match err {
        AuthorityError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "at least two locations are required");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_server_error_is_retried() {
    let server = MockServer::start().await;

    // First attempt fails with 503, the mounted-later mock takes over.
    Mock::given(method("POST"))
        .and(path("/api/routes/start"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/routes/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "run_id": 1, "deliveries": []
        })))
        .mount(&server)
        .await;

    let client = AuthorityClient::new(
        &server.uri(),
        None,
        30,
        RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 1,
        },
    )
    .unwrap();

    let response = client.start_route(1, 1).await.expect("retry should recover");
    assert_eq!(response.run_id, 1);
}
