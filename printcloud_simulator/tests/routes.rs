//! Route tests for the simulated print service

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt; // for .collect().await
use printcloud_simulator::{SimOptions, SimState, create_router};
use serde_json::{Value, json};
use tower::util::ServiceExt; // for `oneshot`
use url::Url;

// "sim-key:sim-secret"
const AUTH: &str = "Basic c2ltLWtleTpzaW0tc2VjcmV0";

fn test_state() -> SimState {
    SimState::new(Url::parse("http://sim.local/").unwrap(), SimOptions::default())
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, AUTH);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn create_body(port: &str) -> Value {
    json!({
        "client": "http://sim.local/client/abc/",
        "printer_model": "http://sim.local/printer/model/9/",
        "name": "Test Printer",
        "port": port,
        "baud_rate": 250000
    })
}

#[tokio::test]
async fn test_requests_without_credentials_are_rejected() {
    let app = create_router(test_state());
    let request = Request::builder()
        .uri("/printer/instance/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_printers() {
    let state = test_state();
    let app = create_router(state.clone());

    let response = app
        .clone()
        .oneshot(request("POST", "/printer/instance/", Some(create_body("/dev/ttyUSB0"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert_eq!(location, "http://sim.local/printer/instance/1/");

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/printer/instance/?filter%5Bclient%5D=http%3A%2F%2Fsim.local%2Fclient%2Fabc%2F",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = json_body(response).await;
    assert_eq!(list["resources"][0]["uri"], location);
    assert_eq!(list["resources"][0]["port"], "/dev/ttyUSB0");

    let response = app
        .oneshot(request(
            "GET",
            "/printer/instance/?filter%5Bclient%5D=http%3A%2F%2Fsim.local%2Fclient%2Fother%2F",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["resources"], json!([]));
}

#[tokio::test]
async fn test_baud_rate_update() {
    let state = test_state();
    let app = create_router(state.clone());
    app.clone()
        .oneshot(request("POST", "/printer/instance/", Some(create_body("/dev/ttyUSB0"))))
        .await
        .unwrap();

    let response = app
        .oneshot(request("PUT", "/printer/instance/1/", Some(json!({"baud_rate": 115200}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.baud_rate(1), Some(115200));
}

#[tokio::test]
async fn test_command_acknowledgement_flow() {
    let app = create_router(test_state());
    app.clone()
        .oneshot(request("POST", "/printer/instance/", Some(create_body("/dev/ttyUSB0"))))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request("POST", "/printer/instance/1/command/", Some(json!({"command": "M105"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let ack_uri = Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(request("GET", ack_uri.path(), None))
            .await
            .unwrap();
        let ack = json_body(response).await;
        assert_eq!(ack["command"], "M105");
        statuses.push(ack["status"].as_str().unwrap().to_string());
        if ack["status"] == "ok" {
            assert!(ack["response"].as_str().unwrap().starts_with("ok T:"));
        }
    }
    assert_eq!(statuses, vec!["unsent", "sent", "ok"]);
}

#[tokio::test]
async fn test_job_lifecycle_through_routes() {
    let app = create_router(test_state());
    app.clone()
        .oneshot(request("POST", "/printer/instance/", Some(create_body("/dev/ttyUSB0"))))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request("POST", "/sim/printers/1/jobs", Some(json!({"duration_secs": 100.0}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let job_uri = Url::parse(json_body(response).await["job_uri"].as_str().unwrap()).unwrap();

    let status = json_body(
        app.clone()
            .oneshot(request("GET", "/printer/instance/1/", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status["status"], "ONLINE");
    assert_eq!(status["current_print"]["status"], "printing");
    assert_eq!(status["current_print"]["job_uri"], job_uri.as_str());

    let response = app
        .clone()
        .oneshot(request("PUT", job_uri.path(), Some(json!({"status": "pause"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request("PUT", job_uri.path(), Some(json!({"status": "pause"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(request("PUT", job_uri.path(), Some(json!({"status": "cancel"}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let status = json_body(
        app.oneshot(request("GET", "/printer/instance/1/", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status["current_print"], Value::Null);
}

#[tokio::test]
async fn test_unknown_resources() {
    let app = create_router(test_state());
    let response = app
        .clone()
        .oneshot(request("GET", "/printer/instance/42/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(request("GET", "/command/42/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
