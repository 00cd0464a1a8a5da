// HTTP tests against the router, backed by the in-memory report source


use axum::http::StatusCode;
use axum_test::TestServer;
use compressor_report::api::create_router;
use serde_json::Value;
use test_helpers::*;

fn server(source: FakeSource) -> TestServer {
    TestServer::new(create_router(service(source))).unwrap()
}

fn running_day() -> FakeSource {
    FakeSource::default()
        .with_samples(cycling(utc(2024, 3, 5, 8, 0)))
        .with_energy(date(2024, 3, 5), 20.0)
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = server(FakeSource::default());
    let response = server.get("/health").await;
    response.assert_status(StatusCode::OK);
    response.assert_text("OK");
}

#[tokio::test]
async fn test_daily_endpoint() {
    let server = server(running_day());
    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let data = &body["data"];
    assert_eq!(data["client_id"], 3);
    assert_eq!(data["period"]["kind"], "day");
    assert_eq!(data["period"]["date"], "2024-03-05");
    assert_eq!(data["no_data"], false);
    assert_eq!(data["partial"], false);
    assert_eq!(data["percentages"]["status"], "available");
    assert_eq!(data["percentages"]["value"]["LOAD"], 53.85);
    assert_eq!(data["operation"]["value"]["cycles_total"], 6);
    assert_eq!(data["energy"]["value"]["cost_usd"], 3.4);
    assert_eq!(data["energy"]["value"]["rate_source"], "client");
    assert_eq!(data["series"]["value"]["measurement"], "current");
    assert_eq!(data["client"]["value"]["mask_energy"], true);
}

#[tokio::test]
async fn test_partial_section_in_response() {
    let server = server(running_day().failing("energy"));
    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["partial"], true);
    assert_eq!(body["data"]["energy"]["status"], "unavailable");
    assert_eq!(
        body["data"]["unavailable_sections"],
        serde_json::json!(["energy", "horsepower"])
    );
}

#[tokio::test]
async fn test_no_data_is_404_with_marker() {
    let server = server(FakeSource::default());
    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["no_data"], true);
    assert!(body["error"].as_str().unwrap().contains("2024-03-05"));
}

#[tokio::test]
async fn test_unknown_client_is_404_without_marker() {
    let server = server(running_day());
    let response = server
        .get("/api/v1/clients/99/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body.get("no_data").is_none());
}

#[tokio::test]
async fn test_invalid_query_is_400() {
    let server = server(running_day());

    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=03/05/2024")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05&measurement=power")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/clients/3/lines/1/weekly?year=2024")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/clients/3/lines/1/weekly?year=2024&week=53")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_down_is_503_retryable() {
    let source = running_day()
        .failing("samples")
        .failing("compressor")
        .failing("client")
        .failing("energy");
    let server = server(source);
    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_missing_rate_is_422() {
    let server = server(running_day().with_client(Some(client(None))));
    let response = server
        .get("/api/v1/clients/3/lines/1/daily?date=2024-03-05")
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_weekly_endpoint() {
    let mut source = FakeSource::default().with_samples(cycling(utc(2024, 3, 4, 8, 0)));
    for day in 4..=10 {
        source = source.with_energy(date(2024, 3, day), 5.0);
    }
    let server = server(source);
    let response = server
        .get("/api/v1/clients/3/lines/1/weekly?year=2024&week=10")
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let data = &body["data"];
    assert_eq!(data["period"]["kind"], "week");
    assert_eq!(data["period"]["week"], 10);
    assert_eq!(data["energy"]["value"]["kwh"], 35.0);
    assert_eq!(data["days"]["value"].as_array().unwrap().len(), 7);
    assert_eq!(data["comparison"]["status"], "available");
    assert_eq!(data["comparison"]["value"]["kwh_change_pct"], Value::Null);
    assert_eq!(data["series"]["value"]["bucket_width_secs"], 3600);
}
