use std::time::Duration;

use serde_json::json;
use unmanic::{
    ApiErrorBody, ApiRequest, ConnectionConfig, ConnectionError, DecodeError, HttpTransport,
    Payload, Transport, UnmanicError,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERSION_PATH: &str = "/unmanic/api/v2/version/read";

fn transport_for(server: &MockServer) -> HttpTransport {
    let addr = server.address();
    HttpTransport::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ConnectionConfig::default()
    })
    .unwrap()
}

async fn respond_with(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VERSION_PATH))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn json_response_is_parsed() {
    let server =
        respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.1.4~655b18b"})))
            .await;
    let transport = transport_for(&server);

    let payload = transport.request(ApiRequest::get("v2/version/read")).await.unwrap();
    assert_eq!(payload, Payload::Json(json!({"version": "0.1.4~655b18b"})));
    assert!(transport.has_open_session());

    transport.close_session().await;
    assert!(!transport.has_open_session());
}

#[tokio::test]
async fn default_headers_are_sent() {
    let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({}))).await;
    transport_for(&server)
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let headers = &requests[0].headers;
    assert_eq!(
        headers.get("accept").unwrap().to_str().unwrap(),
        "application/json, text/plain, */*"
    );
    assert!(headers
        .get("user-agent")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("Unmanic-API/"));
    assert!(headers.get("content-type").is_none());
}

#[tokio::test]
async fn json_body_carries_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/unmanic/api/v2/workers/worker/pause"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let request = ApiRequest::post("v2/workers/worker/pause").json(&json!({"worker_id": "W0"}));
    transport_for(&server).request(request).await.unwrap();
}

#[tokio::test]
async fn configured_headers_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VERSION_PATH))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let addr = server.address();
    let mut config = ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ConnectionConfig::default()
    };
    config
        .headers
        .insert("authorization", "Bearer secret".parse().unwrap());

    HttpTransport::new(config)
        .unwrap()
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap();
}

#[tokio::test]
async fn plain_text_is_returned_unparsed() {
    let server =
        respond_with(ResponseTemplate::new(200).set_body_raw("pong", "text/plain")).await;

    let payload = transport_for(&server)
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap();
    match payload {
        Payload::Text { content_type, body } => {
            assert!(content_type.starts_with("text/plain"));
            assert_eq!(body, "pong");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server =
        respond_with(ResponseTemplate::new(200).set_body_raw("{\"version\":", "application/json"))
            .await;

    let err = transport_for(&server)
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    assert!(matches!(err, UnmanicError::Decode(DecodeError::Json(_))));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = respond_with(
        ResponseTemplate::new(200)
            .set_body_json(json!({"version": "late"}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let addr = server.address();
    let transport = HttpTransport::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        request_timeout: Duration::from_millis(200),
        ..ConnectionConfig::default()
    })
    .unwrap();

    let err = transport
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, UnmanicError::Connection(ConnectionError::Timeout(d)) if d == Duration::from_millis(200)),
        "{err:?}"
    );
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = HttpTransport::new(ConnectionConfig {
        host: "127.0.0.1".into(),
        port,
        ..ConnectionConfig::default()
    })
    .unwrap();

    let err = transport
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, UnmanicError::Connection(ConnectionError::Transport(_))),
        "{err:?}"
    );
}

#[tokio::test]
async fn invalid_host_is_a_connection_error() {
    let transport = HttpTransport::new(ConnectionConfig {
        host: "#".into(),
        ..ConnectionConfig::default()
    })
    .unwrap();

    let err = transport
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UnmanicError::Connection(ConnectionError::InvalidUrl { .. })
    ));
    assert!(!transport.has_open_session());
}

#[tokio::test]
async fn mapped_statuses_raise_specific_errors() {
    for status in [400u16, 404, 405, 500] {
        let server = respond_with(
            ResponseTemplate::new(status).set_body_json(json!({"status": "NOK"})),
        )
        .await;

        let err = transport_for(&server)
            .request(ApiRequest::get("v2/version/read"))
            .await
            .unwrap_err();

        let expected = match (status, &err) {
            (400, UnmanicError::BadRequestValidation) => true,
            (404, UnmanicError::BadRequestEndpointNotFound) => true,
            (405, UnmanicError::BadRequestMethodNotAllowed) => true,
            (500, UnmanicError::InternalServer) => true,
            _ => false,
        };
        assert!(expected, "status {status} produced {err:?}");
    }
}

#[tokio::test]
async fn unmapped_status_with_json_keeps_parsed_body() {
    let server =
        respond_with(ResponseTemplate::new(501).set_body_json(json!({"status": "NOK"}))).await;

    let err = transport_for(&server)
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    match err {
        UnmanicError::Api {
            status_code,
            content_type,
            body,
        } => {
            assert_eq!(status_code, 501);
            assert_eq!(content_type, "application/json");
            assert_eq!(body, ApiErrorBody::Json(json!({"status": "NOK"})));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unmapped_status_with_text_keeps_raw_body() {
    let server = respond_with(
        ResponseTemplate::new(503).set_body_raw("Service Unavailable", "text/plain"),
    )
    .await;

    let err = transport_for(&server)
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    match err {
        UnmanicError::Api {
            status_code,
            content_type,
            body,
        } => {
            assert_eq!(status_code, 503);
            assert!(content_type.starts_with("text/plain"));
            assert_eq!(body, ApiErrorBody::Text("Service Unavailable".into()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn supplied_session_survives_close() {
    let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({}))).await;
    let addr = server.address();
    let config = ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ConnectionConfig::default()
    };
    let session = reqwest::Client::builder().no_proxy().build().unwrap();
    let transport = HttpTransport::with_session(config, session).unwrap();

    transport.request(ApiRequest::get("v2/version/read")).await.unwrap();
    transport.close_session().await;
    assert!(transport.has_open_session());
    transport.request(ApiRequest::get("v2/version/read")).await.unwrap();
}

#[tokio::test]
async fn supplied_session_timeout_keeps_reqwest_error() {
    let server = respond_with(
        ResponseTemplate::new(200)
            .set_body_json(json!({"version": "late"}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;
    let addr = server.address();
    let config = ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        request_timeout: Duration::from_secs(5),
        ..ConnectionConfig::default()
    };
    let session = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .no_proxy()
        .build()
        .unwrap();

    let err = HttpTransport::with_session(config, session)
        .unwrap()
        .request(ApiRequest::get("v2/version/read"))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    match err {
        UnmanicError::Connection(ConnectionError::SessionTimeout(source)) => {
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unnormalised_base_path_reaches_the_api() {
    let server = respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1"})))
        .await;
    let addr = server.address();
    let transport = HttpTransport::new(ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        base_path: "unmanic/api".into(),
        ..ConnectionConfig::default()
    })
    .unwrap();

    assert_eq!(transport.config().base_path, "/unmanic/api/");
    let payload = transport.request(ApiRequest::get("v2/version/read")).await.unwrap();
    assert_eq!(payload, Payload::Json(json!({"version": "1"})));
}
