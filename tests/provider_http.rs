//! Twilio provider against a local fake of the REST API

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use sos_alert::config::Config;
use sos_alert::error::ProviderError;
use sos_alert::provider::{CommsProvider, Credentials, TwilioProvider};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Received {
    account: String,
    resource: &'static str,
    authorization: Option<String>,
    form: HashMap<String, String>,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn handle(
    log: Log,
    account: String,
    resource: &'static str,
    headers: HeaderMap,
    form: HashMap<String, String>,
) -> axum::response::Response {
    log.lock().unwrap().push(Received {
        account: account.clone(),
        resource,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        form,
    });

    if account == "ACBAD" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "code": 20003,
                "message": "Authenticate",
                "status": 401
            })),
        )
            .into_response();
    }
    if account == "ACTEXT" {
        return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
    }
    (StatusCode::CREATED, Json(serde_json::json!({ "sid": "XX123" }))).into_response()
}

async fn start_fake_twilio() -> (SocketAddr, Log) {
    let log: Log = Arc::default();
    let app = Router::new()
        .route(
            "/2010-04-01/Accounts/:sid/Calls.json",
            post(
                |State(log): State<Log>,
                 Path(sid): Path<String>,
                 headers: HeaderMap,
                 Form(form): Form<HashMap<String, String>>| async move {
                    handle(log, sid, "Calls", headers, form).await
                },
            ),
        )
        .route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(
                |State(log): State<Log>,
                 Path(sid): Path<String>,
                 headers: HeaderMap,
                 Form(form): Form<HashMap<String, String>>| async move {
                    handle(log, sid, "Messages", headers, form).await
                },
            ),
        )
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, log)
}

fn provider_for(base: String) -> (TwilioProvider, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        provider_api_base: base,
        provider_timeout_secs: 5,
        ..Config::for_testing(dir.path())
    };
    (TwilioProvider::new(&config).unwrap(), dir)
}

fn creds(account: &str) -> Credentials {
    Credentials {
        account_id: account.to_string(),
        auth_secret: "secret".to_string(),
        from_number: "+15005550006".to_string(),
    }
}

#[tokio::test]
async fn test_call_posts_twiml_with_basic_auth() {
    let (addr, log) = start_fake_twilio().await;
    let (provider, _dir) = provider_for(format!("http://{}", addr));

    provider
        .place_call(&creds("AC0000"), "+919876543210", "Asha needs help & fast")
        .await
        .unwrap();

    let received = log.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let call = &received[0];
    assert_eq!(call.account, "AC0000");
    assert_eq!(call.resource, "Calls");

    let expected_auth = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("AC0000:secret")
    );
    assert_eq!(call.authorization.as_deref(), Some(expected_auth.as_str()));

    assert_eq!(call.form["To"], "+919876543210");
    assert_eq!(call.form["From"], "+15005550006");
    let twiml = &call.form["Twiml"];
    assert!(twiml.contains("<Response>"));
    assert!(twiml.contains("Emergency alert. Asha needs help &amp; fast"));
    assert!(twiml.contains("<Redirect"));
}

#[tokio::test]
async fn test_text_posts_body() {
    let (addr, log) = start_fake_twilio().await;
    let (provider, _dir) = provider_for(format!("http://{}/", addr));

    provider
        .send_text(&creds("AC0000"), "+919876543210", "EMERGENCY SOS ALERT!")
        .await
        .unwrap();

    let received = log.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].resource, "Messages");
    assert_eq!(received[0].form["Body"], "EMERGENCY SOS ALERT!");
    assert_eq!(received[0].form["To"], "+919876543210");
}

#[tokio::test]
async fn test_rejection_carries_provider_message() {
    let (addr, _log) = start_fake_twilio().await;
    let (provider, _dir) = provider_for(format!("http://{}", addr));

    let err = provider
        .send_text(&creds("ACBAD"), "+919876543210", "hi")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Rejected {
            status: 401,
            message: "Authenticate".to_string(),
        }
    );
}

#[tokio::test]
async fn test_non_json_rejection_keeps_raw_body() {
    let (addr, _log) = start_fake_twilio().await;
    let (provider, _dir) = provider_for(format!("http://{}", addr));

    let err = provider
        .place_call(&creds("ACTEXT"), "+919876543210", "hi")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Rejected {
            status: 502,
            message: "upstream unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_unreachable_provider_is_network_error() {
    // Bind then drop so the port is closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (provider, _dir) = provider_for(format!("http://{}", addr));
    let err = provider
        .place_call(&creds("AC0000"), "+919876543210", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}
