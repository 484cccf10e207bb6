//! HTTP and WebSocket client tests against the in-process mock backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{MockBackend, StatusReply, WsScript};
use posegen_core::auth::{CredentialProvider, NoneCredentials, TokenCredentials};
use posegen_core::client::{
    HttpGenerationApi, JobSubmitter, RealtimeConnector, RealtimeEvent, StatusError, StatusSource,
    SubmitError, WsConnector,
};
use posegen_core::config::ApiConfig;
use posegen_core::realtime::ServerFrame;
use posegen_core::task::TaskStatus;
use posegen_core::testing::fixtures;
use posegen_core::transport::RealtimeConfig;
use posegen_core::Credential;

fn api_config(backend: &MockBackend) -> ApiConfig {
    ApiConfig {
        base_url: backend.base_url.clone(),
        ws_url: None,
        timeout_secs: 5,
    }
}

fn anonymous_api(backend: &MockBackend) -> HttpGenerationApi {
    HttpGenerationApi::new(&api_config(backend), Arc::new(NoneCredentials::new())).unwrap()
}

#[tokio::test]
async fn test_submit_sends_multipart_form() {
    let backend = MockBackend::start().await;
    let api = anonymous_api(&backend);

    let submitted = api.submit(&fixtures::request()).await.unwrap();

    assert_eq!(submitted.task_id, "srv-1");
    let submissions = backend.submissions().await;
    assert_eq!(submissions.len(), 1);
    let submission = &submissions[0];
    assert_eq!(submission.fields["pose_id"], "42");
    assert_eq!(submission.fields["generate_muscles"], "true");
    assert_eq!(submission.fields["additional_prompt"], "studio lighting");
    assert_eq!(submission.file_name.as_deref(), Some("warrior.png"));
    assert_eq!(submission.file_len, 8);
    assert_eq!(submission.authorization, None);
}

#[tokio::test]
async fn test_submit_attaches_bearer_token() {
    let backend = MockBackend::start().await;
    let credentials = TokenCredentials::new(Some(Credential::new("abc", None)), 5).unwrap();
    let api = HttpGenerationApi::new(&api_config(&backend), Arc::new(credentials)).unwrap();

    api.submit(&fixtures::request()).await.unwrap();

    let submissions = backend.submissions().await;
    assert_eq!(submissions[0].authorization.as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn test_submit_pose_mismatch() {
    let backend = MockBackend::start().await;
    let api = anonymous_api(&backend);
    let mut request = fixtures::request();
    request.additional_prompt = Some("reject".to_string());

    let result = api.submit(&request).await;

    match result {
        Err(SubmitError::PoseMismatch(detail)) => assert!(detail.contains("Pose mismatch")),
        other => panic!("Expected PoseMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_connection_refused() {
    let api = HttpGenerationApi::new(
        &ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ws_url: None,
            timeout_secs: 2,
        },
        Arc::new(NoneCredentials::new()),
    )
    .unwrap();

    let result = api.submit(&fixtures::request()).await;
    assert!(matches!(result, Err(SubmitError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_fetch_status_parses_snapshot() {
    let backend = MockBackend::start().await;
    backend
        .push_status(
            "t1",
            StatusReply::Ok(json!({
                "task_id": "t1",
                "status": "completed",
                "progress": 100,
                "photo_url": "/generated/t1.png",
                "muscles_url": null,
                "quota_warning": true,
                "analyzed_muscles": [{"name": "glutes", "activation_level": 0.7}]
            })),
        )
        .await;
    let api = anonymous_api(&backend);

    let snapshot = api.fetch_status("t1").await.unwrap();

    assert_eq!(snapshot.status, Some(TaskStatus::Completed));
    assert_eq!(snapshot.photo_url.as_deref(), Some("/generated/t1.png"));
    assert_eq!(snapshot.muscles_url, None);
    assert_eq!(snapshot.quota_warning, Some(true));
    assert_eq!(snapshot.analyzed_muscles.unwrap()[0].name, "glutes");
}

#[tokio::test]
async fn test_fetch_status_fills_missing_task_id() {
    let backend = MockBackend::start().await;
    backend
        .push_status("t2", StatusReply::Ok(json!({ "status": "processing", "progress": 10 })))
        .await;
    let api = anonymous_api(&backend);

    let snapshot = api.fetch_status("t2").await.unwrap();
    assert_eq!(snapshot.task_id, "t2");
}

#[tokio::test]
async fn test_fetch_status_error_mapping() {
    let backend = MockBackend::start().await;
    for (status, retry_after) in [
        (StatusCode::TOO_MANY_REQUESTS, Some(7)),
        (StatusCode::UNAUTHORIZED, None),
        (StatusCode::FORBIDDEN, None),
        (StatusCode::BAD_GATEWAY, None),
    ] {
        backend
            .push_status(
                "t1",
                StatusReply::Error {
                    status,
                    retry_after,
                    detail: "nope".to_string(),
                },
            )
            .await;
    }
    let api = anonymous_api(&backend);

    assert!(matches!(
        api.fetch_status("t1").await,
        Err(StatusError::RateLimited { retry_after: Some(d) }) if d == Duration::from_secs(7)
    ));
    assert!(matches!(
        api.fetch_status("t1").await,
        Err(StatusError::Unauthorized(_))
    ));
    assert!(matches!(
        api.fetch_status("t1").await,
        Err(StatusError::Forbidden(_))
    ));
    assert!(matches!(
        api.fetch_status("t1").await,
        Err(StatusError::Transient(_))
    ));
    // Queue exhausted: the backend no longer knows the task.
    assert!(matches!(
        api.fetch_status("t1").await,
        Err(StatusError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_ws_connector_delivers_frames_and_token() {
    let backend = MockBackend::start().await;
    backend
        .script_ws(
            "t1",
            WsScript {
                frames: vec![
                    json!({ "type": "pong" }),
                    json!({ "type": "progress_update", "task_id": "t1", "status": "processing", "progress": 55 }),
                ],
                close_code: None,
            },
        )
        .await;
    let connector = WsConnector::new(&api_config(&backend), &RealtimeConfig::default());

    let mut connection = connector
        .connect("t1", &Credential::new("tok en", None))
        .await
        .unwrap();

    let first = connection.next_event().await.unwrap();
    assert_eq!(first, RealtimeEvent::Frame(r#"{"type":"pong"}"#.to_string()));
    match connection.next_event().await.unwrap() {
        RealtimeEvent::Frame(text) => match ServerFrame::parse(&text).unwrap() {
            ServerFrame::ProgressUpdate(snapshot) => assert_eq!(snapshot.progress, Some(55)),
            other => panic!("Expected progress update, got {:?}", other),
        },
        other => panic!("Expected frame, got {:?}", other),
    }
    assert_eq!(backend.ws_tokens().await, vec![Some("tok en".to_string())]);

    connection.close();
}

#[tokio::test]
async fn test_ws_connector_forwards_close_code() {
    let backend = MockBackend::start().await;
    backend
        .script_ws(
            "t1",
            WsScript {
                frames: vec![],
                close_code: Some(4004),
            },
        )
        .await;
    let connector = WsConnector::new(&api_config(&backend), &RealtimeConfig::default());

    let mut connection = connector
        .connect("t1", &Credential::anonymous())
        .await
        .unwrap();

    match connection.next_event().await.unwrap() {
        RealtimeEvent::Closed { code, .. } => assert_eq!(code, Some(4004)),
        other => panic!("Expected close, got {:?}", other),
    }
    assert_eq!(backend.ws_tokens().await, vec![None]);
}

#[tokio::test]
async fn test_token_refresh_success_rotates_tokens() {
    let backend = MockBackend::start().await;
    let provider = TokenCredentials::new(Some(Credential::new("old", None)), 5)
        .unwrap()
        .with_refresh(format!("{}/api/v1/auth/refresh", backend.base_url), "good-1");

    assert!(provider.refresh().await.unwrap());
    let credential = provider.current().await.unwrap();
    assert_eq!(credential.access_token, "fresh-access");
    assert!(credential.expires_at.is_some());

    assert!(provider.refresh().await.unwrap());
    assert_eq!(
        *backend.state.refresh_tokens.lock().await,
        vec!["good-1".to_string(), "good-rotated".to_string()]
    );
}

#[tokio::test]
async fn test_token_refresh_rejected_ends_session() {
    let backend = MockBackend::start().await;
    let provider = TokenCredentials::new(Some(Credential::new("old", None)), 5)
        .unwrap()
        .with_refresh(format!("{}/api/v1/auth/refresh", backend.base_url), "revoked");

    assert!(!provider.refresh().await.unwrap());
    assert!(provider.current().await.is_none());
}
