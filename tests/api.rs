#![cfg(feature = "server")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cloudiverse::api::{ApiClient, ArchitectureRequest};
use cloudiverse::poll::{CancelToken, PollOutcome};
use cloudiverse::{ApiError, ReconcileAction, Service, apply_reconcile};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const TOKEN: &str = "secret-token";

#[derive(Default)]
struct Backend {
    status_calls: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

async fn generate(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid token"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "project": {"name": "Generated", "description": body["description"]},
            "provider": body["provider"],
            "architecture": {"nodes": [{"id": "api"}], "edges": []}
        })),
    )
}

async fn reconcile(Json(body): Json<Value>) -> Json<Value> {
    let mut services = body["current_services"].as_array().cloned().unwrap_or_default();
    if body["action"] == "add_service" {
        services.push(json!({"id": body["service_id"], "name": "Added by backend"}));
    }
    services.push(json!({"id": "unrelated"}));
    Json(json!({"deployable_services": services, "message": "Contract updated"}))
}

async fn deploy_status(
    State(backend): State<Arc<Backend>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let call = backend.status_calls.fetch_add(1, Ordering::SeqCst);
    match job_id.as_str() {
        "flaky" if call == 0 => {
            (StatusCode::BAD_GATEWAY, Json(json!({"message": "upstream hiccup"})))
        }
        "revoked" => (StatusCode::UNAUTHORIZED, Json(json!({"message": "Token revoked"}))),
        _ => {
            let status = if call == 0 { "running" } else { "completed" };
            (
                StatusCode::OK,
                Json(json!({"job_id": job_id, "status": status, "progress": call})),
            )
        }
    }
}

async fn billing() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, Json(json!({"error": "Upgrade to Pro to deploy"})))
}

async fn workspaces() -> Json<Value> {
    Json(json!({"workspaces": [{"_id": "ws-1", "name": "Demo"}, {"id": "ws-2"}]}))
}

async fn login(Json(body): Json<Value>) -> impl IntoResponse {
    if body["password"] == "hunter2" {
        (StatusCode::OK, Json(json!({"token": TOKEN, "user": {"email": body["email"]}})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "Wrong credentials"})))
    }
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn spawn_backend() -> Result<(String, Arc<Backend>)> {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/workflow/architecture", post(generate))
        .route("/api/architecture/reconcile", post(reconcile))
        .route("/api/workflow/deploy/:job_id/status", get(deploy_status))
        .route("/api/billing/status", get(billing))
        .route("/api/workspaces", get(workspaces))
        .route("/api/auth/login", post(login))
        .route(
            "/api/auth/profile",
            get(broken).delete(|| async { StatusCode::NO_CONTENT }),
        )
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{addr}"), backend))
}

#[tokio::test]
async fn generate_sends_bearer_token() -> Result<()> {
    let (base, _) = spawn_backend().await?;
    let request = ArchitectureRequest {
        description: "photo sharing app".into(),
        provider: Some("aws".into()),
        ..Default::default()
    };

    let anonymous = ApiClient::new(&base)?;
    let err = anonymous.generate_architecture(&request).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Invalid token"), "{err}");

    let client = ApiClient::new(&base)?.with_token(Some(TOKEN.into()));
    let response = client.generate_architecture(&request).await?;
    assert_eq!(response["project"]["description"], "photo sharing app");
    assert_eq!(response["provider"], "aws");
    Ok(())
}

#[tokio::test]
async fn reconcile_round_trip_keeps_contract() -> Result<()> {
    let (base, _) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;
    let local = vec![Service::new("api"), Service::new("db")];
    let action = ReconcileAction::AddService("cache".into());

    let response = client.reconcile(Some("ws-1"), &action, &local).await?;
    assert_eq!(response.message.as_deref(), Some("Contract updated"));

    let merged = apply_reconcile(&local, &action, &response);
    let ids: Vec<&str> = merged.iter().map(|service| service.id.as_str()).collect();
    assert_eq!(ids, ["api", "db", "cache"]);
    assert_eq!(merged[2].display_name(), "Added by backend");
    Ok(())
}

#[tokio::test]
async fn deployment_polling_reaches_terminal_state() -> Result<()> {
    let (base, backend) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;
    let token = CancelToken::new();

    let outcome = client.wait_for_deployment("job-42", &token).await?;
    match outcome {
        PollOutcome::Finished(status) => {
            assert_eq!(status.status, "completed");
            assert_eq!(status.job_id.as_deref(), Some("job-42"));
        }
        PollOutcome::Cancelled => panic!("poll should not be cancelled"),
    }
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn deployment_polling_survives_a_failed_status_call() -> Result<()> {
    let (base, backend) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;
    let token = CancelToken::new();

    let outcome = client.wait_for_deployment("flaky", &token).await?;
    match outcome {
        PollOutcome::Finished(status) => assert!(status.succeeded()),
        PollOutcome::Cancelled => panic!("poll should not be cancelled"),
    }
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn rejected_session_stops_polling() -> Result<()> {
    let (base, backend) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;
    let token = CancelToken::new();

    let err = client.wait_for_deployment("revoked", &token).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Token revoked"), "{err}");
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_poll_does_not_hit_the_backend() -> Result<()> {
    let (base, backend) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;
    let token = CancelToken::new();
    token.cancel();

    let outcome = client.wait_for_deployment("job-1", &token).await?;
    assert_eq!(outcome, PollOutcome::Cancelled);
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn error_statuses_are_classified() -> Result<()> {
    let (base, _) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;

    let err = client.billing_status().await.unwrap_err();
    assert!(matches!(err, ApiError::PlanRequired(_)), "{err}");
    assert_eq!(err.user_message(), "Upgrade to Pro to deploy");

    let err = client.get_profile().await.unwrap_err();
    match err {
        ApiError::Status { code, message } => {
            assert_eq!(code, 500);
            assert_eq!(message, "Request failed with status 500");
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = client.deploy_resources(&json!({})).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { code: 404, .. }), "{err}");
    Ok(())
}

#[tokio::test]
async fn login_workspaces_and_empty_bodies() -> Result<()> {
    let (base, _) = spawn_backend().await?;
    let client = ApiClient::new(&base)?;

    let err = client.login("me@example.com", "nope").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let auth = client.login("me@example.com", "hunter2").await?;
    assert_eq!(auth.token, TOKEN);

    let workspaces = client.list_workspaces().await?;
    let ids: Vec<&str> = workspaces.iter().map(|ws| ws.id.as_str()).collect();
    assert_eq!(ids, ["ws-1", "ws-2"]);

    client.delete_profile().await?;
    Ok(())
}
