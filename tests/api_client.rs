use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dpxreport::api::models::{FilterItem, JobStatus};
use dpxreport::api::{ApiError, Connection, DpxClient, NoReauth, Reauthenticate, Session};
use dpxreport::core::{FetchOptions, fetch_all_logs};
use serde_json::{Value, json};

const PASSWORD: &str = "s3cret";

#[derive(Default)]
struct ServerState {
    token: String,
    logins: u32,
    /// Number of upcoming authenticated requests to answer with 401
    reject_next: u32,
    log_requests: Vec<(usize, usize)>,
    filters: Vec<String>,
    total_logs: usize,
    status_requests: Vec<String>,
}

type Shared = Arc<Mutex<ServerState>>;

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let mut state = state.lock().unwrap();
    if state.reject_next > 0 {
        state.reject_next -= 1;
        return false;
    }
    let expected = format!("Bearer {}", state.token);
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !state.token.is_empty() && v == expected)
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    if body["password"] != PASSWORD {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut state = state.lock().unwrap();
    state.logins += 1;
    state.token = format!("token-{}", state.logins);
    Json(json!({ "token": state.token, "refreshToken": "refresh" })).into_response()
}

async fn license(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "server_node_name": "MASTER",
        "build_version": "4.9.0",
        "eval_license": false,
        "expiration_days": 120,
        "categories": []
    }))
    .into_response()
}

async fn job_instances(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(filter) = query.get("filter") {
        state.lock().unwrap().filters.push(filter.clone());
    }
    Json(json!([{
        "job_instance_id": 42,
        "job_name": "NIGHTLY",
        "job_instance_run_type": "BASE",
        "start_time": "2024-03-01T22:00:00Z",
        "end_time": "2024-03-01T23:00:00Z",
        "status": "http://dpx/app/api/job_instance_statuses/COMPLETED"
    }]))
    .into_response()
}

async fn job_log(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
    Query(query): Query<HashMap<String, usize>>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let index = query.get("index").copied().unwrap_or(0);
    let count = query.get("count").copied().unwrap_or(500);

    let mut state = state.lock().unwrap();
    state.log_requests.push((index, count));
    let end = (index + count).min(state.total_logs);
    let entries: Vec<Value> = (index.min(end)..end)
        .map(|i| {
            json!({
                "time": "2024-03-01T22:00:00Z",
                "module": "ssjobhnd",
                "message": format!("job {job_id} line {i}"),
                "source_ip": "10.0.0.1",
                "message_code": "SNBJH_0000J"
            })
        })
        .collect();
    Json(entries).into_response()
}

async fn status_info(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(status): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.lock().unwrap().status_requests.push(status.clone());
    if status != "COMPLETED" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "icon": "completed.png",
        "display": "Completed",
        "job_instance_status_name": "COMPLETED"
    }))
    .into_response()
}

async fn start_server(total_logs: usize) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(ServerState {
        total_logs,
        ..Default::default()
    }));

    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/app/api/license", get(license))
        .route("/app/api/job_instances", get(job_instances))
        .route("/app/api/job_instances/{id}/log", get(job_log))
        .route("/app/api/job_instance_statuses/{status}", get(status_info))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

/// Logs in again with a fixed password, counting attempts.
struct FixedPassword {
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Reauthenticate for FixedPassword {
    async fn reauthenticate(
        &self,
        client: &DpxClient,
        expired: &Session,
        _error: &ApiError,
    ) -> Option<Session> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        client.login(expired.user(), PASSWORD).await.ok().flatten()
    }
}

async fn connect(host: &str, reauth: Box<dyn Reauthenticate>, attempts: u32) -> Connection {
    let client = DpxClient::new(host, Duration::from_secs(5)).unwrap();
    let session = client
        .login("admin", PASSWORD)
        .await
        .unwrap()
        .expect("login accepted");
    Connection::new(client, session, reauth, attempts)
}

#[tokio::test]
async fn test_login_with_good_and_bad_password() {
    let (host, _state) = start_server(0).await;
    let client = DpxClient::new(&host, Duration::from_secs(5)).unwrap();

    let session = client.login("admin", PASSWORD).await.unwrap();
    assert_eq!(session.map(|s| s.user().to_string()), Some("admin".to_string()));

    let refused = client.login("admin", "wrong").await.unwrap();
    assert!(refused.is_none());
}

#[tokio::test]
async fn test_bearer_token_is_required() {
    let (host, _state) = start_server(0).await;
    let client = DpxClient::new(&host, Duration::from_secs(5)).unwrap();
    let session = client.login("admin", PASSWORD).await.unwrap().unwrap();

    let license = client.license(&session).await.unwrap();
    assert_eq!(license.server_node_name, "MASTER");
    assert_eq!(license.expires_in_days, 120);

    let forged = Session::new("admin", "not-a-token");
    let err = client.license(&forged).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_paginated_log_at_exact_multiple() {
    let (host, state) = start_server(500).await;
    let mut conn = connect(&host, Box::new(NoReauth), 1).await;

    let logs = fetch_all_logs(&mut conn, 42, FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(logs.len(), 500);
    assert_eq!(logs[499].message, "job 42 line 499");
    assert_eq!(
        state.lock().unwrap().log_requests,
        vec![(0, 500), (500, 500)]
    );
}

#[tokio::test]
async fn test_job_filters_are_sent_as_json() {
    let (host, state) = start_server(0).await;
    let mut conn = connect(&host, Box::new(NoReauth), 1).await;

    let jobs = conn
        .job_instances(&[FilterItem::job_name_is(&["NIGHTLY"])])
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status(), JobStatus::Completed);

    let sent = state.lock().unwrap().filters.clone();
    let filter: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(
        filter,
        json!([{ "var": "job_name", "op": "=", "val": ["NIGHTLY"] }])
    );
}

#[tokio::test]
async fn test_expired_session_is_renewed_and_call_retried() {
    let (host, state) = start_server(3).await;
    let attempts = Arc::new(AtomicU32::new(0));
    let reauth = FixedPassword {
        attempts: attempts.clone(),
    };
    let mut conn = connect(&host, Box::new(reauth), 1).await;

    state.lock().unwrap().reject_next = 1;
    let logs = conn.job_logs(42, 0, 500).await.unwrap();

    assert_eq!(logs.len(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(state.lock().unwrap().logins, 2);
    assert_eq!(conn.session().user(), "admin");
}

#[tokio::test]
async fn test_without_reauth_401_propagates() {
    let (host, state) = start_server(3).await;
    let mut conn = connect(&host, Box::new(NoReauth), 1).await;

    state.lock().unwrap().reject_next = 1;
    let err = conn.license().await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_reauth_attempts_are_bounded() {
    let (host, state) = start_server(3).await;
    let attempts = Arc::new(AtomicU32::new(0));
    let reauth = FixedPassword {
        attempts: attempts.clone(),
    };
    let mut conn = connect(&host, Box::new(reauth), 2).await;

    state.lock().unwrap().reject_next = 10;
    let err = conn.license().await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_status_info_follows_status_url() {
    let (host, state) = start_server(0).await;
    let mut conn = connect(&host, Box::new(NoReauth), 1).await;

    let info = conn
        .status_info("http://dpx/app/api/job_instance_statuses/COMPLETED")
        .await
        .unwrap()
        .expect("status info");
    assert_eq!(info.display_name, "Completed");
    assert_eq!(info.status(), JobStatus::Completed);

    let missing = conn
        .status_info("http://dpx/app/api/job_instance_statuses/EXPLODED")
        .await
        .unwrap_err();
    assert!(matches!(missing, ApiError::Status { status: 404, .. }));

    assert!(conn.status_info("not a url").await.unwrap().is_none());
    assert_eq!(
        state.lock().unwrap().status_requests,
        vec!["COMPLETED".to_string(), "EXPLODED".to_string()]
    );
}
