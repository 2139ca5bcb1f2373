use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    claim_time::render_claim_time,
    config::Config,
    domain::RecordPatch,
    state::{JsonStagingStore, StoreError},
};


#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Mutex<JsonStagingStore>>,
}

/// Failure response for both endpoints: `{"status":false,"message":...}`,
/// plus the original request body on claim-validation failures. Every
/// validation error short-circuits the handler; exactly one response is
/// sent per request.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    body_echo: Option<Value>,
}

impl ApiError {
    fn missing_token() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Please add token field.".to_string(),
            body_echo: None,
        }
    }

    fn missing_claim_fields(body: Value) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Please add token, branch, user, and hostname fields.".to_string(),
            body_echo: Some(body),
        }
    }

    fn token_mismatch() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: "Token mismatch".to_string(),
            body_echo: None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("store unavailable: {value}"),
            body_echo: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "status": false,
            "message": self.message,
        });
        if let Some(echo) = self.body_echo {
            body["body"] = echo;
        }
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    status: bool,
    message: &'static str,
}

pub fn build_router(config: Config, store: Arc<Mutex<JsonStagingStore>>) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store,
    };

    Router::new()
        .route("/get", post(get_status))
        .route("/update", post(update_claim))
        .layer(Extension(state))
}

fn parse_body(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn non_empty_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field)?.as_str().filter(|value| !value.is_empty())
}

fn authorize(state: &AppState, token: &str) -> Result<(), ApiError> {
    match state.config.shared_token() {
        Some(expected) if token == expected => Ok(()),
        _ => Err(ApiError::token_mismatch()),
    }
}

/// `POST /get`: one line per staging record, newline-joined, plain text.
async fn get_status(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_body(&body);
    let token = non_empty_field(&body, "token").ok_or_else(ApiError::missing_token)?;
    authorize(&state, token)?;

    let store = state.store.lock().await;
    let lines: Vec<String> = store
        .records()
        .values()
        .map(|record| record.status_line())
        .collect();
    Ok(lines.join("\n").into_response())
}

/// `POST /update`: claim the slot whose `hostname` matches, overwriting its
/// `user`, `branch`, `timestamp`, and `timeString`. Never creates records.
async fn update_claim(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<ClaimResponse>, ApiError> {
    let body = parse_body(&body);
    let (Some(token), Some(branch), Some(user), Some(hostname)) = (
        non_empty_field(&body, "token"),
        non_empty_field(&body, "branch"),
        non_empty_field(&body, "user"),
        non_empty_field(&body, "hostname"),
    ) else {
        return Err(ApiError::missing_claim_fields(body));
    };
    authorize(&state, token)?;

    let mut store = state.store.lock().await;

    // First match wins; hostname uniqueness is a convention, not enforced.
    let (matched_key, duplicate) = {
        let mut matching = store
            .records()
            .iter()
            .filter(|(_, record)| record.hostname == hostname);
        let key = matching.next().map(|(key, _)| key.clone());
        (key, matching.next().is_some())
    };
    if duplicate {
        warn!(hostname, "duplicate hostname among staging records, claiming the first match");
    }

    let message = match matched_key {
        Some(key) => {
            let now = Utc::now().timestamp();
            let patch = RecordPatch {
                user: Some(user.to_string()),
                branch: Some(branch.to_string()),
                timestamp: Some(now),
                time_string: Some(render_claim_time(now)),
            };
            match store.apply_patch(&key, patch) {
                Ok(record) => {
                    info!(
                        hostname,
                        user = %record.user,
                        branch = %record.branch,
                        "staging slot claimed"
                    );
                    "Updated."
                }
                // Record vanished between snapshot and write; same outcome
                // as no match.
                Err(StoreError::MissingRecord { .. }) => "Did not update.",
                Err(err) => return Err(err.into()),
            }
        }
        None => "Did not update.",
    };

    Ok(Json(ClaimResponse {
        status: true,
        message,
    }))
}
