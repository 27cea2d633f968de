//! JSON route handlers: health, scenarios and the flow API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pygmalion_core::SessionId;
use pygmalion_flow::SubmitOutcome;
use serde::Deserialize;

use super::registry::{self, Started};
use super::state::AppState;
use super::{flow_error_response, json_error};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sink": state.sink.sink_id(),
        "scenarios": state.catalog.len(),
        "flows": state.flows.len().await,
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/scenarios
///
/// Lists what can be played. Framing labels stay out of this listing; a
/// participant only ever sees the one drawn for them.
pub(crate) async fn handle_list_scenarios(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scenarios: Vec<serde_json::Value> = state
        .catalog
        .scenarios()
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id,
                "title": s.title,
                "question": s.question,
                "min_value": s.min_value,
                "max_value": s.max_value,
                "default_rating": s.default_rating(),
            })
        })
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "scenarios": scenarios })))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartRequest {
    #[serde(default)]
    session: Option<String>,
    /// Absent: run every scenario. Present: just that one.
    #[serde(default)]
    scenario: Option<String>,
}

/// POST /api/flows
pub(crate) async fn handle_start_flow(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRequest>,
) -> Response {
    let session = SessionId::resolve(body.session.as_deref());

    let id = match body.scenario.as_deref() {
        None => {
            state
                .flows
                .start_multi(&state.catalog, session, state.assigner.as_ref())
                .await
        }
        Some(requested) => match state
            .flows
            .start_single(&state.catalog, requested, session, state.assigner.as_ref())
            .await
        {
            Started::Created(id) => id,
            Started::NotFound { requested } => {
                return json_error(
                    StatusCode::NOT_FOUND,
                    &format!("scenario '{}' not found", requested),
                )
                .into_response();
            }
        },
    };

    match state.flows.get(&id).await {
        Some(slot) => {
            let view = slot.lock().await.flow.view(&id);
            (StatusCode::CREATED, Json(view)).into_response()
        }
        None => json_error(StatusCode::NOT_FOUND, "flow not found").into_response(),
    }
}

/// GET /api/flows/{id}
pub(crate) async fn handle_get_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(slot) = state.flows.get(&id).await else {
        return json_error(StatusCode::NOT_FOUND, "flow not found").into_response();
    };
    let view = slot.lock().await.flow.view(&id);
    (StatusCode::OK, Json(view)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct RatingRequest {
    /// `null` resets the slider to "nothing selected".
    rating: Option<i32>,
}

/// PUT /api/flows/{id}/rating
pub(crate) async fn handle_set_rating(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RatingRequest>,
) -> Response {
    let Some(slot) = state.flows.get(&id).await else {
        return json_error(StatusCode::NOT_FOUND, "flow not found").into_response();
    };

    let mut guard = slot.lock().await;
    guard.touch();
    let result = match body.rating {
        Some(rating) => guard.flow.set_rating(rating),
        None => guard.flow.clear_rating(),
    };
    if let Err(e) = result {
        return flow_error_response(&e);
    }
    let view = guard.flow.view(&id);
    (StatusCode::OK, Json(view)).into_response()
}

/// POST /api/flows/{id}/submit
///
/// Saved and completed submits answer 200, a missing rating 422 and a
/// failed append 502. Every answer carries the flow as it now stands.
pub(crate) async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(slot) = state.flows.get(&id).await else {
        return json_error(StatusCode::NOT_FOUND, "flow not found").into_response();
    };

    let outcome = match registry::submit(&slot, state.sink.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => return flow_error_response(&e),
    };

    let (status, label) = match outcome {
        SubmitOutcome::Saved => (StatusCode::OK, "saved"),
        SubmitOutcome::Completed => (StatusCode::OK, "completed"),
        SubmitOutcome::MissingRating => (StatusCode::UNPROCESSABLE_ENTITY, "missing_rating"),
        SubmitOutcome::Failed => (StatusCode::BAD_GATEWAY, "failed"),
    };

    let view = slot.lock().await.flow.view(&id);
    let body = serde_json::json!({ "outcome": label, "flow": view });
    (status, Json(body)).into_response()
}
