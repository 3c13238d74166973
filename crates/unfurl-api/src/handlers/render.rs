//! The render endpoint.

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::{ApiError, ErrorEntry};
use crate::models::{RenderRequestBody, RenderResponse};
use crate::pipeline;
use crate::state::AppState;
use crate::validation;

/// `POST /v1/render`: validate, run the pipeline, shape the envelope.
pub async fn render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequestBody>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let error = ApiError::Validation(vec![ErrorEntry::for_field(
                "body",
                format!("invalid JSON body: {rejection}"),
            )]);
            return failure_response(&state, &request_id, error);
        }
    };

    let request = match validation::validate(body) {
        Ok(request) => request,
        Err(entries) => {
            return failure_response(&state, &request_id, ApiError::Validation(entries));
        }
    };

    info!(
        request_id = %request_id,
        url = %request.url,
        wait_until = ?request.wait_until,
        timeout_ms = request.timeout.as_millis() as u64,
        javascript = request.javascript,
        scroll = request.scroll.enabled,
        "render request accepted"
    );

    match pipeline::execute(&state.broker, &request_id, &request).await {
        Ok(outcome) => {
            let duration = started.elapsed();
            info!(
                request_id = %request_id,
                http_status = outcome.http_status,
                duration_ms = duration.as_millis() as u64,
                "render completed"
            );
            let envelope = RenderResponse::success(&request_id, outcome, duration);
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Err(error) => {
            error!(
                request_id = %request_id,
                error = %error,
                duration_ms = started.elapsed().as_millis() as u64,
                "render failed"
            );
            failure_response(&state, &request_id, error)
        }
    }
}

fn failure_response(state: &AppState, request_id: &str, error: ApiError) -> Response {
    let status = error.status();
    let entries = error.into_entries(state.config.expose_error_details());
    let envelope = RenderResponse::failure(request_id, entries);
    (status, Json(envelope)).into_response()
}
