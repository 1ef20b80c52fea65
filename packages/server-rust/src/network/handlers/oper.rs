//! Operation dispatch endpoint.
//!
//! `POST /oper/{name}`: the last path segment names the operation, the raw
//! body bytes are the request envelope. The engine's answer is always a
//! well-formed response envelope, so the HTTP status is always 200; error
//! reporting lives inside the envelope.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use bytes::Bytes;

use super::AppState;

/// Dispatches one request envelope to the named operation.
pub async fn oper_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let _guard = state.shutdown.in_flight_guard();
    let response = state.engine.handle_raw(&name, &body);
    ([(header::CONTENT_TYPE, "application/json")], response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
