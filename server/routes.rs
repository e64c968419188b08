use std::io::Cursor;

use serde::Serialize;
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, error};

use crate::handlers;
use crate::state::SharedState;

pub type JsonResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn content_type_json() -> Option<Header> {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).ok()
}

pub fn json_response<T: Serialize>(status: u16, body: &T) -> JsonResponse {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "could not serialize response body");
            return error_response(500, "Internal server error");
        }
    };
    let len = bytes.len();
    Response::new(
        StatusCode(status),
        content_type_json().into_iter().collect(),
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

/// `{"detail": ...}` error body.
pub fn error_response(status: u16, detail: &str) -> JsonResponse {
    let bytes = json!({ "detail": detail }).to_string().into_bytes();
    let len = bytes.len();
    Response::new(
        StatusCode(status),
        content_type_json().into_iter().collect(),
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn not_found() -> JsonResponse {
    error_response(404, "Not Found")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches incoming requests to the appropriate handler and responds.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();
    debug!(%method, %path, "request received");

    let response = match (method, path.as_str()) {
        (Method::Get, "/") => handlers::status::handle_root(&state),
        (Method::Get, "/health") => handlers::status::handle_health(&state),
        (Method::Post, "/predict") => handlers::predict::handle(&mut request, &state),
        _ => not_found(),
    };

    if let Err(err) = request.respond(response) {
        error!(error = %err, %path, "could not write response");
    }
}
