//! Native actix-web front end. Converts requests to the Spin types the
//! handlers speak and back.

use actix_web::http::StatusCode as ActixStatus;
use actix_web::{web, HttpRequest, HttpResponse};
use spin_sdk::http::{Method, Request, Response};

use crate::handlers::{dispatch, AppState};

pub fn actix_to_spin_request(req: &HttpRequest, body: web::Bytes) -> Request {
    let method = match req.method().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "HEAD" => Method::Head,
        "OPTIONS" => Method::Options,
        "PATCH" => Method::Patch,
        other => Method::Other(other.to_string()),
    };

    let mut builder = Request::builder();
    builder.method(method).uri(req.uri().to_string());
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            builder.header(name.as_str(), value);
        }
    }
    builder.body(body.to_vec()).build()
}

pub fn spin_to_actix_response(resp: Response) -> HttpResponse {
    let status = ActixStatus::from_u16(*resp.status()).unwrap_or(ActixStatus::INTERNAL_SERVER_ERROR);
    let body = resp.body().to_vec();

    let mut response = HttpResponse::build(status);
    if !body.is_empty() {
        response.content_type("application/json");
    }
    response.body(body)
}

/// Catch-all actix handler. Handlers hash passwords, so they run on the
/// blocking pool.
pub async fn handle_all(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let spin_req = actix_to_spin_request(&req, body);

    match web::block(move || dispatch(&state, spin_req)).await {
        Ok(resp) => spin_to_actix_response(resp),
        Err(err) => {
            tracing::error!(error = %err, "request handler did not complete");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "internal server error"}))
        }
    }
}
