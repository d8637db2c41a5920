//! Request logging and bearer-token authentication.
//!
//! Every request is logged first; protected routes are then authenticated
//! once and the handler receives the verified [`Identity`].

use spin_sdk::http::{Request, Response};

use crate::core::errors::ApiError;
use crate::core::helpers::header;
use crate::models::models::Identity;
use crate::token::{bearer_token, TokenError, TokenService};

#[derive(Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized(Identity),
    Rejected(TokenError),
}

pub fn log_request(req: &Request) {
    tracing::info!(
        method = %req.method(),
        uri = %req.uri(),
        host = header(req, "host").unwrap_or_default(),
        "request received"
    );
}

/// Verifies the bearer token of `req`. One attempt, no retries.
pub fn authenticate(tokens: &TokenService, req: &Request) -> AuthOutcome {
    match tokens.extract_identity(bearer_token(req)) {
        Ok(identity) => AuthOutcome::Authorized(identity),
        Err(err) => AuthOutcome::Rejected(err),
    }
}

/// Logs `req`, then hands it to `next`.
pub fn logged<F>(req: Request, next: F) -> Response
where
    F: FnOnce(Request) -> Response,
{
    log_request(&req);
    next(req)
}

/// Runs `handler` with the caller's identity, or answers 401.
pub fn authenticated<F>(tokens: &TokenService, req: &Request, handler: F) -> Response
where
    F: FnOnce(Identity) -> Result<Response, ApiError>,
{
    match authenticate(tokens, req) {
        AuthOutcome::Authorized(identity) => handler(identity).unwrap_or_else(Response::from),
        AuthOutcome::Rejected(reason) => {
            tracing::debug!(%reason, uri = %req.uri(), "authentication rejected");
            ApiError::from(reason).into()
        }
    }
}
