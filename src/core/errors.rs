use http::StatusCode;
use spin_sdk::http::Response;
use thiserror::Error;

use crate::crypt::HashError;
use crate::token::TokenError;

/// Discriminant of an [`ApiError`]; callers branch on this rather than on
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    WrongCredential,
    NotFound,
    Conflict,
    Unexpected,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("access denied")]
    Forbidden,

    #[error("wrong password")]
    WrongCredential,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Store, serialization or cryptographic failure. The detail is logged,
    /// never sent to the client.
    #[error("internal error: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ApiError::Forbidden => ErrorKind::Forbidden,
            ApiError::WrongCredential => ErrorKind::WrongCredential,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated | ErrorKind::WrongCredential => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unexpected(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthenticated("unauthorized".to_string())
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        if let ApiError::Unexpected(detail) = &err {
            tracing::error!(error = %detail, "request failed");
        }
        let body = serde_json::json!({ "error": err.public_message() });
        Response::builder()
            .status(err.status().as_u16())
            .header("Content-Type", "application/json")
            .body(body.to_string().into_bytes())
            .build()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Unexpected(format!("{:#}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => ApiError::Unauthenticated(err.to_string()),
            TokenError::Signing(_) => ApiError::Unexpected(err.to_string()),
        }
    }
}

/// Conversion for the hash-then-store paths (registration, password change).
/// Login maps verification failures itself so that every failure reads the same.
impl From<HashError> for ApiError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::InputTooLong => ApiError::Validation(err.to_string()),
            HashError::Mismatch => ApiError::WrongCredential,
            HashError::Hashing(_) | HashError::Format => ApiError::Unexpected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Rejection;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (ApiError::Validation("bad".into()), 400),
            (ApiError::unauthorized(), 401),
            (ApiError::WrongCredential, 401),
            (ApiError::Forbidden, 403),
            (ApiError::NotFound("gone".into()), 404),
            (ApiError::Conflict("taken".into()), 409),
            (ApiError::Unexpected("db down".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{:?}", err);
        }
    }

    #[test]
    fn unexpected_details_stay_private() {
        let err = ApiError::Unexpected("connection refused to 10.0.0.3".into());
        assert_eq!(err.public_message(), "internal server error");

        let response: Response = err.into();
        assert_eq!(*response.status(), 500);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "internal server error");
    }

    #[test]
    fn token_rejections_become_unauthenticated() {
        let err: ApiError = TokenError::Invalid(Rejection::Expired).into();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn hash_errors_map_by_cause() {
        assert_eq!(ApiError::from(HashError::InputTooLong).kind(), ErrorKind::Validation);
        assert_eq!(ApiError::from(HashError::Mismatch).kind(), ErrorKind::WrongCredential);
        assert_eq!(ApiError::from(HashError::Format).kind(), ErrorKind::Unexpected);
    }
}
