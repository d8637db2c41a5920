use http::StatusCode;
use spin_sdk::http::{Request, Response};

use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, parse_body};
use crate::crypt::verify_password;
use crate::handlers::AppState;
use crate::models::models::{Credentials, Identity, Session};
use crate::token::TokenService;
use crate::users::find_by_email;

/// Exchanges an email and password for a bearer token.
///
/// An unknown email, a wrong password and an unreadable stored hash all
/// answer the same "unauthorized" error.
pub fn login(
    db: &Db,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> Result<Session, ApiError> {
    let Some(user) = find_by_email(db, email.trim())? else {
        tracing::debug!("login for unknown email");
        return Err(ApiError::unauthorized());
    };

    if let Err(err) = verify_password(&user.password, password) {
        tracing::debug!(user_id = %user.id, error = %err, "login refused");
        return Err(ApiError::unauthorized());
    }

    let token = tokens.issue(&Identity::new(user.id.clone()))?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Session { id: user.id, token })
}

pub fn login_user(state: &AppState, req: &Request) -> Result<Response, ApiError> {
    let creds: Credentials = parse_body(req)?;
    let session = login(&state.db, &state.tokens, &creds.email, &creds.password)?;
    json_response(StatusCode::OK, &session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::models::models::NewUser;
    use crate::users::register;

    fn setup() -> (Db, TokenService) {
        let db = Db::memory();
        register(
            &db,
            NewUser {
                name: "Ana Silva".into(),
                nick: "ana".into(),
                email: "ana@example.com".into(),
                password: "s3cret".into(),
            },
        )
        .unwrap();
        (db, TokenService::new(b"auth-test-secret"))
    }

    #[test]
    fn login_issues_a_token_for_the_account() {
        let (db, tokens) = setup();
        let session = login(&db, &tokens, "ana@example.com", "s3cret").unwrap();
        assert_eq!(
            tokens.extract_identity(&session.token).unwrap().as_str(),
            session.id
        );
    }

    #[test]
    fn every_login_failure_reads_the_same() {
        let (db, tokens) = setup();
        let wrong_password = login(&db, &tokens, "ana@example.com", "nope").unwrap_err();
        let unknown_email = login(&db, &tokens, "who@example.com", "s3cret").unwrap_err();

        assert_eq!(wrong_password.kind(), ErrorKind::Unauthenticated);
        assert_eq!(unknown_email.kind(), ErrorKind::Unauthenticated);
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }
}
