use http::StatusCode;
use spin_sdk::http::{Method, Request, Response};

use crate::config::AppConfig;
use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::middleware::{authenticated, logged};
use crate::models::models::Identity;
use crate::token::TokenService;
use crate::{auth, follow, posts, users};

/// Everything a request handler needs. Built once at startup; read-only.
pub struct AppState {
    pub db: Db,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(config: &AppConfig, db: Db) -> Self {
        Self {
            db,
            tokens: TokenService::new(&config.secret_key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Public {
    Health,
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protected<'a> {
    SearchUsers,
    GetUser(&'a str),
    UpdateUser(&'a str),
    DeleteUser(&'a str),
    Follow(&'a str),
    Unfollow(&'a str),
    Followers(&'a str),
    Following(&'a str),
    UpdatePassword(&'a str),
    UserPosts(&'a str),
    CreatePost,
    Feed,
    GetPost(&'a str),
    UpdatePost(&'a str),
    DeletePost(&'a str),
    Like(&'a str),
    Unlike(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Public(Public),
    Protected(Protected<'a>),
    NotFound,
}

pub fn resolve<'a>(method: &Method, path: &'a str) -> Route<'a> {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&'a str> = path.split('/').filter(|s| !s.is_empty()).collect();

    use Protected as P;
    match (method, segments.as_slice()) {
        (Method::Get, &["api", "health"]) => Route::Public(Public::Health),
        (Method::Post, &["api", "login"]) => Route::Public(Public::Login),
        (Method::Post, &["api", "user"]) => Route::Public(Public::Register),

        (Method::Get, &["api", "user"]) => Route::Protected(P::SearchUsers),
        (Method::Get, &["api", "user", id]) => Route::Protected(P::GetUser(id)),
        (Method::Put, &["api", "user", id]) => Route::Protected(P::UpdateUser(id)),
        (Method::Delete, &["api", "user", id]) => Route::Protected(P::DeleteUser(id)),
        (Method::Post, &["api", "user", id, "follow"]) => Route::Protected(P::Follow(id)),
        (Method::Post, &["api", "user", id, "unfollow"]) => Route::Protected(P::Unfollow(id)),
        (Method::Get, &["api", "user", id, "followers"]) => Route::Protected(P::Followers(id)),
        (Method::Get, &["api", "user", id, "following"]) => Route::Protected(P::Following(id)),
        (Method::Post, &["api", "user", id, "update-password"]) => {
            Route::Protected(P::UpdatePassword(id))
        }
        (Method::Get, &["api", "user", id, "posts"]) => Route::Protected(P::UserPosts(id)),

        (Method::Post, &["api", "post"]) => Route::Protected(P::CreatePost),
        (Method::Get, &["api", "post"]) => Route::Protected(P::Feed),
        (Method::Get, &["api", "post", id]) => Route::Protected(P::GetPost(id)),
        (Method::Put, &["api", "post", id]) => Route::Protected(P::UpdatePost(id)),
        (Method::Delete, &["api", "post", id]) => Route::Protected(P::DeletePost(id)),
        (Method::Post, &["api", "post", id, "like"]) => Route::Protected(P::Like(id)),
        (Method::Post, &["api", "post", id, "unlike"]) => Route::Protected(P::Unlike(id)),

        _ => Route::NotFound,
    }
}

/// Entry point shared by the Spin component and the native server.
pub fn dispatch(state: &AppState, req: Request) -> Response {
    logged(req, |req| match resolve(req.method(), req.path()) {
        Route::Public(route) => public(state, &req, route).unwrap_or_else(Response::from),
        Route::Protected(route) => {
            authenticated(&state.tokens, &req, |identity| protected(state, &req, identity, route))
        }
        Route::NotFound => not_found(),
    })
}

fn public(state: &AppState, req: &Request, route: Public) -> Result<Response, ApiError> {
    match route {
        Public::Health => health(),
        Public::Login => auth::login_user(state, req),
        Public::Register => users::create_user(state, req),
    }
}

fn protected(
    state: &AppState,
    req: &Request,
    identity: Identity,
    route: Protected<'_>,
) -> Result<Response, ApiError> {
    match route {
        Protected::SearchUsers => users::search_users(state, req),
        Protected::GetUser(id) => users::get_user(state, id),
        Protected::UpdateUser(id) => users::update_user(state, req, identity, id),
        Protected::DeleteUser(id) => users::delete_user(state, identity, id),
        Protected::Follow(id) => follow::handle_follow(state, identity, id),
        Protected::Unfollow(id) => follow::handle_unfollow(state, identity, id),
        Protected::Followers(id) => follow::get_followers_list(state, id),
        Protected::Following(id) => follow::get_followings_list(state, id),
        Protected::UpdatePassword(id) => users::update_password(state, req, identity, id),
        Protected::UserPosts(id) => posts::list_user_posts(state, id),
        Protected::CreatePost => posts::create_post(state, req, identity),
        Protected::Feed => posts::get_feed(state, identity),
        Protected::GetPost(id) => posts::get_post(state, id),
        Protected::UpdatePost(id) => posts::edit_post(state, req, identity, id),
        Protected::DeletePost(id) => posts::delete_post(state, identity, id),
        Protected::Like(id) => posts::like_post(state, id),
        Protected::Unlike(id) => posts::unlike_post(state, id),
    }
}

fn health() -> Result<Response, ApiError> {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

fn not_found() -> Response {
    ApiError::NotFound("No route found".to_string()).into()
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    const ID: &str = "3f2b8c1e-9a4d-4e6f-8b7a-1c2d3e4f5a6b";

    #[test]
    fn public_routes() {
        assert_eq!(resolve(&Method::Get, "/api/health"), Route::Public(Public::Health));
        assert_eq!(resolve(&Method::Post, "/api/login"), Route::Public(Public::Login));
        assert_eq!(resolve(&Method::Post, "/api/user"), Route::Public(Public::Register));
    }

    #[test]
    fn user_routes_carry_the_path_id() {
        let path = format!("/api/user/{}/update-password", ID);
        assert_eq!(
            resolve(&Method::Post, &path),
            Route::Protected(Protected::UpdatePassword(ID))
        );
        let path = format!("/api/user/{}", ID);
        assert_eq!(resolve(&Method::Delete, &path), Route::Protected(Protected::DeleteUser(ID)));
        assert_eq!(
            resolve(&Method::Get, "/api/user?search=ana"),
            Route::Protected(Protected::SearchUsers)
        );
    }

    #[test]
    fn post_routes() {
        assert_eq!(resolve(&Method::Get, "/api/post"), Route::Protected(Protected::Feed));
        assert_eq!(resolve(&Method::Post, "/api/post/"), Route::Protected(Protected::CreatePost));
        let path = format!("/api/post/{}/unlike", ID);
        assert_eq!(resolve(&Method::Post, &path), Route::Protected(Protected::Unlike(ID)));
    }

    #[test]
    fn unknown_paths_and_methods_are_not_found() {
        assert_eq!(resolve(&Method::Get, "/"), Route::NotFound);
        assert_eq!(resolve(&Method::Patch, "/api/post"), Route::NotFound);
        assert_eq!(resolve(&Method::Get, "/api/user/a/b/c"), Route::NotFound);
        assert_eq!(resolve(&Method::Get, "/api/login"), Route::NotFound);
    }

    #[test]
    fn unknown_route_answers_json_404() {
        let state = AppState {
            db: Db::memory(),
            tokens: TokenService::new(b"handlers-test-secret"),
        };
        let req = Request::builder().method(Method::Get).uri("/nope").build();
        let response = dispatch(&state, req);
        assert_eq!(*response.status(), 404);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "No route found");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejected_requests_are_still_logged() {
        let state = AppState {
            db: Db::memory(),
            tokens: TokenService::new(b"handlers-test-secret"),
        };
        let req = Request::builder()
            .method(Method::Get)
            .uri("/api/post")
            .header("authorization", "Bearer not.a.token")
            .build();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();
        let response = tracing::subscriber::with_default(subscriber, || dispatch(&state, req));

        assert_eq!(*response.status(), 401);
        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let received = log.find("request received").expect("request line logged");
        let rejected = log.find("authentication rejected").expect("rejection logged");
        assert!(received < rejected);
        assert!(log.contains("/api/post"));
    }
}
