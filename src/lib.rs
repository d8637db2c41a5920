pub mod auth;
pub mod config;
pub mod core;
pub mod crypt;
pub mod follow;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod posts;
pub mod token;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    use crate::config::AppConfig;
    use crate::core::db::Db;
    use crate::handlers::{dispatch, AppState};

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let config = AppConfig::from_env()?;
        let state = AppState::new(&config, Db::spin());
        Ok(dispatch(&state, req))
    }
}
