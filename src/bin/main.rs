#[cfg(not(target_arch = "wasm32"))]
mod native {
    use actix_web::{web, App, HttpServer};
    use tracing_subscriber::EnvFilter;

    use socialnets::config::AppConfig;
    use socialnets::core::db::Db;
    use socialnets::handlers::AppState;
    use socialnets::server::handle_all;

    pub async fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("socialnets=info")),
            )
            .init();

        let config = AppConfig::from_env()?;
        tracing::info!(?config, "configuration loaded");

        let state = web::Data::new(AppState::new(&config, Db::memory()));
        tracing::info!("Server listening on http://{}:{}", config.host, config.port);

        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind((config.host.as_str(), config.port))?
        .run()
        .await?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
