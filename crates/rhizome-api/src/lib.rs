pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/bundles", post(handlers::handle_create_bundle).get(handlers::handle_list_bundles))
        .route("/bundles/{bid}", get(handlers::handle_get_bundle))
        .route("/bundles/{bid}/journal/append", post(handlers::handle_journal_append))
        .route("/store/cleanup", post(handlers::handle_store_cleanup))
        .route("/link/status", get(handlers::handle_link_status))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "rhizome API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
