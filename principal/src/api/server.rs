use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::Router;
use models::models::routing::RouteKey;
use models::models::settings::Settings;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::auth::TokenAuthority;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;

/// Shared application state handed to every handler.
pub struct AppState {
    pub settings: Settings,
    pub router: RouteKey,
    pub registry: Registry,
    pub dispatcher: Dispatcher,
    pub tokens: TokenAuthority,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/token", post(handlers::login))
        .route("/create-instances/", post(handlers::create_instances))
        .route("/terminate-namespace/", post(handlers::terminate_namespace))
        .route(
            "/create_pods/",
            get(handlers::create_pods).post(handlers::create_pods),
        )
        .route("/task/:task_id", get(handlers::task_status))
        .route("/worker-info/", post(handlers::worker_info))
        .route("/worker-ip/", post(handlers::worker_ip))
        .route("/worker-usage/", post(handlers::worker_usage))
        .route("/plan-placement/", post(handlers::plan_placement))
        .route("/nodes/", get(handlers::list_nodes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(Extension(state))
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr =
        format!("{}:{}", state.settings.api.host, state.settings.api.port).parse()?;
    let app = router(Arc::new(state));
    tracing::info!(%addr, "dispatcher API listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
