//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::graph_searches::GraphSearchManager;
use crate::kernel::ServerDeps;
use crate::server::routes::{
    create_graph_search_handler, get_graph_search_handler, health_handler,
    list_graph_searches_handler, refresh_graph_search_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    pub graph_searches: GraphSearchManager,
    /// MIME prefixes rejected when creating URL searches
    pub invalid_mimes: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(deps: ServerDeps, processor_id: &str, invalid_mimes: Vec<String>) -> Self {
        Self {
            graph_searches: deps.graph_search_manager(processor_id),
            deps,
            invalid_mimes: Arc::new(invalid_mimes),
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route(
            "/graph-search/:search",
            get(get_graph_search_handler)
                .post(create_graph_search_handler)
                .put(refresh_graph_search_handler),
        )
        .route("/graph-searches", get(list_graph_searches_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
