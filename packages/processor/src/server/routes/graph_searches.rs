//! Graph search endpoints.
//!
//! Every body carries `status: "ok" | "ko"`. Domain failures are reported in
//! the body with HTTP 200, as existing clients expect.

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::common::{GraphSearchId, ProcessorError, ResponseStatus};
use crate::domains::graph_searches::{GraphSearch, GraphSearchFilter};
use crate::server::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateGraphSearchRequest {
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Serialize)]
pub struct GraphSearchResponse {
    status: ResponseStatus,
    search: Option<GraphSearch>,
}

#[derive(Serialize)]
pub struct GraphSearchesResponse {
    status: ResponseStatus,
    searches: Vec<GraphSearch>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    status: ResponseStatus,
    message: String,
    error: String,
}

fn ok(search: Option<GraphSearch>) -> Response {
    Json(GraphSearchResponse {
        status: ResponseStatus::Ok,
        search,
    })
    .into_response()
}

fn ko(message: String, error: ProcessorError) -> Response {
    warn!(message = %message, error = %error, "Graph search request failed");
    Json(ErrorResponse {
        status: ResponseStatus::Ko,
        message,
        error: error.to_string(),
    })
    .into_response()
}

/// Ids are accepted wherever a name is.
fn filter_for(search: &str) -> GraphSearchFilter {
    match GraphSearchId::parse(search) {
        Ok(id) => GraphSearchFilter::Id(id),
        Err(_) => GraphSearchFilter::Name(search.to_string()),
    }
}

/// `POST /graph-search/:search` - create, or return the existing search.
pub async fn create_graph_search_handler(
    Extension(state): Extension<AppState>,
    Path(search): Path<String>,
    body: Option<Json<CreateGraphSearchRequest>>,
) -> Response {
    let options = body
        .and_then(|Json(request)| request.options)
        .unwrap_or_else(|| Value::Object(Default::default()));

    match state
        .graph_searches
        .create_or_get(&search, &options, &state.invalid_mimes)
        .await
    {
        Ok((graph_search, _created)) => ok(Some(graph_search)),
        Err(e) => ko(format!("Graph not created for {search}"), e),
    }
}

/// `GET /graph-search/:search`
pub async fn get_graph_search_handler(
    Extension(state): Extension<AppState>,
    Path(search): Path<String>,
) -> Response {
    match state.graph_searches.get(&filter_for(&search)).await {
        Ok(graph_search) => ok(graph_search),
        Err(e) => ko(format!("Graph not found for {search}"), e),
    }
}

/// `PUT /graph-search/:search` - re-queue as a fresh search.
pub async fn refresh_graph_search_handler(
    Extension(state): Extension<AppState>,
    Path(search): Path<String>,
) -> Response {
    match state.graph_searches.refresh(&filter_for(&search)).await {
        Ok(graph_search) => ok(Some(graph_search)),
        Err(e) => ko(format!("Graph not found for {search}"), e),
    }
}

/// `GET /graph-searches`
pub async fn list_graph_searches_handler(Extension(state): Extension<AppState>) -> Response {
    match state.graph_searches.list().await {
        Ok(searches) => Json(GraphSearchesResponse {
            status: ResponseStatus::Ok,
            searches,
        })
        .into_response(),
        Err(e) => ko("Graphs not found".to_string(), e),
    }
}
