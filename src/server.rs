use crate::atlas::{Atlas, CountryReport};
use crate::config::AppConfig;
use crate::legend::{legend_for, Legend};
use crate::render::choropleth;
use crate::state::ViewState;
use crate::types::Mode;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct AppState {
    pub atlas: Atlas,
    pub config: AppConfig,
    pub view: RwLock<ViewState>,
}

impl AppState {
    pub fn new(config: AppConfig, atlas: Atlas) -> Self {
        let view = RwLock::new(ViewState::new(&config.display.modes));
        Self { atlas, config, view }
    }

    /// The requested mode, or the current one when the request names none.
    async fn resolve_mode(&self, requested: Option<Mode>) -> Mode {
        match requested {
            Some(mode) => mode,
            None => self.view.read().await.mode,
        }
    }
}

#[derive(Deserialize)]
pub struct ModeParams {
    mode: Option<Mode>,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
    mode: Option<Mode>,
}

#[derive(Serialize)]
pub struct ModeResponse {
    mode: Mode,
    cycle: Vec<Mode>,
    snapshot_date: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let tile_service = ServeDir::new(state.config.output.tile_dir());
    let static_service = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/mode", get(mode_handler))
        .route("/api/mode/toggle", post(toggle_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/country/:code", get(country_handler))
        .route("/api/query", get(query_handler))
        .route("/api/choropleth", get(choropleth_handler))
        .nest_service("/tiles", tile_service)
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, atlas: Atlas) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, atlas));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn mode_response(state: &AppState, view: &ViewState) -> ModeResponse {
    ModeResponse {
        mode: view.mode,
        cycle: view.cycle.clone(),
        snapshot_date: state.atlas.snapshot_date().map(str::to_string),
    }
}

async fn mode_handler(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    let view = state.view.read().await.clone();
    Json(mode_response(&state, &view))
}

async fn toggle_handler(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    let view = {
        let mut guard = state.view.write().await;
        *guard = guard.toggled();
        guard.clone()
    };
    info!("Display mode is now {}", view.mode);
    Json(mode_response(&state, &view))
}

async fn legend_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ModeParams>,
) -> Json<Legend> {
    let mode = state.resolve_mode(params.mode).await;
    Json(legend_for(mode))
}

async fn country_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<ModeParams>,
) -> Result<Json<CountryReport>, StatusCode> {
    let mode = state.resolve_mode(params.mode).await;
    let country = state.atlas.country(&code).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(state.atlas.report(mode, country)))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<CountryReport>> {
    let mode = state.resolve_mode(params.mode).await;
    Json(
        state
            .atlas
            .locate(params.lon, params.lat)
            .map(|country| state.atlas.report(mode, country)),
    )
}

async fn choropleth_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ModeParams>,
) -> Json<FeatureCollection> {
    let mode = state.resolve_mode(params.mode).await;
    Json(choropleth(&state.atlas, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::fixtures::sample_atlas;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let config = AppConfig::from_toml_str(
            r#"
            [input]
            covid = "covid.json"
            population = "pop.json"
            boundaries = "countries.geo.json"

            [display]
            modes = ["covid", "population", "fatality"]
            "#,
        )
        .unwrap();
        Arc::new(AppState::new(config, sample_atlas()))
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = router(state.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn country_report_uses_current_mode() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/api/country/AAA").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "covid");
        assert_eq!(body["fill"], "#f3903f");
        assert_eq!(body["tooltip"]["kind"], "covid");
    }

    #[tokio::test]
    async fn country_report_with_explicit_mode() {
        let state = test_state();
        let (_, body) = call(&state, Method::GET, "/api/country/BBB?mode=population").await;
        assert_eq!(body["class"], "bucket-4");
        let (_, body) = call(&state, Method::GET, "/api/country/BBB?mode=covid").await;
        assert_eq!(body["class"], "no-data");
        assert_eq!(body["tooltip"]["kind"], "no_data");
    }

    #[tokio::test]
    async fn unknown_country_is_not_found() {
        let state = test_state();
        let (status, _) = call(&state, Method::GET, "/api/country/XYZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_mode_is_bad_request() {
        let state = test_state();
        let (status, _) = call(&state, Method::GET, "/api/legend?mode=deaths").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn toggle_advances_mode() {
        let state = test_state();
        let (_, body) = call(&state, Method::GET, "/api/mode").await;
        assert_eq!(body["mode"], "covid");
        assert_eq!(body["snapshot_date"], "2022-04-16");

        let (_, body) = call(&state, Method::POST, "/api/mode/toggle").await;
        assert_eq!(body["mode"], "population");

        let (_, body) = call(&state, Method::GET, "/api/legend").await;
        assert_eq!(body["title"], "Urban Population Ratio");

        call(&state, Method::POST, "/api/mode/toggle").await;
        let (_, body) = call(&state, Method::POST, "/api/mode/toggle").await;
        assert_eq!(body["mode"], "covid");
    }

    #[tokio::test]
    async fn query_by_position() {
        let state = test_state();
        let (_, body) = call(&state, Method::GET, "/api/query?lat=5&lon=15&mode=fatality").await;
        assert_eq!(body["code"], "BBB");
        assert_eq!(body["fill"], Value::Null);

        let (_, body) = call(&state, Method::GET, "/api/query?lat=-40&lon=-60").await;
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn choropleth_collection() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/api/choropleth?mode=population").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().map(Vec::len), Some(3));
    }
}
