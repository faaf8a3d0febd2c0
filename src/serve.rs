use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::export::Bounds;
use crate::graph::{ArchitectureGraph, FlowEdge, FlowNode, Point};
use crate::layout::{LayoutConfig, RankDir};
use crate::metadata::{ServiceMetadata, canonical_service_id, get_service_metadata};
use crate::render::{CANVAS_BACKGROUND, DiagramRenderer, Interaction, Viewport};

const DEFAULT_CANVAS_WIDTH: f32 = 1200.0;
const DEFAULT_CANVAS_HEIGHT: f32 = 800.0;
const MINIMAP_WIDTH: f32 = 200.0;
const MINIMAP_HEIGHT: f32 = 150.0;

/// Arguments for the read-only architecture preview server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cloudiverse serve",
    about = "Serve a live, read-only preview of an architecture JSON file."
)]
pub struct ServeArgs {
    /// Path to the architecture JSON that should be served.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Initial layout direction (LR, TB, RL or BT).
    #[arg(long = "rank-dir", default_value = "LR")]
    pub rank_dir: RankDir,

    /// Canvas background for SVG previews.
    #[arg(long = "background-color", default_value = CANVAS_BACKGROUND)]
    pub background_color: String,
}

struct ServeState {
    source_path: PathBuf,
    background: String,
    layout: RwLock<LayoutConfig>,
}

impl ServeState {
    /// Re-reads the source on every call so edits to the file show up on the
    /// next request.
    async fn renderer(&self) -> Result<DiagramRenderer> {
        let contents = tokio::fs::read_to_string(&self.source_path)
            .await
            .with_context(|| format!("failed to read '{}'", self.source_path.display()))?;
        let architecture = ArchitectureGraph::from_json(&contents)
            .with_context(|| format!("failed to parse '{}'", self.source_path.display()))?;
        let config = *self.layout.read().await;
        Ok(DiagramRenderer::from_architecture(&architecture, &config))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagramPayload {
    source_path: String,
    rank_dir: RankDir,
    interaction: Interaction,
    bounds: Bounds,
    viewport: Viewport,
    node_width: f32,
    node_height: f32,
    nodes: Vec<FlowNode>,
    edges: Vec<EdgePayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EdgePayload {
    #[serde(flatten)]
    edge: FlowEdge,
    points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CanvasQuery {
    width: Option<f32>,
    height: Option<f32>,
}

impl CanvasQuery {
    fn size(self) -> (f32, f32) {
        let pick = |value: Option<f32>, fallback: f32| {
            value
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(fallback)
        };
        (
            pick(self.width, DEFAULT_CANVAS_WIDTH),
            pick(self.height, DEFAULT_CANVAS_HEIGHT),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutUpdate {
    rank_dir: RankDir,
}

#[derive(Debug, Serialize)]
struct ServiceLookup {
    query: String,
    canonical: Option<&'static str>,
    metadata: &'static ServiceMetadata,
}

/// Builds the preview router without binding a socket.
pub fn router(args: &ServeArgs) -> Router {
    let state = Arc::new(ServeState {
        source_path: args.input.clone(),
        background: args.background_color.clone(),
        layout: RwLock::new(LayoutConfig {
            rank_dir: args.rank_dir,
            ..LayoutConfig::default()
        }),
    });

    Router::new()
        .route("/api/diagram", get(get_diagram))
        .route("/api/diagram/svg", get(get_svg))
        .route("/api/diagram/minimap", get(get_minimap))
        .route("/api/diagram/png", get(get_png))
        .route("/api/diagram/layout", get(get_layout).put(put_layout))
        .route("/api/services/:name", get(get_service))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    if !args.input.is_file() {
        anyhow::bail!("input file '{}' does not exist", args.input.display());
    }

    let app = router(&args);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    log::info!(addr:% = addr, input:% = args.input.display(); "preview server started");
    println!("cloudiverse preview listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn get_diagram(
    State(state): State<Arc<ServeState>>,
    Query(canvas): Query<CanvasQuery>,
) -> Result<Json<DiagramPayload>, (StatusCode, String)> {
    let renderer = state.renderer().await.map_err(internal_error)?;
    let (width, height) = canvas.size();
    let laid_out = renderer.laid_out();

    let edges = laid_out
        .graph
        .edges
        .iter()
        .filter_map(|edge| {
            renderer.edge_route(edge).map(|points| EdgePayload {
                edge: edge.clone(),
                points,
            })
        })
        .collect();

    Ok(Json(DiagramPayload {
        source_path: state.source_path.display().to_string(),
        rank_dir: laid_out.rank_dir,
        interaction: renderer.interaction(),
        bounds: renderer.bounds(),
        viewport: renderer.fit_view(width, height),
        node_width: laid_out.node_width,
        node_height: laid_out.node_height,
        nodes: laid_out.graph.nodes.clone(),
        edges,
    }))
}

async fn get_svg(
    State(state): State<Arc<ServeState>>,
    Query(canvas): Query<CanvasQuery>,
) -> Result<Response, (StatusCode, String)> {
    let renderer = state.renderer().await.map_err(internal_error)?;
    let (width, height) = canvas.size();
    let viewport = renderer.fit_view(width, height);
    let svg = renderer
        .render_svg(&viewport, width, height, &state.background)
        .map_err(|err| internal_error(err.into()))?;
    Ok(svg_response(svg))
}

async fn get_minimap(
    State(state): State<Arc<ServeState>>,
    Query(canvas): Query<CanvasQuery>,
) -> Result<Response, (StatusCode, String)> {
    let renderer = state.renderer().await.map_err(internal_error)?;
    let (width, height) = canvas.size();
    let viewport = renderer.fit_view(width, height);
    let svg = renderer
        .render_minimap(MINIMAP_WIDTH, MINIMAP_HEIGHT, Some((&viewport, width, height)))
        .map_err(|err| internal_error(err.into()))?;
    Ok(svg_response(svg))
}

async fn get_png(State(state): State<Arc<ServeState>>) -> Result<Response, (StatusCode, String)> {
    let renderer = state.renderer().await.map_err(internal_error)?;
    // Rasterization is CPU bound; keep it off the async workers.
    let captured = tokio::task::spawn_blocking(move || renderer.capture_screenshot())
        .await
        .map_err(|err| internal_error(err.into()))?;
    let Some(screenshot) = captured.map_err(|err| internal_error(err.into()))? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let mut response = Response::new(screenshot.png.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    Ok(response)
}

async fn get_layout(State(state): State<Arc<ServeState>>) -> Json<LayoutConfig> {
    Json(*state.layout.read().await)
}

async fn put_layout(
    State(state): State<Arc<ServeState>>,
    Json(update): Json<LayoutUpdate>,
) -> StatusCode {
    state.layout.write().await.rank_dir = update.rank_dir;
    log::debug!(rank_dir:? = update.rank_dir; "layout direction changed");
    StatusCode::NO_CONTENT
}

async fn get_service(AxumPath(name): AxumPath<String>) -> Json<ServiceLookup> {
    Json(ServiceLookup {
        canonical: canonical_service_id(&name),
        metadata: get_service_metadata(&name),
        query: name,
    })
}

fn svg_response(svg: String) -> Response {
    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    response
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    log::error!(error:% = err; "preview request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
