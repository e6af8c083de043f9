//! Thin HTTP surface over the coordinator, matching the documented wire
//! contract for frontend collaborators: external field names (`targetId`,
//! `chunkX`/`chunkY`, `seed`) differ from the internal
//! `focalId`/`x`/`y`/`globalSeed` names the coordinator uses, and responses
//! wrap the core result in a `{success, meta, data, responseTime}` envelope.
//! This module is the translation boundary; the coordinator itself stays
//! transport-agnostic: parse a request, dispatch to the engine, serialize
//! the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::coordinator::{
    ChunkCoord, ChunkRequest, ChunkResponse, Engine, MultiChunkRequest, MultiChunkResponse,
    ResultItem,
};
use crate::error::EngineError;
use crate::sampler::Weights;

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    kind: &'static str,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let kind = self.kind();
        error!(%kind, error = %self, "request failed");
        (
            status,
            Json(ErrorBody {
                success: false,
                error: self.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct ChunkXY {
    x: i32,
    y: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireChunkMeta {
    target_id: i32,
    chunk: ChunkXY,
    r: f64,
    theta: f64,
    t: f64,
    weights: Weights,
    seed: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireChunkResponse {
    success: bool,
    meta: WireChunkMeta,
    data: Vec<ResultItem>,
    response_time: u128,
}

fn to_wire_chunk_response(resp: ChunkResponse, elapsed_ms: u128) -> WireChunkResponse {
    WireChunkResponse {
        success: true,
        meta: WireChunkMeta {
            target_id: resp.meta.target_id,
            chunk: ChunkXY {
                x: resp.meta.x,
                y: resp.meta.y,
            },
            r: resp.meta.r,
            theta: resp.meta.theta,
            t: resp.meta.t,
            weights: resp.meta.weights,
            seed: resp.meta.seed,
        },
        data: resp.data,
        response_time: elapsed_ms,
    }
}

#[derive(Debug, Deserialize)]
struct FieldChunkQuery {
    #[serde(rename = "targetId")]
    target_id: i32,
    #[serde(rename = "chunkX")]
    chunk_x: i32,
    #[serde(rename = "chunkY")]
    chunk_y: i32,
    seed: Option<u32>,
    count: Option<i64>,
    exclude: Option<String>,
}

async fn get_field_chunk(
    State(engine): State<Arc<Engine>>,
    Query(q): Query<FieldChunkQuery>,
) -> Result<Json<WireChunkResponse>, EngineError> {
    let started = Instant::now();
    let req = ChunkRequest::new(
        q.target_id,
        q.chunk_x,
        q.chunk_y,
        q.seed,
        q.count,
        q.exclude.as_deref(),
        engine.config.default_count,
    )?;
    let resp = engine.single_chunk(&req).await?;
    Ok(Json(to_wire_chunk_response(resp, started.elapsed().as_millis())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldChunksBody {
    target_id: i32,
    chunks: Vec<ChunkCoordBody>,
    count: Option<i64>,
    seed: Option<u32>,
    #[serde(default)]
    exclude_ids: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct ChunkCoordBody {
    x: i32,
    y: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMultiChunkMeta {
    target_id: i32,
    total_chunks: usize,
    global_excludes: Vec<i32>,
    seed: u32,
    t: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMultiChunkEntry {
    chunk: ChunkXY,
    artworks: Vec<ResultItem>,
    meta: WireChunkMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMultiChunkResponse {
    success: bool,
    meta: WireMultiChunkMeta,
    data: HashMap<String, WireMultiChunkEntry>,
    response_time: u128,
}

fn to_wire_multi_chunk_response(
    resp: MultiChunkResponse,
    elapsed_ms: u128,
) -> WireMultiChunkResponse {
    // Chunks are sorted by r ascending; the closest chunk's t carries the
    // response-level meta.t.
    let t = resp
        .chunks
        .iter()
        .min_by(|(_, a), (_, b)| a.meta.r.total_cmp(&b.meta.r))
        .map(|(_, chunk)| chunk.meta.t)
        .unwrap_or(0.0);

    let data = resp
        .chunks
        .into_iter()
        .map(|(key, chunk)| {
            (
                key,
                WireMultiChunkEntry {
                    chunk: ChunkXY {
                        x: chunk.meta.x,
                        y: chunk.meta.y,
                    },
                    meta: WireChunkMeta {
                        target_id: chunk.meta.target_id,
                        chunk: ChunkXY {
                            x: chunk.meta.x,
                            y: chunk.meta.y,
                        },
                        r: chunk.meta.r,
                        theta: chunk.meta.theta,
                        t: chunk.meta.t,
                        weights: chunk.meta.weights,
                        seed: chunk.meta.seed,
                    },
                    artworks: chunk.data,
                },
            )
        })
        .collect();

    WireMultiChunkResponse {
        success: true,
        meta: WireMultiChunkMeta {
            target_id: resp.target_id,
            total_chunks: resp.total_chunks,
            global_excludes: resp.excluded_ids,
            seed: resp.seed,
            t,
        },
        data,
        response_time: elapsed_ms,
    }
}

async fn post_field_chunks(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<FieldChunksBody>,
) -> Result<Json<WireMultiChunkResponse>, EngineError> {
    let started = Instant::now();
    let chunks: Vec<ChunkCoord> = body
        .chunks
        .into_iter()
        .map(|c| ChunkCoord { x: c.x, y: c.y })
        .collect();
    let exclude_ids: std::collections::HashSet<i32> = body.exclude_ids.into_iter().collect();
    let req = MultiChunkRequest::new(
        body.target_id,
        chunks,
        body.seed,
        body.count,
        exclude_ids,
        engine.config.default_count,
    )?;
    let resp = engine.multi_chunk(&req).await?;
    Ok(Json(to_wire_multi_chunk_response(
        resp,
        started.elapsed().as_millis(),
    )))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/artworks/field-chunk", get(get_field_chunk))
        .route("/api/artworks/field-chunks", post(post_field_chunks))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Binds and serves the router on `engine.config.listen_addr` until the
/// process is interrupted.
pub async fn serve(engine: Engine) -> anyhow::Result<()> {
    let addr = engine.config.listen_addr.clone();
    let app = router(Arc::new(engine));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "field sampling engine listening");
    axum::serve(listener, app).await?;
    Ok(())
}
