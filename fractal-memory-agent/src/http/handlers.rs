//! `§6.1` endpoint handlers. Each is a thin translation between axum's
//! extractors and [`AgentFacade`]/[`fractal_memory_core::FractalMemory`]
//! calls — no retrieval or consolidation logic lives here.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fractal_memory_core::error::Error;
use fractal_memory_core::types::Tier;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Maps a core [`Error`] onto an HTTP status plus the `{error, code}` body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Cancelled => (StatusCode::GATEWAY_TIMEOUT, "cancelled"),
            Error::StoreUnavailable(_) | Error::RetrieverUnavailable(_) | Error::Io(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            Error::IntegrityError(_) | Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        (status, Json(ErrorBody { error: self.0.to_string(), code: code.to_string() })).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub context_count: usize,
    pub strategies_used: Vec<String>,
    pub processing_time_ms: u64,
}

pub async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<ChatResponse>, ApiError> {
    let turn = state.facade.process_turn(&state.user, &req.message).await?;
    Ok(Json(ChatResponse {
        response: turn.response,
        context_count: turn.context_count,
        strategies_used: turn.strategies_used,
        processing_time_ms: turn.processing_time_ms,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub l0_count: u64,
    pub l1_count: u64,
    pub l2_count: u64,
    pub l3_count: u64,
    pub last_consolidation: Option<String>,
}

pub async fn memory_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.facade.memory().get_stats(&state.user).await?;
    Ok(Json(StatsResponse {
        l0_count: stats.l0_size,
        l1_count: stats.l1_size,
        l2_count: stats.l2_size,
        l3_count: stats.l3_size,
        last_consolidation: stats.last_consolidation_at.map(|t| t.to_rfc3339()),
    }))
}

#[derive(Debug, Serialize)]
pub struct MemoryNode {
    pub id: String,
    pub label: String,
    pub content: String,
    pub level: String,
    pub importance: f32,
    pub created_at: String,
    pub connections: Vec<String>,
}

fn to_node(episode: fractal_memory_core::types::Episode) -> MemoryNode {
    let connections = episode
        .extra
        .get("constituent_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let label = episode.content.chars().take(60).collect::<String>();
    MemoryNode {
        id: episode.id,
        label,
        content: episode.content,
        level: episode.tier.as_source_tag().to_string(),
        importance: episode.importance,
        created_at: episode.created_at.to_rfc3339(),
        connections,
    }
}

const DUMP_LIMIT: usize = 200;

pub async fn memory_by_level(
    State(state): State<AppState>,
    Path(level): Path<String>,
) -> Result<Json<Vec<MemoryNode>>, ApiError> {
    let tiers: Vec<Tier> = match level.as_str() {
        "all" => vec![Tier::L0, Tier::L1, Tier::L2, Tier::L3],
        "l0" => vec![Tier::L0],
        "l1" => vec![Tier::L1],
        "l2" => vec![Tier::L2],
        "l3" => vec![Tier::L3],
        other => return Err(ApiError(Error::Validation(format!("unknown memory level {other:?}")))),
    };

    let mut nodes = Vec::new();
    for tier in tiers {
        let episodes = state.facade.memory().list_tier(&state.user, tier, DUMP_LIMIT).await?;
        nodes.extend(episodes.into_iter().map(to_node));
    }
    Ok(Json(nodes))
}

#[derive(Debug, Serialize)]
pub struct ConsolidateResponse {
    pub status: String,
    pub l0_to_l1: Option<u64>,
    pub l1_to_l2: Option<u64>,
    pub promoted: u64,
    pub decayed: u64,
    pub forgotten: u64,
}

pub async fn consolidate(State(state): State<AppState>) -> Result<Json<ConsolidateResponse>, ApiError> {
    let counters = state.facade.memory().consolidate(&state.user).await?;
    // `promoted` aggregates both the L0->L1 and L1->L2 steps (§4.3); the
    // wire model's per-step breakdown isn't tracked separately, so those
    // fields are left null rather than guessed.
    Ok(Json(ConsolidateResponse {
        status: "ok".to_string(),
        l0_to_l1: None,
        l1_to_l2: None,
        promoted: counters.promoted,
        decayed: counters.decayed,
        forgotten: counters.forgotten,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RememberRequest {
    pub content: String,
    pub importance: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct RememberResponse {
    pub status: String,
    pub id: String,
}

pub async fn remember(
    State(state): State<AppState>,
    Json(req): Json<RememberRequest>,
) -> Result<Json<RememberResponse>, ApiError> {
    let importance = req.importance.unwrap_or(0.5);
    let id = state.facade.memory().remember(&state.user, &req.content, importance, HashMap::new()).await?;
    Ok(Json(RememberResponse { status: "ok".to_string(), id }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HashMap<String, String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();
    let status = match state.facade.memory().get_stats(&state.user).await {
        Ok(_) => {
            components.insert("memory".to_string(), "ok".to_string());
            "ok"
        }
        Err(e) => {
            components.insert("memory".to_string(), format!("error: {e}"));
            if e.is_recoverable() {
                "degraded"
            } else {
                "unhealthy"
            }
        }
    };
    Json(HealthResponse { status, components })
}
