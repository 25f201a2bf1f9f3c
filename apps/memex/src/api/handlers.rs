//! # API Endpoint Handlers
//!
//! Each handler takes the engine lock, calls one engine operation and maps
//! the result to JSON. Writers take the write lock.

use super::{
    AppState,
    types::{
        ContestResponse, ContestedPairJson, EntityJson, EntityRequest, ErrorResponse,
        EvidenceJson, EvidenceRequest, HealthResponse, IdResponse, IngestRequest, IngestResponse,
        NeighborhoodRequest, NeighborhoodResponse, RelationshipJson, RelationshipRequest,
        SearchParams, StatsResponse, attributes_from_json,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use memex_core::{
    EntityId, EntityType, EvidenceId, MemexError, RelationshipId, SourceType,
    primitives::DEFAULT_SEARCH_LIMIT,
};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// An engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MemexError);

impl From<MemexError> for ApiError {
    fn from(e: MemexError) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// Validation → 400, NotFound → 404, Conflict → 409, anything else → 500.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            MemexError::Validation(_) => StatusCode::BAD_REQUEST,
            MemexError::NotFound { .. } => StatusCode::NOT_FOUND,
            MemexError::Conflict(_) => StatusCode::CONFLICT,
            MemexError::Storage(_) | MemexError::Serialization(_) | MemexError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// HEALTH / STATS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Graph statistics.
pub async fn stats_handler(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let graph = state.graph.read().await;
    let stats = graph.stats()?;
    Ok(Json(StatsResponse::from(&stats)))
}

// =============================================================================
// ENTITIES
// =============================================================================

pub async fn upsert_entity_handler(
    State(state): State<AppState>,
    Json(request): Json<EntityRequest>,
) -> ApiResult<IdResponse> {
    let entity_type: EntityType = request.entity_type.parse()?;
    let attributes = attributes_from_json(request.attributes);
    let mut graph = state.graph.write().await;
    let id = graph.upsert_entity(entity_type, &request.name, attributes)?;
    Ok(Json(IdResponse { id: id.0 }))
}

pub async fn get_entity_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<EntityJson> {
    let graph = state.graph.read().await;
    let entity = graph
        .entity(EntityId(id))?
        .ok_or_else(|| MemexError::entity_not_found(EntityId(id)))?;
    Ok(Json(EntityJson::from(&entity)))
}

pub async fn search_entities_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<EntityJson>> {
    let graph = state.graph.read().await;
    let hits =
        graph.search_entities(&params.q, params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))?;
    Ok(Json(hits.iter().map(EntityJson::from).collect()))
}

// =============================================================================
// EVIDENCE
// =============================================================================

pub async fn upsert_evidence_handler(
    State(state): State<AppState>,
    Json(request): Json<EvidenceRequest>,
) -> ApiResult<IdResponse> {
    let source_type: SourceType = request.source_type.parse()?;
    let mut graph = state.graph.write().await;
    let id = graph.upsert_evidence(source_type, &request.source_id, &request.excerpt)?;
    Ok(Json(IdResponse { id: id.0 }))
}

pub async fn get_evidence_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<EvidenceJson> {
    let graph = state.graph.read().await;
    let evidence = graph
        .evidence(EvidenceId(id))?
        .ok_or_else(|| MemexError::evidence_not_found(EvidenceId(id)))?;
    Ok(Json(EvidenceJson::from(&evidence)))
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

pub async fn upsert_relationship_handler(
    State(state): State<AppState>,
    Json(request): Json<RelationshipRequest>,
) -> ApiResult<IdResponse> {
    let claim = request.to_claim()?;
    let mut graph = state.graph.write().await;
    let id = graph.upsert_relationship(claim)?;
    Ok(Json(IdResponse { id: id.0 }))
}

pub async fn get_relationship_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<RelationshipJson> {
    let graph = state.graph.read().await;
    let rel = graph
        .relationship(RelationshipId(id))?
        .ok_or_else(|| MemexError::relationship_not_found(RelationshipId(id)))?;
    Ok(Json(RelationshipJson::from(&rel)))
}

/// The body is the superseding claim; its `status` is ignored.
pub async fn contest_relationship_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<RelationshipRequest>,
) -> ApiResult<ContestResponse> {
    let claim = request.to_claim()?;
    let mut graph = state.graph.write().await;
    let outcome = graph.contest_relationship(RelationshipId(id), claim)?;
    Ok(Json(ContestResponse::from(outcome)))
}

pub async fn retract_relationship_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<IdResponse> {
    let mut graph = state.graph.write().await;
    let retracted = graph.retract_relationship(RelationshipId(id))?;
    Ok(Json(IdResponse { id: retracted.0 }))
}

pub async fn contested_handler(State(state): State<AppState>) -> ApiResult<Vec<ContestedPairJson>> {
    let graph = state.graph.read().await;
    let pairs = graph.contested_relationships()?;
    Ok(Json(pairs.iter().map(ContestedPairJson::from).collect()))
}

// =============================================================================
// NEIGHBORHOOD / INGEST
// =============================================================================

pub async fn neighborhood_handler(
    State(state): State<AppState>,
    Json(request): Json<NeighborhoodRequest>,
) -> ApiResult<NeighborhoodResponse> {
    let query = request.to_query()?;
    let graph = state.graph.read().await;
    let neighborhood = graph.neighborhood(&query)?;
    Ok(Json(NeighborhoodResponse::from(&neighborhood)))
}

pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<IngestResponse> {
    let batch = request.to_batch();
    let mut graph = state.graph.write().await;
    let report = graph.ingest_batch(&batch)?;
    tracing::info!(
        facts = batch.len(),
        entities_created = report.entities_created,
        relationships_created = report.relationships_created,
        "batch ingested"
    );
    Ok(Json(IngestResponse::from(&report)))
}
