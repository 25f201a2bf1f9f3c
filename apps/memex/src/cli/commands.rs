//! # CLI Command Implementations

use crate::api::{
    self, Engine,
    types::{
        ContestedPairJson, EntityJson, IngestRequest, IngestResponse, NeighborhoodRequest,
        NeighborhoodResponse, StatsResponse,
    },
};
use crate::config::{Backend, MemexConfig};
use memex_core::{
    EntityId, KnowledgeGraph, MemexError, RelationshipId, primitives::DEFAULT_SEARCH_LIMIT,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum size of an ingest file (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Resolve `path` to an existing regular file no larger than `max_size`.
fn validate_input_file(path: &Path, max_size: u64) -> Result<PathBuf, MemexError> {
    let canonical = path.canonicalize().map_err(|e| {
        MemexError::Io(format!("invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(MemexError::Io(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }

    let size = std::fs::metadata(&canonical)
        .map_err(|e| MemexError::Io(format!("cannot read file metadata: {}", e)))?
        .len();
    if size > max_size {
        return Err(MemexError::Validation(format!(
            "file size {} bytes exceeds maximum of {} bytes",
            size, max_size
        )));
    }
    Ok(canonical)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Open the configured backend with the configured engine settings.
pub fn open_graph(config: &MemexConfig) -> Result<Engine, MemexError> {
    if config.storage.backend == Backend::Memory {
        tracing::warn!("memory backend: nothing will be persisted");
    }
    let store = config.storage.open()?;
    Ok(KnowledgeGraph::new(store).with_config(config.engine.clone()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), MemexError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| MemexError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn print_entity(e: &EntityJson) {
    println!("[{}] {} {} ({})", e.id, e.entity_type, e.name, e.canonical_key);
    for (key, value) in &e.attributes {
        println!("      {}: {}", key, value);
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(config: &MemexConfig, json_mode: bool, force: bool) -> Result<(), MemexError> {
    let path = &config.storage.path;
    if config.storage.backend == Backend::Redb && path.exists() {
        if !force {
            return Err(MemexError::Validation(format!(
                "database '{}' already exists; use --force to replace it",
                path.display()
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| MemexError::Io(format!("cannot remove '{}': {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "existing database removed");
    }

    let graph = open_graph(config)?;
    let persistent = graph.store().is_persistent();

    if json_mode {
        return print_json(&serde_json::json!({
            "database": path.to_string_lossy(),
            "backend": config.storage.backend.as_str(),
            "persistent": persistent,
        }));
    }
    if persistent {
        println!("Initialized new redb database at {}", path.display());
    } else {
        println!("Memory backend selected; nothing to initialize on disk");
    }
    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// Apply a JSON fact batch from `file`.
pub fn cmd_ingest(config: &MemexConfig, json_mode: bool, file: &Path) -> Result<(), MemexError> {
    let path = validate_input_file(file, MAX_INGEST_FILE_SIZE)?;
    let contents = std::fs::read(&path)
        .map_err(|e| MemexError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
    let request: IngestRequest = serde_json::from_slice(&contents)
        .map_err(|e| MemexError::Validation(format!("invalid fact batch: {}", e)))?;
    let batch = request.to_batch();

    tracing::info!(file = %path.display(), facts = batch.len(), "ingesting fact batch");

    let mut graph = open_graph(config)?;
    let report = graph.ingest_batch(&batch)?;
    let response = IngestResponse::from(&report);

    if json_mode {
        return print_json(&response);
    }
    println!("Ingested {} facts", batch.len());
    println!(
        "Entities:      {} created, {} merged",
        response.entities_created, response.entities_merged
    );
    println!("Evidence:      {} recorded", response.evidence_ids.len());
    println!(
        "Relationships: {} created, {} reinforced",
        response.relationships_created, response.relationships_reinforced
    );
    Ok(())
}

// =============================================================================
// ENTITY COMMAND
// =============================================================================

/// Lookup by id, or search by name.
pub fn cmd_entity(
    config: &MemexConfig,
    json_mode: bool,
    id: Option<u64>,
    search: Option<&str>,
    limit: Option<usize>,
) -> Result<(), MemexError> {
    let graph = open_graph(config)?;

    let entities: Vec<EntityJson> = match (id, search) {
        (Some(id), _) => {
            let entity = graph
                .entity(EntityId(id))?
                .ok_or_else(|| MemexError::entity_not_found(EntityId(id)))?;
            vec![EntityJson::from(&entity)]
        }
        (None, Some(query)) => graph
            .search_entities(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))?
            .iter()
            .map(EntityJson::from)
            .collect(),
        (None, None) => {
            return Err(MemexError::Validation(
                "either --id or --search is required".to_string(),
            ));
        }
    };

    if json_mode {
        return print_json(&entities);
    }
    if entities.is_empty() {
        println!("No matching entities");
    }
    for e in &entities {
        print_entity(e);
    }
    Ok(())
}

// =============================================================================
// NEIGHBORHOOD COMMAND
// =============================================================================

/// Arguments of `memex neighborhood`.
#[derive(Debug, Clone)]
pub struct NeighborhoodArgs {
    pub center: u64,
    pub depth: usize,
    pub limit: Option<usize>,
    pub min_confidence: Option<f64>,
    pub status: Option<String>,
}

/// Expand around a center entity.
pub fn cmd_neighborhood(
    config: &MemexConfig,
    json_mode: bool,
    args: &NeighborhoodArgs,
) -> Result<(), MemexError> {
    let query = NeighborhoodRequest {
        center: args.center,
        depth: args.depth,
        limit: args.limit,
        min_confidence: args.min_confidence,
        status: args.status.clone(),
    }
    .to_query()?;

    let graph = open_graph(config)?;
    let neighborhood = graph.neighborhood(&query)?;
    let response = NeighborhoodResponse::from(&neighborhood);

    if json_mode {
        return print_json(&response);
    }

    println!(
        "Neighborhood of [{}] {} (depth {}, walked {}, reached {})",
        response.center.id,
        response.center.name,
        response.stats.max_depth,
        response.stats.effective_depth,
        response.stats.depth_reached
    );
    println!();
    println!("Nodes ({}):", response.stats.node_count);
    for node in &response.nodes {
        println!(
            "  d={} [{}] {} {}",
            node.depth, node.entity.id, node.entity.entity_type, node.entity.name
        );
    }
    println!();
    println!("Relationships ({}):", response.stats.relationship_count);
    for rel in &response.relationships {
        println!(
            "  [{}] {} -{}-> {}  confidence={:.2} status={}",
            rel.id, rel.from, rel.rel_type, rel.to, rel.confidence, rel.status
        );
    }
    if !response.evidence.is_empty() {
        println!();
        println!("Evidence ({}):", response.stats.evidence_count);
        for (id, ev) in &response.evidence {
            println!("  [{}] {} {}: {}", id, ev.source_type, ev.source_id, ev.source_excerpt);
        }
    }
    Ok(())
}

// =============================================================================
// CONTESTED / RETRACT COMMANDS
// =============================================================================

/// List prior/current belief pairs.
pub fn cmd_contested(config: &MemexConfig, json_mode: bool) -> Result<(), MemexError> {
    let graph = open_graph(config)?;
    let pairs: Vec<ContestedPairJson> = graph
        .contested_relationships()?
        .iter()
        .map(ContestedPairJson::from)
        .collect();

    if json_mode {
        return print_json(&pairs);
    }
    if pairs.is_empty() {
        println!("No contested relationships");
    }
    for pair in &pairs {
        println!("{} -{}-> {}", pair.from, pair.rel_type, pair.to);
        for prior in &pair.contested {
            println!(
                "  prior   [{}] confidence={:.2} last_seen={}",
                prior.id, prior.confidence, prior.last_seen_at
            );
        }
        match &pair.active {
            Some(current) => println!(
                "  current [{}] confidence={:.2} last_seen={}",
                current.id, current.confidence, current.last_seen_at
            ),
            None => println!("  current (none)"),
        }
    }
    Ok(())
}

/// Retract a relationship.
pub fn cmd_retract(config: &MemexConfig, json_mode: bool, id: u64) -> Result<(), MemexError> {
    let mut graph = open_graph(config)?;
    let retracted = graph.retract_relationship(RelationshipId(id))?;

    if json_mode {
        return print_json(&serde_json::json!({ "id": retracted.0, "status": "RETRACTED" }));
    }
    if retracted.0 == id {
        println!("Relationship {} retracted", id);
    } else {
        println!(
            "Relationship {} retracted (merged into retracted row {})",
            id, retracted.0
        );
    }
    Ok(())
}

// =============================================================================
// STATS COMMAND
// =============================================================================

/// Show graph statistics.
pub fn cmd_stats(config: &MemexConfig, json_mode: bool) -> Result<(), MemexError> {
    let graph = open_graph(config)?;
    let stats = StatsResponse::from(&graph.stats()?);

    if json_mode {
        return print_json(&stats);
    }

    println!("Memex Graph Statistics");
    println!("======================");
    println!("Database: {}", config.storage.path.display());
    println!("Backend:  {}", config.storage.backend);
    println!();
    println!("Entities:      {}", stats.entity_count);
    println!("Relationships: {}", stats.relationship_count);
    println!("Evidence:      {}", stats.evidence_count);
    match stats.mean_confidence {
        Some(mean) => println!("Mean confidence: {:.4}", mean),
        None => println!("Mean confidence: n/a"),
    }
    for (label, breakdown) in [
        ("By status", &stats.by_status),
        ("By relationship type", &stats.by_rel_type),
        ("By entity type", &stats.by_entity_type),
    ] {
        println!();
        println!("{}:", label);
        for (key, count) in breakdown {
            println!("  {:<16} {}", key, count);
        }
    }
    Ok(())
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(config: &MemexConfig) -> Result<(), MemexError> {
    let graph = open_graph(config)?;

    println!("Memex server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.server.addr());
    println!("  Backend:  {}", config.storage.backend);
    println!("  Database: {}", config.storage.path.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(graph, &config.server).await
}
