//! Integration tests for the Memex HTTP API.
//!
//! Uses axum-test to drive the router without binding a socket.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum_test::TestServer;
use memex::api::{
    AppState, Engine, MAX_BODY_BYTES, create_router,
    types::{
        ContestResponse, ContestedPairJson, EntityJson, ErrorResponse, EvidenceJson,
        HealthResponse, IdResponse, IngestResponse, NeighborhoodResponse, RelationshipJson,
        StatsResponse,
    },
};
use memex::config::ServerConfig;
use memex_core::{EngineConfig, KnowledgeGraph, StorageBackend};
use serde_json::json;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn open_server_config() -> ServerConfig {
    ServerConfig {
        rate_limit: 0,
        ..ServerConfig::default()
    }
}

fn engine() -> Engine {
    KnowledgeGraph::new(StorageBackend::in_memory())
}

fn server_with(graph: Engine, config: &ServerConfig) -> TestServer {
    TestServer::new(create_router(AppState::new(graph), config)).unwrap()
}

fn create_test_server() -> TestServer {
    server_with(engine(), &open_server_config())
}

async fn post_entity(server: &TestServer, entity_type: &str, name: &str) -> u64 {
    let response = server
        .post("/entities")
        .json(&json!({ "entity_type": entity_type, "name": name }))
        .await;
    response.assert_status_ok();
    response.json::<IdResponse>().id
}

async fn post_relationship(server: &TestServer, body: serde_json::Value) -> u64 {
    let response = server.post("/relationships").json(&body).await;
    response.assert_status_ok();
    response.json::<IdResponse>().id
}

// =============================================================================
// HEALTH / STATS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_stats_empty_graph() {
    let server = create_test_server();

    let response = server.get("/stats").await;

    response.assert_status_ok();
    let stats: StatsResponse = response.json();
    assert_eq!(stats.entity_count, 0);
    assert_eq!(stats.by_status.get("ACTIVE"), Some(&0));
    assert_eq!(stats.mean_confidence, None);
}

// =============================================================================
// ENTITIES
// =============================================================================

#[tokio::test]
async fn test_entity_upsert_is_idempotent_across_spellings() {
    let server = create_test_server();

    let first = post_entity(&server, "PERSON", "Nate Johnson").await;
    let second = post_entity(&server, "person", "  NATE-johnson ").await;
    assert_eq!(first, second);

    let response = server.get(&format!("/entities/{}", first)).await;
    response.assert_status_ok();
    let entity: EntityJson = response.json();
    assert_eq!(entity.name, "Nate Johnson");
    assert_eq!(entity.canonical_key, "PERSON:nate johnson");
}

#[tokio::test]
async fn test_entity_attributes_merge() {
    let server = create_test_server();

    for attrs in [json!({ "industry": "plumbing" }), json!({ "status": "active", "crew": 4 })] {
        server
            .post("/entities")
            .json(&json!({ "entity_type": "ORG", "name": "Johnson Bros.", "attributes": attrs }))
            .await
            .assert_status_ok();
    }

    let hits: Vec<EntityJson> = server
        .get("/entities")
        .add_query_param("q", "johnson")
        .await
        .json();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].attributes["industry"], json!("plumbing"));
    assert_eq!(hits[0].attributes["status"], json!("active"));
    assert_eq!(hits[0].attributes["crew"], json!(4));
}

#[tokio::test]
async fn test_entity_unknown_type_is_bad_request() {
    let server = create_test_server();

    let response = server
        .post("/entities")
        .json(&json!({ "entity_type": "ROBOT", "name": "R2" }))
        .await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("ROBOT"));
}

#[tokio::test]
async fn test_entity_missing_is_not_found() {
    let server = create_test_server();
    server.get("/entities/999").await.assert_status_not_found();
}

#[tokio::test]
async fn test_search_requires_query_text() {
    let server = create_test_server();
    let response = server.get("/entities").add_query_param("q", "   ").await;
    response.assert_status_bad_request();
}

// =============================================================================
// EVIDENCE
// =============================================================================

#[tokio::test]
async fn test_evidence_roundtrip_and_no_dedup() {
    let server = create_test_server();
    let body = json!({ "source_type": "SMS", "source_id": "sms-1", "excerpt": "hello" });

    let a: IdResponse = server.post("/evidence").json(&body).await.json();
    let b: IdResponse = server.post("/evidence").json(&body).await.json();
    assert_ne!(a.id, b.id);

    let evidence: EvidenceJson = server.get(&format!("/evidence/{}", a.id)).await.json();
    assert_eq!(evidence.source_type, "SMS");
    assert_eq!(evidence.source_excerpt, "hello");

    server.get("/evidence/12345").await.assert_status_not_found();
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

#[tokio::test]
async fn test_relationship_reinforcement() {
    let server = create_test_server();
    let a = post_entity(&server, "PERSON", "A").await;
    let b = post_entity(&server, "PERSON", "B").await;
    let claim = json!({ "from": a, "to": b, "rel_type": "LIKES", "confidence": 0.75 });

    let first = post_relationship(&server, claim.clone()).await;
    let second = post_relationship(&server, claim).await;
    assert_eq!(first, second);

    let rel: RelationshipJson = server.get(&format!("/relationships/{}", first)).await.json();
    assert_eq!(rel.confidence.to_bits(), 0.8f64.to_bits());
    assert_eq!(rel.status, "ACTIVE");
    assert!(rel.last_seen_at > rel.first_seen_at);
}

#[tokio::test]
async fn test_relationship_validation_errors() {
    let server = create_test_server();
    let a = post_entity(&server, "PERSON", "A").await;
    let b = post_entity(&server, "PERSON", "B").await;

    server
        .post("/relationships")
        .json(&json!({ "from": a, "to": b, "rel_type": "KNOWS", "confidence": 1.5 }))
        .await
        .assert_status_bad_request();

    server
        .post("/relationships")
        .json(&json!({ "from": a, "to": b, "rel_type": "FRIENDS", "confidence": 0.5 }))
        .await
        .assert_status_bad_request();

    server
        .post("/relationships")
        .json(&json!({ "from": a, "to": 777, "rel_type": "KNOWS", "confidence": 0.5 }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_contest_and_review_pairs() {
    let server = create_test_server();
    let nate = post_entity(&server, "PERSON", "Nate").await;
    let acme = post_entity(&server, "ORG", "Acme").await;
    let old = post_relationship(
        &server,
        json!({ "from": nate, "to": acme, "rel_type": "WORKS_AT", "confidence": 0.7 }),
    )
    .await;

    let response = server
        .post(&format!("/relationships/{}/contest", old))
        .json(&json!({ "from": nate, "to": acme, "rel_type": "WORKS_AT", "confidence": 0.9 }))
        .await;
    response.assert_status_ok();
    let outcome: ContestResponse = response.json();
    assert_eq!(outcome.contested_id, old);
    assert_ne!(outcome.new_id, old);

    let pairs: Vec<ContestedPairJson> = server.get("/relationships/contested").await.json();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].contested[0].id, old);
    assert_eq!(pairs[0].contested[0].status, "CONTESTED");
    assert_eq!(pairs[0].active.as_ref().map(|r| r.id), Some(outcome.new_id));
}

#[tokio::test]
async fn test_contest_missing_relationship() {
    let server = create_test_server();
    let a = post_entity(&server, "PERSON", "A").await;
    let b = post_entity(&server, "PERSON", "B").await;

    server
        .post("/relationships/404/contest")
        .json(&json!({ "from": a, "to": b, "rel_type": "KNOWS", "confidence": 0.5 }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_retract() {
    let server = create_test_server();
    let a = post_entity(&server, "PERSON", "A").await;
    let b = post_entity(&server, "PLACE", "Austin").await;
    let rel = post_relationship(
        &server,
        json!({ "from": a, "to": b, "rel_type": "LIVES_IN", "confidence": 0.6 }),
    )
    .await;

    let retracted: IdResponse = server
        .post(&format!("/relationships/{}/retract", rel))
        .await
        .json();
    assert_eq!(retracted.id, rel);

    let row: RelationshipJson = server.get(&format!("/relationships/{}", rel)).await.json();
    assert_eq!(row.status, "RETRACTED");

    server
        .post("/relationships/999/retract")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_enforced_terminal_states_reject_second_retract() {
    let graph = engine().with_config(EngineConfig {
        enforce_terminal_states: true,
        ..EngineConfig::default()
    });
    let server = server_with(graph, &open_server_config());
    let a = post_entity(&server, "PERSON", "A").await;
    let b = post_entity(&server, "PERSON", "B").await;
    let rel = post_relationship(
        &server,
        json!({ "from": a, "to": b, "rel_type": "KNOWS", "confidence": 0.6 }),
    )
    .await;

    server
        .post(&format!("/relationships/{}/retract", rel))
        .await
        .assert_status_ok();
    server
        .post(&format!("/relationships/{}/retract", rel))
        .await
        .assert_status_bad_request();
}

// =============================================================================
// NEIGHBORHOOD
// =============================================================================

#[tokio::test]
async fn test_neighborhood_with_evidence_and_filters() {
    let server = create_test_server();
    let nate = post_entity(&server, "PERSON", "Nate").await;
    let bros = post_entity(&server, "ORG", "Johnson Bros").await;
    let evidence: IdResponse = server
        .post("/evidence")
        .json(&json!({
            "source_type": "CHAT_MESSAGE",
            "source_id": "chat-1",
            "excerpt": "Nate owns Johnson Bros"
        }))
        .await
        .json();
    post_relationship(
        &server,
        json!({
            "from": nate, "to": bros, "rel_type": "OWNS",
            "confidence": 0.95, "evidence_id": evidence.id
        }),
    )
    .await;

    let response = server
        .post("/neighborhood")
        .json(&json!({ "center": nate, "depth": 1, "min_confidence": 0.9 }))
        .await;
    response.assert_status_ok();
    let n: NeighborhoodResponse = response.json();
    assert_eq!(n.center.id, nate);
    assert_eq!(n.nodes.len(), 2);
    assert_eq!(n.relationships.len(), 1);
    assert_eq!(
        n.evidence.get(&evidence.id).map(|e| e.source_excerpt.as_str()),
        Some("Nate owns Johnson Bros")
    );
    assert_eq!(n.stats.max_depth, 1);
    assert_eq!(n.stats.effective_depth, 1);

    let deep: NeighborhoodResponse = server
        .post("/neighborhood")
        .json(&json!({ "center": nate, "depth": 40 }))
        .await
        .json();
    assert_eq!(deep.stats.max_depth, 40);
    assert_eq!(deep.stats.effective_depth, 10);
    assert_eq!(deep.stats.depth_reached, 1);

    let filtered: NeighborhoodResponse = server
        .post("/neighborhood")
        .json(&json!({ "center": nate, "depth": 1, "min_confidence": 0.98 }))
        .await
        .json();
    assert!(filtered.relationships.is_empty());

    let contested_only: NeighborhoodResponse = server
        .post("/neighborhood")
        .json(&json!({ "center": nate, "status": "CONTESTED" }))
        .await
        .json();
    assert!(contested_only.relationships.is_empty());
    assert_eq!(contested_only.nodes.len(), 1);
}

#[tokio::test]
async fn test_neighborhood_unknown_center() {
    let server = create_test_server();
    server
        .post("/neighborhood")
        .json(&json!({ "center": 42, "depth": 2 }))
        .await
        .assert_status_not_found();
}

// =============================================================================
// BATCH INGEST
// =============================================================================

#[tokio::test]
async fn test_ingest_batch() {
    let server = create_test_server();

    let batch = json!({
        "entities": [
            { "entity_type": "PERSON", "name": "Nate Johnson", "attributes": { "city": "Austin" } },
            { "entity_type": "ORG", "name": "Johnson Bros." }
        ],
        "evidence": [
            { "label": "m1", "source_type": "CHAT_MESSAGE", "source_id": "c-9",
              "excerpt": "Nate runs Johnson Bros" }
        ],
        "relationships": [
            { "from": { "entity_type": "PERSON", "name": "nate johnson" },
              "to": { "entity_type": "ORG", "name": "johnson bros" },
              "rel_type": "MANAGES", "confidence": 0.8, "evidence": "m1" }
        ]
    });

    let response = server.post("/ingest").json(&batch).await;
    response.assert_status_ok();
    let report: IngestResponse = response.json();
    assert_eq!(report.entities_created, 2);
    assert_eq!(report.relationships_created, 1);
    assert!(report.evidence_ids.contains_key("m1"));

    let again: IngestResponse = server.post("/ingest").json(&batch).await.json();
    assert_eq!(again.entities_merged, 2);
    assert_eq!(again.relationships_reinforced, 1);
    assert_eq!(again.relationship_ids, report.relationship_ids);
}

#[tokio::test]
async fn test_ingest_rejects_dangling_label_without_writing() {
    let server = create_test_server();

    let response = server
        .post("/ingest")
        .json(&json!({
            "entities": [{ "entity_type": "PERSON", "name": "A" }, { "entity_type": "PERSON", "name": "B" }],
            "relationships": [{
                "from": { "entity_type": "PERSON", "name": "A" },
                "to": { "entity_type": "PERSON", "name": "B" },
                "rel_type": "KNOWS", "confidence": 0.5, "evidence": "missing"
            }]
        }))
        .await;
    response.assert_status_bad_request();

    let stats: StatsResponse = server.get("/stats").await.json();
    assert_eq!(stats.entity_count, 0);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = create_test_server();

    let response = server
        .post("/entities")
        .bytes(bytes::Bytes::from("not valid json"))
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    use tower::ServiceExt;

    let router = create_router(AppState::new(engine()), &open_server_config());
    let name = "x".repeat(MAX_BODY_BYTES);
    let body = json!({ "entity_type": "PERSON", "name": name }).to_string();

    let response = router
        .oneshot(
            Request::post("/entities")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// AUTHENTICATION / RATE LIMITING
// =============================================================================

fn auth_server(key: &str) -> TestServer {
    let config = ServerConfig {
        api_key: Some(key.to_string()),
        ..open_server_config()
    };
    server_with(engine(), &config)
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let server = auth_server("test-secret-key-12345");

    let response = server
        .get("/stats")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer test-secret-key-12345"),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_tokens() {
    let server = auth_server("correct-key");

    let missing = server.get("/stats").await;
    assert_eq!(missing.status_code().as_u16(), 401);

    let wrong = server
        .get("/stats")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong-key"))
        .await;
    assert_eq!(wrong.status_code().as_u16(), 401);

    let raw = server
        .get("/stats")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("correct-key"))
        .await;
    assert_eq!(raw.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_health_bypasses_auth() {
    let server = auth_server("correct-key");
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = ServerConfig {
        rate_limit: 1,
        ..ServerConfig::default()
    };
    let server = server_with(engine(), &config);

    server.get("/health").await.assert_status_ok();
    let limited = server.get("/health").await;
    assert_eq!(limited.status_code().as_u16(), 429);
}
