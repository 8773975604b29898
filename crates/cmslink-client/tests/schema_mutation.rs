//! Schema mutation end to end: fetch, implicit-deletion guard, replacement
//! payload, reload wait.

mod common;

use std::time::Duration;

use cmslink_client::{
    AttributeChangeSet, AttributeDescriptor, Error, HealthStatus, MutationOperation,
    ReloadOutcome, SchemaDocument, SchemaKind, UnhealthyReason, UpdateMode,
};
use common::{
    ScriptedHealth, admin_client, admin_client_with, bodies_to, init_tracing, mount_login,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = "api::article.article";
const ARTICLE_PATH: &str = "/content-type-builder/content-types/api::article.article";
const UPDATE_SCHEMA: &str = "/content-type-builder/update-schema";

fn article_schema(attributes: Value) -> Value {
    json!({
        "data": {
            "uid": ARTICLE,
            "apiID": "article",
            "schema": {
                "displayName": "Article",
                "singularName": "article",
                "pluralName": "articles",
                "kind": "collectionType",
                "collectionName": "articles",
                "draftAndPublish": true,
                "attributes": attributes
            }
        }
    })
}

async fn mount_schema(server: &MockServer, schema_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(schema_path))
        .and(header("authorization", "Bearer jwt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_update_schema(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path(UPDATE_SCHEMA))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "uid": ARTICLE } })))
        .expect(expected)
        .mount(server)
        .await;
}

fn submitted_attributes(payload: &Value) -> Vec<(String, String)> {
    payload["data"]["contentTypes"][0]["attributes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| {
            (
                a["name"].as_str().unwrap().to_string(),
                a["action"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_multiple_implicit_deletions_are_blocked_before_submission() {
    init_tracing();
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({
            "title": { "type": "string" },
            "body": { "type": "text" },
            "tags": { "type": "json" }
        })),
    )
    .await;
    mount_update_schema(&server, 0).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let changes =
        AttributeChangeSet::new().set("title", AttributeDescriptor::new("string").required());
    let err = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap_err();

    match &err {
        Error::SafetyBlocked { uid, attributes } => {
            assert_eq!(uid, ARTICLE);
            assert_eq!(attributes, &["body", "tags"]);
        }
        other => panic!("expected SafetyBlocked, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("body") && message.contains("tags"));
    assert!(!err.mutation_applied());
}

#[tokio::test]
async fn test_new_attribute_is_created_alongside_existing() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({
            "title": { "type": "string", "maxLength": 120 },
            "body": { "type": "text" }
        })),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let health = ScriptedHealth::healthy();
    let client = admin_client(&server, health.clone());
    let changes = AttributeChangeSet::new()
        .set("title", AttributeDescriptor::new("string"))
        .set("body", AttributeDescriptor::new("text"))
        .set("featured", AttributeDescriptor::new("boolean"));

    let result = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap();

    assert_eq!(result.operation, MutationOperation::Update);
    assert!(result.warnings.is_empty());
    assert_eq!(result.reload, Some(ReloadOutcome::AlreadyHealthy));
    assert_eq!(result.response["data"]["uid"], ARTICLE);
    assert_eq!(health.calls(), 1);

    let payloads = bodies_to(&server, UPDATE_SCHEMA).await;
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(
        submitted_attributes(payload),
        [
            ("title".to_string(), "update".to_string()),
            ("body".to_string(), "update".to_string()),
            ("featured".to_string(), "create".to_string()),
        ]
    );

    let entry = &payload["data"]["contentTypes"][0];
    assert_eq!(entry["action"], "update");
    assert_eq!(entry["uid"], ARTICLE);
    assert_eq!(entry["displayName"], "Article");
    assert_eq!(entry["singularName"], "article");
    assert_eq!(entry["collectionName"], "articles");
    assert_eq!(entry["draftAndPublish"], true);
    assert_eq!(entry["attributes"][0]["properties"]["maxLength"], 120);
    assert_eq!(payload["data"]["components"], json!([]));
}

#[tokio::test]
async fn test_single_implicit_deletion_warns_and_proceeds() {
    init_tracing();
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({
            "title": { "type": "string" },
            "body": { "type": "text" },
            "slug": { "type": "uid", "targetField": "title" }
        })),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let changes = AttributeChangeSet::new()
        .set("title", AttributeDescriptor::new("string").required())
        .set("body", AttributeDescriptor::new("text"));
    let result = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("slug"));
    assert_eq!(
        result.plan.as_ref().unwrap().implicit_deletions,
        ["slug".to_string()]
    );

    let payload = &bodies_to(&server, UPDATE_SCHEMA).await[0];
    assert_eq!(
        submitted_attributes(payload),
        [
            ("title".to_string(), "update".to_string()),
            ("body".to_string(), "update".to_string()),
        ]
    );
    assert_eq!(
        payload["data"]["contentTypes"][0]["attributes"][0]["properties"],
        json!({ "type": "string", "required": true })
    );
}

#[tokio::test]
async fn test_merge_mode_resends_unmentioned_attributes() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({
            "title": { "type": "string" },
            "body": { "type": "text" },
            "tags": { "type": "json" }
        })),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let changes = AttributeChangeSet::new().set("summary", AttributeDescriptor::new("text"));
    client
        .schema()
        .update(SchemaKind::ContentType, ARTICLE, &changes, UpdateMode::Merge)
        .await
        .unwrap();

    let payload = &bodies_to(&server, UPDATE_SCHEMA).await[0];
    assert_eq!(
        submitted_attributes(payload),
        [
            ("title".to_string(), "update".to_string()),
            ("body".to_string(), "update".to_string()),
            ("tags".to_string(), "update".to_string()),
            ("summary".to_string(), "create".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_missing_schema_is_not_found() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    Mock::given(method("GET"))
        .and(path("/content-type-builder/content-types/api::ghost.ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "data": null,
            "error": { "status": 404, "name": "NotFoundError", "message": "Content type not found" }
        })))
        .mount(&server)
        .await;
    mount_update_schema(&server, 0).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let changes = AttributeChangeSet::new().set("title", AttributeDescriptor::new("string"));
    let err = client
        .schema()
        .update_content_type("api::ghost.ghost", &changes)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::NotFound { ref target, .. } if target == "api::ghost.ghost"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_server_validation_error_is_passed_through() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({ "title": { "type": "string" } })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(UPDATE_SCHEMA))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "data": null,
            "error": {
                "status": 400,
                "name": "ValidationError",
                "message": "Invalid attribute type",
                "details": { "errors": [{ "path": ["contentTypes", "0", "attributes", "1", "properties", "type"] }] }
            }
        })))
        .mount(&server)
        .await;

    let health = ScriptedHealth::healthy();
    let client = admin_client(&server, health.clone());
    let changes = AttributeChangeSet::new()
        .set("title", AttributeDescriptor::new("string"))
        .set("rating", AttributeDescriptor::new("stars"));
    let err = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap_err();

    match err {
        Error::Validation {
            status,
            message,
            details,
            ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid attribute type");
            assert!(details.is_some());
        }
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(health.calls(), 0);
}

#[tokio::test]
async fn test_waits_for_reload_after_update() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({ "title": { "type": "string" } })),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let health = ScriptedHealth::new([
        HealthStatus::Reloading,
        HealthStatus::Reloading,
        HealthStatus::Healthy,
    ]);
    let client = admin_client(&server, health.clone());
    let changes = AttributeChangeSet::new().set("title", AttributeDescriptor::new("string"));
    let result = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap();

    assert!(matches!(result.reload, Some(ReloadOutcome::Settled { probes: 3, .. })));
    assert_eq!(health.calls(), 3);
}

#[tokio::test]
async fn test_reload_timeout_reports_applied_change() {
    init_tracing();
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        ARTICLE_PATH,
        article_schema(json!({ "title": { "type": "string" } })),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let health = ScriptedHealth::new([HealthStatus::Unhealthy {
        reason: UnhealthyReason::Refused,
        message: "connection refused".to_string(),
    }]);
    let client = admin_client_with(&server, health, Duration::from_millis(100));
    let changes = AttributeChangeSet::new()
        .set("title", AttributeDescriptor::new("string"))
        .set("featured", AttributeDescriptor::new("boolean"));
    let err = client
        .schema()
        .update_content_type(ARTICLE, &changes)
        .await
        .unwrap_err();

    assert!(err.mutation_applied());
    assert!(err.is_retryable_by_caller());
    assert!(err.reload_waited().unwrap() >= Duration::from_millis(100));
    match err {
        Error::ReloadTimeout {
            target,
            timeout,
            applied,
            ..
        } => {
            assert_eq!(target, ARTICLE);
            assert!(matches!(timeout.last_status, HealthStatus::Unhealthy { .. }));
            assert_eq!(applied.operation, MutationOperation::Update);
            assert_eq!(applied.response["data"]["uid"], ARTICLE);
            assert!(applied.plan.unwrap().get("featured").is_some());
        }
        other => panic!("expected ReloadTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_content_type() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_update_schema(&server, 1).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let document = SchemaDocument::content_type("api::event.event", "Event")
        .with_model_kind("collectionType")
        .with_metadata("singularName", "event")
        .with_metadata("pluralName", "events")
        .with_attribute("name", AttributeDescriptor::new("string").required())
        .with_attribute("startsAt", AttributeDescriptor::new("datetime"));

    let result = client.schema().create_content_type(&document).await.unwrap();
    assert_eq!(result.operation, MutationOperation::Create);

    let payload = &bodies_to(&server, UPDATE_SCHEMA).await[0];
    let entry = &payload["data"]["contentTypes"][0];
    assert_eq!(entry["action"], "create");
    assert_eq!(entry["singularName"], "event");
    assert_eq!(
        submitted_attributes(payload),
        [
            ("name".to_string(), "create".to_string()),
            ("startsAt".to_string(), "create".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_create_rejects_wrong_kind() {
    let server = MockServer::start().await;
    mount_update_schema(&server, 0).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let component = SchemaDocument::component("shared.seo", "shared", "Seo");
    let err = client
        .schema()
        .create_content_type(&component)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[tokio::test]
async fn test_delete_content_type() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    Mock::given(method("DELETE"))
        .and(path(ARTICLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "uid": ARTICLE } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let result = client.schema().delete_content_type(ARTICLE).await.unwrap();

    assert_eq!(result.operation, MutationOperation::Delete);
    assert!(result.plan.is_none());
    assert_eq!(result.reload, Some(ReloadOutcome::AlreadyHealthy));
}

#[tokio::test]
async fn test_component_update_uses_component_paths() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        "/content-type-builder/components/shared.seo",
        json!({
            "data": {
                "uid": "shared.seo",
                "category": "shared",
                "schema": {
                    "displayName": "Seo",
                    "icon": "search",
                    "collectionName": "components_shared_seos",
                    "attributes": { "metaTitle": { "type": "string" } }
                }
            }
        }),
    )
    .await;
    mount_update_schema(&server, 1).await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let changes = AttributeChangeSet::new()
        .set("metaTitle", AttributeDescriptor::new("string").with("maxLength", 60))
        .set("metaDescription", AttributeDescriptor::new("text"));
    let result = client
        .schema()
        .update_component("shared.seo", &changes)
        .await
        .unwrap();
    assert_eq!(result.kind, SchemaKind::Component);

    let payload = &bodies_to(&server, UPDATE_SCHEMA).await[0];
    assert_eq!(payload["data"]["contentTypes"], json!([]));
    let entry = &payload["data"]["components"][0];
    assert_eq!(entry["uid"], "shared.seo");
    assert_eq!(entry["category"], "shared");
    assert_eq!(entry["icon"], "search");
    assert_eq!(entry["collectionName"], "components_shared_seos");
    assert_eq!(entry["attributes"][0]["properties"]["maxLength"], 60);
    assert_eq!(entry["attributes"][1]["action"], "create");
}

#[tokio::test]
async fn test_list_content_types() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1", 1).await;
    mount_schema(
        &server,
        "/content-type-builder/content-types",
        json!({
            "data": [
                { "uid": ARTICLE, "schema": { "displayName": "Article", "attributes": { "title": { "type": "string" } } } },
                { "uid": "api::event.event", "schema": { "displayName": "Event", "attributes": {} } }
            ]
        }),
    )
    .await;

    let client = admin_client(&server, ScriptedHealth::healthy());
    let documents = client.schema().list_content_types().await.unwrap();

    assert_eq!(
        documents.iter().map(|d| d.uid.as_str()).collect::<Vec<_>>(),
        [ARTICLE, "api::event.event"]
    );
    assert_eq!(documents[0].attributes.len(), 1);
}
