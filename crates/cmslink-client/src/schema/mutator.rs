//! Schema mutation: fetch, plan, submit, wait for reload.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::changes::{AttributeChangeSet, UpdateMode};
use super::document::{SchemaDocument, SchemaKind};
use super::plan::MutationPlan;
use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::reload::{ReloadCoordinator, ReloadOutcome};
use crate::request::RequestSpec;

/// Endpoint paths of the schema builder API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPaths {
    /// Content-type collection
    pub content_types: String,
    /// Component collection
    pub components: String,
    /// Schema update endpoint
    pub update_schema: String,
}

impl Default for SchemaPaths {
    fn default() -> Self {
        Self {
            content_types: "/content-type-builder/content-types".to_string(),
            components: "/content-type-builder/components".to_string(),
            update_schema: "/content-type-builder/update-schema".to_string(),
        }
    }
}

impl SchemaPaths {
    fn collection(&self, kind: SchemaKind) -> &str {
        match kind {
            SchemaKind::ContentType => &self.content_types,
            SchemaKind::Component => &self.components,
        }
    }

    fn item(&self, kind: SchemaKind, uid: &str) -> String {
        format!("{}/{uid}", self.collection(kind).trim_end_matches('/'))
    }
}

/// Kind of schema mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOperation {
    /// New schema
    Create,
    /// Changed attributes
    Update,
    /// Schema removed
    Delete,
}

/// What a mutation submitted and how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    /// Schema UID
    pub uid: String,
    /// Content type or component
    pub kind: SchemaKind,
    /// What was done
    pub operation: MutationOperation,
    /// Plan that produced the payload; `None` for deletions
    pub plan: Option<MutationPlan>,
    /// Non-fatal warnings, e.g. a single implicit attribute deletion
    pub warnings: Vec<String>,
    /// Server response to the submission
    pub response: Value,
    /// Reload wait outcome; `None` if waiting was disabled
    pub reload: Option<ReloadOutcome>,
}

/// Create, update and delete content types and components.
///
/// Updates are always computed against a freshly fetched document. No
/// ordering is guaranteed between concurrent mutations of the same UID; the
/// server decides (last write wins or a validation error).
#[derive(Debug)]
pub struct SchemaMutator {
    executor: Arc<RequestExecutor>,
    reload: Arc<ReloadCoordinator>,
    paths: SchemaPaths,
    wait_for_reload: bool,
    max_wait: Duration,
}

impl SchemaMutator {
    /// Mutator with default paths that waits for every reload.
    pub fn new(executor: Arc<RequestExecutor>, reload: Arc<ReloadCoordinator>) -> Self {
        let max_wait = reload.config().max_wait;
        Self {
            executor,
            reload,
            paths: SchemaPaths::default(),
            wait_for_reload: true,
            max_wait,
        }
    }

    /// Use non-default endpoint paths.
    #[must_use]
    pub fn with_paths(mut self, paths: SchemaPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Whether mutations wait for the service to come back before returning.
    #[must_use]
    pub fn with_wait_for_reload(mut self, wait: bool) -> Self {
        self.wait_for_reload = wait;
        self
    }

    /// Deadline for the post-mutation reload wait.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Fetch the current definition of `uid`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the server has no such schema, plus any executor error.
    pub async fn get(&self, kind: SchemaKind, uid: &str) -> Result<SchemaDocument> {
        let operation = format!("get {kind}");
        require_uid(&operation, uid)?;

        let spec = RequestSpec::get(self.paths.item(kind, uid)).named(operation.clone());
        let body = self
            .executor
            .execute(&spec)
            .await
            .map_err(|e| e.into_not_found(&operation, uid))?;

        if body.get("data").is_some_and(Value::is_null) {
            return Err(Error::NotFound {
                operation,
                target: uid.to_string(),
            });
        }

        SchemaDocument::from_response(kind, uid, &body).map_err(|message| Error::Decode {
            operation,
            target: uid.to_string(),
            message,
        })
    }

    /// List every schema of `kind`.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] if the response is not a list, plus any executor error.
    pub async fn list(&self, kind: SchemaKind) -> Result<Vec<SchemaDocument>> {
        let operation = format!("list {kind}s");
        let path = self.paths.collection(kind).to_string();
        let spec = RequestSpec::get(path.clone()).named(operation.clone());
        let body = self.executor.execute(&spec).await?;

        let items = body
            .get("data")
            .unwrap_or(&body)
            .as_array()
            .ok_or_else(|| Error::Decode {
                operation: operation.clone(),
                target: path.clone(),
                message: "expected an array of schemas".to_string(),
            })?;

        items
            .iter()
            .map(|item| {
                SchemaDocument::from_response(kind, "", item).map_err(|message| Error::Decode {
                    operation: operation.clone(),
                    target: path.clone(),
                    message,
                })
            })
            .collect()
    }

    /// Update the attributes of `uid`.
    ///
    /// The current document is fetched, merged with `changes` and resent in
    /// full. In [`UpdateMode::Replace`] an attribute missing from `changes`
    /// is deleted; more than one such deletion is refused before anything is
    /// sent.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `uid` does not exist
    /// - [`Error::SafetyBlocked`] on more than one implicit deletion
    /// - [`Error::Validation`] if the server rejects the new document
    /// - [`Error::ReloadTimeout`] if the change was applied but the service
    ///   did not come back in time
    pub async fn update(
        &self,
        kind: SchemaKind,
        uid: &str,
        changes: &AttributeChangeSet,
        mode: UpdateMode,
    ) -> Result<MutationResult> {
        let document = self.get(kind, uid).await?;
        let plan = MutationPlan::build(&document, changes, mode).inspect_err(|e| {
            if let Error::SafetyBlocked { attributes, .. } = e {
                warn!(%uid, ?attributes, "schema update blocked: multiple implicit deletions");
            }
        })?;

        debug!(
            %uid,
            %kind,
            attributes = plan.attributes.len(),
            deleted = plan.deleted().count(),
            "submitting schema update"
        );
        let operation = format!("update {kind}");
        let response = self
            .submit(&operation, uid, plan.to_payload(&document, "update"))
            .await?;

        self.finish(
            &operation,
            MutationResult {
                uid: document.uid.clone(),
                kind,
                operation: MutationOperation::Update,
                warnings: plan.warnings.clone(),
                plan: Some(plan),
                response,
                reload: None,
            },
        )
        .await
    }

    /// Create a new schema from `document`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if an attribute has no `type`
    /// - [`Error::Validation`] if the server rejects the definition
    /// - [`Error::ReloadTimeout`] if created but the service did not come back in time
    pub async fn create(&self, document: &SchemaDocument) -> Result<MutationResult> {
        let operation = format!("create {}", document.kind);
        require_uid(&operation, &document.uid)?;
        let plan = MutationPlan::for_create(document)?;

        debug!(uid = %document.uid, kind = %document.kind, "submitting schema creation");
        let response = self
            .submit(&operation, &document.uid, plan.to_payload(document, "create"))
            .await?;

        self.finish(
            &operation,
            MutationResult {
                uid: document.uid.clone(),
                kind: document.kind,
                operation: MutationOperation::Create,
                warnings: Vec::new(),
                plan: Some(plan),
                response,
                reload: None,
            },
        )
        .await
    }

    /// Delete the schema `uid`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `uid` does not exist
    /// - [`Error::ReloadTimeout`] if deleted but the service did not come back in time
    pub async fn delete(&self, kind: SchemaKind, uid: &str) -> Result<MutationResult> {
        let operation = format!("delete {kind}");
        require_uid(&operation, uid)?;

        let spec = RequestSpec::delete(self.paths.item(kind, uid)).named(operation.clone());
        let response = self
            .executor
            .execute(&spec)
            .await
            .map_err(|e| e.into_not_found(&operation, uid))?;

        self.finish(
            &operation,
            MutationResult {
                uid: uid.to_string(),
                kind,
                operation: MutationOperation::Delete,
                plan: None,
                warnings: Vec::new(),
                response,
                reload: None,
            },
        )
        .await
    }

    /// Fetch a content type.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `uid` does not exist; request errors otherwise.
    pub async fn get_content_type(&self, uid: &str) -> Result<SchemaDocument> {
        self.get(SchemaKind::ContentType, uid).await
    }

    /// All content types.
    ///
    /// # Errors
    ///
    /// Request errors from the executor.
    pub async fn list_content_types(&self) -> Result<Vec<SchemaDocument>> {
        self.list(SchemaKind::ContentType).await
    }

    /// [`update`](Self::update) a content type in replace mode.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub async fn update_content_type(
        &self,
        uid: &str,
        changes: &AttributeChangeSet,
    ) -> Result<MutationResult> {
        self.update(SchemaKind::ContentType, uid, changes, UpdateMode::Replace)
            .await
    }

    /// Create a content type and wait for the reload.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if `document` is not a content type.
    pub async fn create_content_type(&self, document: &SchemaDocument) -> Result<MutationResult> {
        require_kind(document, SchemaKind::ContentType)?;
        self.create(document).await
    }

    /// Delete a content type and wait for the reload.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete).
    pub async fn delete_content_type(&self, uid: &str) -> Result<MutationResult> {
        self.delete(SchemaKind::ContentType, uid).await
    }

    /// Fetch a component.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `uid` does not exist; request errors otherwise.
    pub async fn get_component(&self, uid: &str) -> Result<SchemaDocument> {
        self.get(SchemaKind::Component, uid).await
    }

    /// All components.
    ///
    /// # Errors
    ///
    /// Request errors from the executor.
    pub async fn list_components(&self) -> Result<Vec<SchemaDocument>> {
        self.list(SchemaKind::Component).await
    }

    /// [`update`](Self::update) a component in replace mode.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub async fn update_component(
        &self,
        uid: &str,
        changes: &AttributeChangeSet,
    ) -> Result<MutationResult> {
        self.update(SchemaKind::Component, uid, changes, UpdateMode::Replace)
            .await
    }

    /// Create a component and wait for the reload.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if `document` is not a component or has no category.
    pub async fn create_component(&self, document: &SchemaDocument) -> Result<MutationResult> {
        require_kind(document, SchemaKind::Component)?;
        if document.category.as_deref().is_none_or(str::is_empty) {
            return Err(Error::InvalidRequest(format!(
                "component {} needs a category",
                document.uid
            )));
        }
        self.create(document).await
    }

    /// Delete a component and wait for the reload.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete).
    pub async fn delete_component(&self, uid: &str) -> Result<MutationResult> {
        self.delete(SchemaKind::Component, uid).await
    }

    async fn submit(&self, operation: &str, uid: &str, payload: Value) -> Result<Value> {
        let spec = RequestSpec::post(self.paths.update_schema.clone(), payload).named(operation);
        self.executor.execute(&spec).await.map_err(|e| match e {
            Error::Validation { .. } => {
                warn!(%uid, error = %e, "schema change rejected by server");
                e
            }
            other => other,
        })
    }

    /// Wait out the reload a mutation triggers before handing control back.
    async fn finish(&self, operation: &str, mut result: MutationResult) -> Result<MutationResult> {
        if !self.wait_for_reload {
            return Ok(result);
        }

        match self.reload.wait_for_healthy(self.max_wait).await {
            Ok(outcome) => {
                info!(uid = %result.uid, ?outcome, "{operation} complete");
                result.reload = Some(outcome);
                Ok(result)
            }
            Err(timeout) => {
                warn!(uid = %result.uid, error = %timeout, "{operation} applied but reload not confirmed");
                Err(Error::ReloadTimeout {
                    operation: operation.to_string(),
                    target: result.uid.clone(),
                    timeout,
                    applied: Box::new(result),
                })
            }
        }
    }
}

fn require_uid(operation: &str, uid: &str) -> Result<()> {
    if uid.trim().is_empty() {
        return Err(Error::InvalidRequest(format!("{operation}: empty uid")));
    }
    Ok(())
}

fn require_kind(document: &SchemaDocument, kind: SchemaKind) -> Result<()> {
    if document.kind != kind {
        return Err(Error::InvalidRequest(format!(
            "{} is a {}, not a {kind}",
            document.uid, document.kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_paths() {
        let paths = SchemaPaths::default();
        assert_eq!(
            paths.item(SchemaKind::ContentType, "api::article.article"),
            "/content-type-builder/content-types/api::article.article"
        );
        assert_eq!(
            paths.item(SchemaKind::Component, "shared.seo"),
            "/content-type-builder/components/shared.seo"
        );
    }

    #[test]
    fn test_require_kind() {
        let component = SchemaDocument::component("shared.seo", "shared", "Seo");
        assert!(require_kind(&component, SchemaKind::Component).is_ok());
        let err = require_kind(&component, SchemaKind::ContentType).unwrap_err();
        assert!(err.to_string().contains("not a content type"));
    }
}
