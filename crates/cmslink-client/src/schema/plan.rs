//! Mutation planning
//!
//! The server only accepts whole-document replacement, so every update must
//! resend the complete attribute list. A plan merges the freshly fetched
//! document with the caller's change set and tags each attribute with what
//! will happen to it. Deletion is expressed by omission: `delete` entries are
//! part of the plan but never part of the payload.

use serde_json::{Map, Value, json};
use tracing::warn;

use super::changes::{AttributeChange, AttributeChangeSet, UpdateMode};
use super::document::{AttributeDescriptor, SchemaDocument, SchemaKind};
use crate::error::{Error, Result};

/// Maximum number of attributes an update may delete by omission.
pub const MAX_IMPLICIT_DELETIONS: usize = 1;

/// Per-attribute action in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAction {
    /// New attribute
    Create,
    /// Existing attribute carried forward with the caller's change applied
    Update,
    /// Existing attribute carried forward untouched (merge mode)
    Keep,
    /// Existing attribute dropped from the replacement document
    Delete,
}

impl AttributeAction {
    /// Action string in the replacement array, or `None` if the attribute is omitted.
    ///
    /// The server has no separate "keep" action; retained attributes are resent
    /// as updates with their current properties.
    pub fn wire_action(self) -> Option<&'static str> {
        match self {
            Self::Create => Some("create"),
            Self::Update | Self::Keep => Some("update"),
            Self::Delete => None,
        }
    }
}

/// One attribute of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAttribute {
    /// Attribute name
    pub name: String,
    /// What happens to the attribute
    pub action: AttributeAction,
    /// Properties sent for it
    pub properties: AttributeDescriptor,
}

/// Merged attribute list for one mutation. Built fresh per call and discarded
/// after submission.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    /// Schema UID
    pub uid: String,
    /// Content type or component
    pub kind: SchemaKind,
    /// How unmentioned attributes were treated
    pub mode: UpdateMode,
    /// Every attribute, deletions included
    pub attributes: Vec<PlannedAttribute>,
    /// Attributes deleted because the change set left them out
    pub implicit_deletions: Vec<String>,
    /// Non-fatal findings, e.g. a single implicit deletion
    pub warnings: Vec<String>,
}

impl MutationPlan {
    /// Plan an update of `document` with `changes`.
    ///
    /// Existing attributes come first in server order, followed by new ones in
    /// change-set order.
    ///
    /// # Errors
    ///
    /// - [`Error::SafetyBlocked`] if more than one attribute would be deleted
    ///   by omission; the error names all of them
    /// - [`Error::InvalidRequest`] if a new attribute has no `type`
    pub fn build(
        document: &SchemaDocument,
        changes: &AttributeChangeSet,
        mode: UpdateMode,
    ) -> Result<Self> {
        let implicit_deletions: Vec<String> = match mode {
            UpdateMode::Replace => document
                .attributes
                .names()
                .filter(|name| !changes.contains(name))
                .map(String::from)
                .collect(),
            UpdateMode::Merge => Vec::new(),
        };

        if implicit_deletions.len() > MAX_IMPLICIT_DELETIONS {
            return Err(Error::SafetyBlocked {
                uid: document.uid.clone(),
                attributes: implicit_deletions,
            });
        }

        let mut warnings = Vec::new();
        let mut attributes = Vec::with_capacity(document.attributes.len() + changes.len());

        for (name, current) in document.attributes.iter() {
            let (action, properties) = match changes.get(name) {
                Some(AttributeChange::Set(change)) => (AttributeAction::Update, current.overlay(change)),
                Some(AttributeChange::Remove) => (AttributeAction::Delete, current.clone()),
                None if mode == UpdateMode::Merge => (AttributeAction::Keep, current.clone()),
                None => (AttributeAction::Delete, current.clone()),
            };
            attributes.push(PlannedAttribute {
                name: name.to_string(),
                action,
                properties,
            });
        }

        for (name, change) in changes.iter() {
            if document.attributes.contains(name) {
                continue;
            }
            match change {
                AttributeChange::Set(descriptor) => {
                    if descriptor.kind().is_none() {
                        return Err(Error::InvalidRequest(format!(
                            "new attribute `{name}` on {} has no \"type\"",
                            document.uid
                        )));
                    }
                    attributes.push(PlannedAttribute {
                        name: name.to_string(),
                        action: AttributeAction::Create,
                        properties: descriptor.clone(),
                    });
                }
                AttributeChange::Remove => warnings.push(format!(
                    "`{name}` is not an attribute of {}; nothing to remove",
                    document.uid
                )),
            }
        }

        if let Some(name) = implicit_deletions.first() {
            let message = format!(
                "attribute `{name}` is missing from the change set and will be deleted from {}",
                document.uid
            );
            warn!(uid = %document.uid, attribute = %name, "{message}");
            warnings.push(message);
        }

        Ok(Self {
            uid: document.uid.clone(),
            kind: document.kind,
            mode,
            attributes,
            implicit_deletions,
            warnings,
        })
    }

    /// Plan the creation of `document`: every attribute is new.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if an attribute has no `type`.
    pub fn for_create(document: &SchemaDocument) -> Result<Self> {
        let attributes = document
            .attributes
            .iter()
            .map(|(name, descriptor)| {
                if descriptor.kind().is_none() {
                    return Err(Error::InvalidRequest(format!(
                        "attribute `{name}` on {} has no \"type\"",
                        document.uid
                    )));
                }
                Ok(PlannedAttribute {
                    name: name.to_string(),
                    action: AttributeAction::Create,
                    properties: descriptor.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            uid: document.uid.clone(),
            kind: document.kind,
            mode: UpdateMode::Replace,
            attributes,
            implicit_deletions: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Planned entry for `name`.
    pub fn get(&self, name: &str) -> Option<&PlannedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes that will be sent, in order.
    pub fn submitted(&self) -> impl Iterator<Item = &PlannedAttribute> {
        self.attributes
            .iter()
            .filter(|a| a.action.wire_action().is_some())
    }

    /// Every attribute the plan deletes, explicit or implicit.
    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| a.action == AttributeAction::Delete)
            .map(|a| a.name.as_str())
    }

    /// Full replacement payload for the update-schema endpoint.
    ///
    /// `document` supplies the identifier and display metadata, carried over
    /// unchanged; `action` is the document-level action (`create` or `update`).
    pub fn to_payload(&self, document: &SchemaDocument, action: &str) -> Value {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|attribute| {
                attribute.action.wire_action().map(|wire| {
                    json!({
                        "action": wire,
                        "name": attribute.name,
                        "properties": attribute.properties,
                    })
                })
            })
            .collect();

        let mut entry = Some(document.payload_entry(action, attributes));
        let mut data = Map::new();
        for kind in [SchemaKind::ContentType, SchemaKind::Component] {
            let entries = if kind == self.kind {
                entry.take().into_iter().collect()
            } else {
                Vec::new()
            };
            data.insert(kind.payload_key().to_string(), Value::Array(entries));
        }
        json!({ "data": data })
    }
}
