//! Server-side schema definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which family of schema a UID belongs to.
///
/// The two kinds share one mutation algorithm and differ only in endpoint
/// paths and a few document-shape details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    /// Collection or single type (`api::article.article`)
    ContentType,
    /// Reusable component (`shared.seo`)
    Component,
}

impl SchemaKind {
    /// Human-readable label for logs and errors.
    pub fn label(self) -> &'static str {
        match self {
            Self::ContentType => "content type",
            Self::Component => "component",
        }
    }

    /// Key of this kind's array in the update-schema payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            Self::ContentType => "contentTypes",
            Self::Component => "components",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Definition of a single attribute: `type`, `required`, relation `target`,
/// plugin options and whatever else the server attaches.
///
/// Unknown properties are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDescriptor(Map<String, Value>);

impl AttributeDescriptor {
    /// Descriptor with only a `type`.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut properties = Map::new();
        properties.insert("type".into(), Value::String(kind.into()));
        Self(properties)
    }

    /// Wrap a JSON object; `None` for anything else.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(properties) => Some(Self(properties)),
            _ => None,
        }
    }

    /// Set a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Mark the attribute required.
    #[must_use]
    pub fn required(self) -> Self {
        self.with("required", true)
    }

    /// The attribute `type`, if set.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Whether `required` is set to true.
    pub fn is_required(&self) -> bool {
        self.0
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Relation or component target UID.
    pub fn target(&self) -> Option<&str> {
        self.0
            .get("target")
            .or_else(|| self.0.get("component"))
            .and_then(Value::as_str)
    }

    /// Raw property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All properties.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Apply a change on top of this descriptor.
    ///
    /// Properties of `change` win. When the change switches the attribute to a
    /// different `type`, the old properties no longer apply and are dropped.
    pub fn overlay(&self, change: &Self) -> Self {
        match (self.kind(), change.kind()) {
            (Some(current), Some(next)) if current != next => change.clone(),
            _ => {
                let mut merged = self.0.clone();
                for (key, value) in &change.0 {
                    merged.insert(key.clone(), value.clone());
                }
                Self(merged)
            }
        }
    }

    /// Properties as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for AttributeDescriptor {
    fn from(properties: Map<String, Value>) -> Self {
        Self(properties)
    }
}

/// Attributes of one schema, in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: Vec<(String, AttributeDescriptor)>,
}

impl AttributeMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `{name: descriptor}` object. Non-object descriptors are skipped.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        object
            .iter()
            .filter_map(|(name, value)| {
                AttributeDescriptor::from_value(value.clone()).map(|d| (name.clone(), d))
            })
            .collect()
    }

    /// Insert or replace, keeping the position of an existing name.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: AttributeDescriptor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = descriptor,
            None => self.entries.push((name, descriptor)),
        }
    }

    /// Descriptor of `name`.
    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Whether `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDescriptor)> {
        self.entries.iter().map(|(name, d)| (name.as_str(), d))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, AttributeDescriptor)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, AttributeDescriptor)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, descriptor) in iter {
            map.insert(name, descriptor);
        }
        map
    }
}

/// Schema keys that have a typed field on [`SchemaDocument`].
const STRUCTURAL_KEYS: &[&str] = &[
    "uid",
    "attributes",
    "displayName",
    "kind",
    "collectionName",
    "draftAndPublish",
    "category",
];

/// The full server-side definition of one content type or component.
///
/// Fetched immediately before every update and never cached: the server is
/// the single source of truth. Keys the client does not interpret
/// (`singularName`, `pluralName`, `description`, `pluginOptions`, `icon`...)
/// are carried in [`metadata`](Self::metadata) and sent back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    /// Schema UID, e.g. `api::article.article`
    pub uid: String,
    /// Content type or component
    pub kind: SchemaKind,
    /// Human-readable name
    pub display_name: Option<String>,
    /// Component category. Server convention, passed through as-is.
    pub category: Option<String>,
    /// Database collection name. Server convention, passed through as-is.
    pub collection_name: Option<String>,
    /// `collectionType` or `singleType` for content types.
    pub model_kind: Option<String>,
    /// Draft and publish workflow flag
    pub draft_and_publish: Option<bool>,
    /// Attributes in server order
    pub attributes: AttributeMap,
    /// Uninterpreted schema keys
    pub metadata: Map<String, Value>,
}

impl SchemaDocument {
    /// Empty content-type definition, for creation.
    pub fn content_type(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::empty(SchemaKind::ContentType, uid, display_name)
    }

    /// Empty component definition, for creation.
    pub fn component(
        uid: impl Into<String>,
        category: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let mut document = Self::empty(SchemaKind::Component, uid, display_name);
        document.category = Some(category.into());
        document
    }

    fn empty(kind: SchemaKind, uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            kind,
            display_name: Some(display_name.into()),
            category: None,
            collection_name: None,
            model_kind: None,
            draft_and_publish: None,
            attributes: AttributeMap::new(),
            metadata: Map::new(),
        }
    }

    /// Add or replace an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.attributes.insert(name, descriptor);
        self
    }

    /// Set the database collection name.
    #[must_use]
    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// `collectionType` or `singleType`.
    #[must_use]
    pub fn with_model_kind(mut self, kind: impl Into<String>) -> Self {
        self.model_kind = Some(kind.into());
        self
    }

    /// Enable or disable draft and publish.
    #[must_use]
    pub fn with_draft_and_publish(mut self, enabled: bool) -> Self {
        self.draft_and_publish = Some(enabled);
        self
    }

    /// Attach an uninterpreted schema key, e.g. `singularName`.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse a schema read response.
    ///
    /// Accepts the `{"data": {"uid", "category", "schema": {...}}}` envelope as
    /// well as a bare schema object. `fallback_uid` is used when the body has
    /// no `uid` of its own.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the body has no attribute object.
    pub fn from_response(
        kind: SchemaKind,
        fallback_uid: &str,
        body: &Value,
    ) -> std::result::Result<Self, String> {
        let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
        let schema = data.get("schema").filter(|s| s.is_object()).unwrap_or(data);

        let attributes = schema
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| "schema has no `attributes` object".to_string())?;

        let text = |value: Option<&Value>| value.and_then(Value::as_str).map(String::from);
        let display_name = text(schema.get("displayName"))
            .or_else(|| text(schema.get("info").and_then(|info| info.get("displayName"))));

        let metadata = schema
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .filter(|(key, _)| !STRUCTURAL_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            uid: text(data.get("uid"))
                .or_else(|| text(schema.get("uid")))
                .unwrap_or_else(|| fallback_uid.to_string()),
            kind,
            display_name,
            category: text(data.get("category")).or_else(|| text(schema.get("category"))),
            collection_name: text(schema.get("collectionName")),
            model_kind: text(schema.get("kind")),
            draft_and_publish: schema
                .get("draftAndPublish")
                .or_else(|| schema.get("options").and_then(|o| o.get("draftAndPublish")))
                .and_then(Value::as_bool),
            attributes: AttributeMap::from_object(attributes),
            metadata,
        })
    }

    /// One entry of the update-schema payload array.
    ///
    /// Metadata goes first so the typed fields always take precedence.
    pub(crate) fn payload_entry(&self, action: &str, attributes: Vec<Value>) -> Value {
        let mut entry = Map::new();
        entry.insert("action".into(), action.into());
        entry.insert("uid".into(), self.uid.clone().into());
        for (key, value) in &self.metadata {
            entry.insert(key.clone(), value.clone());
        }
        if let Some(name) = &self.display_name {
            entry.insert("displayName".into(), name.clone().into());
        }
        if let Some(kind) = &self.model_kind {
            entry.insert("kind".into(), kind.clone().into());
        }
        if let Some(name) = &self.collection_name {
            entry.insert("collectionName".into(), name.clone().into());
        }
        if let Some(enabled) = self.draft_and_publish {
            entry.insert("draftAndPublish".into(), enabled.into());
        }
        if let Some(category) = &self.category {
            entry.insert("category".into(), category.clone().into());
        }
        entry.insert("attributes".into(), Value::Array(attributes));
        Value::Object(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_content_type_response() {
        let body = json!({
            "data": {
                "uid": "api::article.article",
                "apiID": "article",
                "schema": {
                    "displayName": "Article",
                    "singularName": "article",
                    "pluralName": "articles",
                    "kind": "collectionType",
                    "collectionName": "articles",
                    "draftAndPublish": true,
                    "attributes": {
                        "title": { "type": "string", "required": true },
                        "author": { "type": "relation", "relation": "manyToOne", "target": "api::author.author" }
                    }
                }
            }
        });

        let document = SchemaDocument::from_response(SchemaKind::ContentType, "ignored", &body).unwrap();
        assert_eq!(document.uid, "api::article.article");
        assert_eq!(document.display_name.as_deref(), Some("Article"));
        assert_eq!(document.model_kind.as_deref(), Some("collectionType"));
        assert_eq!(document.collection_name.as_deref(), Some("articles"));
        assert_eq!(document.draft_and_publish, Some(true));
        assert_eq!(document.attributes.names().collect::<Vec<_>>(), ["title", "author"]);
        assert!(document.attributes.get("title").unwrap().is_required());
        assert_eq!(
            document.attributes.get("author").unwrap().target(),
            Some("api::author.author")
        );
        assert_eq!(document.metadata["singularName"], "article");
        assert!(!document.metadata.contains_key("attributes"));
    }

    #[test]
    fn test_component_response_category() {
        let body = json!({
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
        });

        let document = SchemaDocument::from_response(SchemaKind::Component, "shared.seo", &body).unwrap();
        assert_eq!(document.category.as_deref(), Some("shared"));
        assert_eq!(document.metadata["icon"], "search");
    }

    #[test]
    fn test_response_without_attributes() {
        let err = SchemaDocument::from_response(SchemaKind::ContentType, "x", &json!({ "data": {} }))
            .unwrap_err();
        assert!(err.contains("attributes"));
    }

    #[test]
    fn test_overlay() {
        let current = AttributeDescriptor::new("string").with("maxLength", 80);
        let merged = current.overlay(&AttributeDescriptor::new("string").required());
        assert_eq!(merged.get("maxLength"), Some(&json!(80)));
        assert!(merged.is_required());

        let retyped = current.overlay(&AttributeDescriptor::new("text"));
        assert_eq!(retyped.kind(), Some("text"));
        assert!(retyped.get("maxLength").is_none());
    }

    #[test]
    fn test_payload_entry_prefers_typed_fields() {
        let document = SchemaDocument::component("shared.seo", "shared", "Seo")
            .with_metadata("displayName", "stale")
            .with_metadata("icon", "search");
        let entry = document.payload_entry("update", vec![]);
        assert_eq!(entry["displayName"], "Seo");
        assert_eq!(entry["category"], "shared");
        assert_eq!(entry["icon"], "search");
        assert_eq!(entry["attributes"], json!([]));
    }
}
