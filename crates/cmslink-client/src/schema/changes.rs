//! Caller-supplied attribute changes.

use serde_json::Value;

use super::document::AttributeDescriptor;

/// What to do with one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeChange {
    /// Create the attribute, or overlay this descriptor on the existing one.
    Set(AttributeDescriptor),
    /// Delete the attribute on purpose.
    Remove,
}

/// How attributes missing from a change set are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// The change set is the complete new attribute list; anything left out
    /// is deleted, subject to the implicit-deletion limit.
    #[default]
    Replace,
    /// Unmentioned attributes are kept unchanged.
    Merge,
}

/// Ordered mapping of attribute name to change. Consumed once per mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeChangeSet {
    entries: Vec<(String, AttributeChange)>,
}

impl AttributeChangeSet {
    /// Empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the descriptor for `name`.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        self.insert(name, AttributeChange::Set(descriptor));
        self
    }

    /// Mark `name` for explicit removal.
    #[must_use]
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.insert(name, AttributeChange::Remove);
        self
    }

    /// Insert or replace the change for `name`, keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, change: AttributeChange) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = change,
            None => self.entries.push((name, change)),
        }
    }

    /// Change for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&AttributeChange> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, change)| change)
    }

    /// Whether `name` is mentioned.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Changes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeChange)> {
        self.entries.iter().map(|(name, change)| (name.as_str(), change))
    }

    /// Number of mentioned attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no attribute is mentioned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, AttributeDescriptor)> for AttributeChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, AttributeDescriptor)>>(iter: I) -> Self {
        let mut changes = Self::new();
        for (name, descriptor) in iter {
            changes.insert(name, AttributeChange::Set(descriptor));
        }
        changes
    }
}

/// Parse a `{name: descriptor | null}` object, the shape tool layers receive
/// from their callers. `null` means explicit removal.
impl TryFrom<Value> for AttributeChangeSet {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(object) = value else {
            return Err("attribute changes must be a JSON object".to_string());
        };

        let mut changes = Self::new();
        for (name, entry) in object {
            let change = match entry {
                Value::Null => AttributeChange::Remove,
                Value::Object(properties) => AttributeChange::Set(properties.into()),
                other => {
                    return Err(format!(
                        "attribute `{name}` must be an object or null, got {other}"
                    ));
                }
            };
            changes.insert(name, change);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let changes = AttributeChangeSet::try_from(json!({
            "title": { "type": "string", "required": true },
            "legacy": null
        }))
        .unwrap();

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes.get("title"), Some(AttributeChange::Set(d)) if d.is_required()));
        assert_eq!(changes.get("legacy"), Some(&AttributeChange::Remove));
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        let err = AttributeChangeSet::try_from(json!({ "title": "string" })).unwrap_err();
        assert!(err.contains("title"));
        assert!(AttributeChangeSet::try_from(json!([])).is_err());
    }

    #[test]
    fn test_later_entry_wins() {
        let changes = AttributeChangeSet::new()
            .set("slug", AttributeDescriptor::new("uid"))
            .remove("slug");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("slug"), Some(&AttributeChange::Remove));
    }
}
