//! Content-type and component schemas.
//!
//! - [`document`] - [`SchemaDocument`] and its attribute model
//! - [`changes`] - caller-supplied [`AttributeChangeSet`]
//! - [`plan`] - [`MutationPlan`], the merge and the implicit-deletion guard
//! - [`mutator`] - [`SchemaMutator`], which fetches, plans, submits and waits
//!
//! Content types and components go through the same algorithm; [`SchemaKind`]
//! only selects endpoint paths and payload keys.

pub mod changes;
pub mod document;
pub mod mutator;
pub mod plan;

pub use changes::{AttributeChange, AttributeChangeSet, UpdateMode};
pub use document::{AttributeDescriptor, AttributeMap, SchemaDocument, SchemaKind};
pub use mutator::{MutationOperation, MutationResult, SchemaMutator, SchemaPaths};
pub use plan::{AttributeAction, MAX_IMPLICIT_DELETIONS, MutationPlan, PlannedAttribute};
