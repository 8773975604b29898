//! # cmslink-client
//!
//! Resilient client for a headless content-management service: authenticated
//! requests with 401 recovery, health probing, reload-aware waiting and safe
//! schema mutation.
//!
//! ## Architecture
//!
//! - [`RequestExecutor`] - every request goes through here; a 401 on an
//!   admin-scoped request triggers exactly one re-authentication and one retry
//! - [`HttpHealthProbe`] - classifies the service as healthy, reloading or down
//! - [`ReloadCoordinator`] - bounded wait for the restart a schema change causes;
//!   at most one wait loop runs at a time
//! - [`SchemaMutator`] - fetch, merge, guard, submit, wait. Refuses any update
//!   that would silently delete more than one attribute
//! - [`CmsClient`] - wires the above to one shared [`SessionManager`](cmslink_auth::SessionManager)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cmslink_client::prelude::*;
//!
//! # async fn example() -> cmslink_client::Result<()> {
//! let config = ClientConfig::new("http://localhost:1337")
//!     .with_admin("editor@example.com", "s3cret");
//! let client = CmsClient::new(config)?;
//! client.connect().await?;
//!
//! let changes = AttributeChangeSet::new()
//!     .set("title", AttributeDescriptor::new("string").required())
//!     .set("body", AttributeDescriptor::new("richtext"))
//!     .set("featured", AttributeDescriptor::new("boolean"));
//!
//! let result = client
//!     .schema()
//!     .update_content_type("api::article.article", &changes)
//!     .await?;
//! for warning in &result.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
mod error;
pub mod executor;
pub mod health;
pub mod reload;
pub mod request;
pub mod schema;

pub use crate::client::{CmsClient, ConnectionReport};
pub use crate::config::{ClientConfig, ConfigError};
pub use crate::error::{Error, Result};
pub use crate::executor::RequestExecutor;
pub use crate::health::{HealthCheck, HealthStatus, HttpHealthProbe, UnhealthyReason};
pub use crate::reload::{ReloadConfig, ReloadCoordinator, ReloadOutcome, ReloadState, ReloadTimeout};
pub use crate::request::{Authority, RequestSpec};
pub use crate::schema::{
    AttributeAction, AttributeChange, AttributeChangeSet, AttributeDescriptor, MutationOperation,
    MutationPlan, MutationResult, SchemaDocument, SchemaKind, SchemaMutator, UpdateMode,
};
pub use cmslink_auth::{Credentials, SessionManager};

/// Common imports
pub mod prelude {
    pub use super::{
        AttributeChangeSet, AttributeDescriptor, Authority, ClientConfig, CmsClient, Error,
        HealthStatus, MutationResult, ReloadOutcome, RequestSpec, SchemaDocument,
        SchemaKind, UpdateMode,
    };
}
