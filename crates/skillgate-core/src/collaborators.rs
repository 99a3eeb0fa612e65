//! Contracts for the external collaborators the pipeline drives.
//!
//! Implementations live outside the core (HTTP clients in `skillgate-remote`,
//! in-memory versions in [`crate::fakes`]). Every call is wrapped in a timeout
//! by the caller and any error is folded into a stage note.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

/// Harvests source excerpts for a topic, keyed by source id
/// (e.g. `npm_official`, `github_issues_community`).
#[async_trait]
pub trait SourceCollector: Send + Sync {
    async fn collect(&self, topic: &str) -> Result<BTreeMap<String, String>>;
}

/// Turns a prompt into document text. Output must begin with `---`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// One create-or-update request against the publish target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub slug: String,
    pub content: String,
    pub label: Option<String>,
    pub message: String,
}

/// Idempotent create-or-update of a published document. Returns a locator
/// for the published copy.
#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<String>;
}

/// Known skill listings across our own and competing catalogs.
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    /// Skill names we have already published.
    async fn own_skills(&self) -> Result<BTreeSet<String>>;

    /// Skill names currently listed by the source with `source_id`.
    async fn competitor_skills(&self, source_id: &str) -> Result<BTreeSet<String>>;

    /// Raw document for `skill` at `source_id`, if it can be read.
    async fn fetch_document(&self, source_id: &str, skill: &str) -> Result<Option<String>>;
}
