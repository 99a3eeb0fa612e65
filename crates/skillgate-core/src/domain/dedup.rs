//! Upstream gate types: conflicts with existing documents and the resulting action.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Alias,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Alias => "alias",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// Who owns the conflicting document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Own,
    Official,
    Competitor,
    Enterprise,
    Community,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Official => "official",
            Self::Competitor => "competitor",
            Self::Enterprise => "enterprise",
            Self::Community => "community",
        }
    }
}

/// A known document that overlaps the requested topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConflict {
    pub source_id: String,
    pub skill_name: String,
    pub match_type: MatchType,
    pub tier: Tier,
}

/// What the gate decided to do with a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupAction {
    /// No overlap found.
    Generate,
    /// An exact competitor exists; author a better version.
    Compete,
    /// Only related documents exist; author a distinct angle.
    Variant,
    /// Already published by us.
    Skip,
}

impl DedupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "GENERATE",
            Self::Compete => "COMPETE",
            Self::Variant => "VARIANT",
            Self::Skip => "SKIP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupDecision {
    pub slug: String,
    pub action: DedupAction,
    pub conflicts: Vec<DedupConflict>,
    pub reason: String,
}

impl DedupDecision {
    pub fn should_skip(&self) -> bool {
        self.action == DedupAction::Skip
    }

    pub fn exact_conflicts(&self) -> impl Iterator<Item = &DedupConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.match_type == MatchType::Exact)
    }

    /// One-line summary for stage notes.
    pub fn summary(&self) -> String {
        format!("{} ({})", self.action.as_str(), self.reason)
    }
}
