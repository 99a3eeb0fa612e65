//! Upstream gate: should this topic be authored at all, and against what?
//!
//! The resolver checks our own catalog first (a hit means SKIP), then exact,
//! alias and fuzzy matches across known competitor catalogs. Listings are
//! cached with a TTL per catalog; [`DedupResolver::clear_caches`] drops them.
//!
//! [`GapAnalyzer`] reads exact competitor documents to derive a focus list
//! that is handed to generation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::collaborators::SkillCatalog;
use crate::document::slugify;
use crate::domain::{DedupAction, DedupConflict, DedupDecision, MatchType, Tier};

/// Most fuzzy matches listed on a decision.
pub const MAX_FUZZY_MATCHES: usize = 6;

/// Source id used for conflicts found in the local skills directory.
pub const LOCAL_SOURCE_ID: &str = "local";
/// Source id used for conflicts found in our published catalog.
pub const OWN_SOURCE_ID: &str = "own";

// ---------------------------------------------------------------------------
// Competitor sources
// ---------------------------------------------------------------------------

/// A known catalog of skill documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorSource {
    pub id: String,
    /// `owner/name` of the hosting repository.
    pub repo: String,
    /// Directory inside the repository that holds one folder per skill.
    pub skills_path: String,
    pub tier: Tier,
    /// Listing used when the live catalog cannot be read.
    pub known: BTreeSet<String>,
}

impl CompetitorSource {
    fn new(id: &str, repo: &str, skills_path: &str, tier: Tier, known: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            repo: repo.to_string(),
            skills_path: skills_path.to_string(),
            tier,
            known: known.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The catalogs checked by default.
pub fn standard_sources() -> Vec<CompetitorSource> {
    vec![
        CompetitorSource::new(
            "anthropic",
            "anthropics/skills",
            "skills",
            Tier::Official,
            &[
                "pdf", "docx", "pptx", "xlsx", "frontend-design", "skill-creator",
                "algorithmic-art", "canvas-design", "slack-gif-creator", "artifacts-builder",
                "webapp-testing", "mcp-server-builder",
            ],
        ),
        CompetitorSource::new(
            "terminalskills",
            "TerminalSkills/skills",
            "skills",
            Tier::Competitor,
            &[
                "pdf-analyzer", "excel-processor", "code-reviewer", "git-commit-pro",
                "api-tester", "docker-helper", "web-scraper", "data-visualizer",
                "markdown-writer", "sql-optimizer", "test-generator", "security-audit",
                "code-migration", "cicd-pipeline", "mcp-server-builder", "prompt-tester",
                "monorepo-manager", "data-validator", "log-analyzer",
            ],
        ),
        CompetitorSource::new(
            "alirezarezvani",
            "alirezarezvani/claude-skills",
            "",
            Tier::Competitor,
            &[
                "content-creator", "ceo-advisor", "cto-advisor", "marketing-skill",
                "product-manager", "ux-researcher", "data-analyst", "security-expert",
                "devops-engineer", "cloud-architect", "api-designer", "database-admin",
            ],
        ),
        CompetitorSource::new(
            "obra-superpowers",
            "obra/superpowers",
            "skills",
            Tier::Competitor,
            &[
                "tdd", "debugging", "brainstorm", "write-plan", "execute-plan", "code-review",
                "refactor", "documentation", "git-workflow",
            ],
        ),
        CompetitorSource::new(
            "hashicorp",
            "hashicorp/agent-skills",
            "skills",
            Tier::Enterprise,
            &[
                "terraform", "vault", "consul", "nomad", "packer", "waypoint", "hcp-terraform",
                "terraform-cloud",
            ],
        ),
        CompetitorSource::new(
            "composio",
            "ComposioHQ/awesome-claude-skills",
            "skills",
            Tier::Community,
            &["connect-apps", "aws-skills", "changelog-generator", "artifacts-builder"],
        ),
    ]
}

/// Common alternate names mapped to the canonical skill name.
pub const ALIASES: &[(&str, &str)] = &[
    ("pdf", "pdf-analyzer"),
    ("pdf-reader", "pdf-analyzer"),
    ("excel", "excel-processor"),
    ("csv", "excel-processor"),
    ("code-review", "code-reviewer"),
    ("git", "git-commit-pro"),
    ("docker", "docker-helper"),
    ("dockerfile", "docker-helper"),
    ("scraper", "web-scraper"),
    ("web-scraping", "web-scraper"),
    ("sql", "sql-optimizer"),
    ("testing", "test-generator"),
    ("security", "security-audit"),
    ("ci-cd", "cicd-pipeline"),
    ("mcp", "mcp-server-builder"),
    ("tf", "terraform"),
    ("word", "docx"),
    ("powerpoint", "pptx"),
    ("spreadsheet", "xlsx"),
];

pub fn canonical_alias(slug: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == slug)
        .map(|(_, canonical)| *canonical)
}

/// Substring containment either way, or at least two shared kebab words.
pub fn is_fuzzy_match(slug: &str, known: &str) -> bool {
    if slug == known {
        return false;
    }
    if slug.contains(known) || known.contains(slug) {
        return true;
    }
    let words: BTreeSet<&str> = slug.split('-').filter(|w| !w.is_empty()).collect();
    known
        .split('-')
        .filter(|w| words.contains(w))
        .collect::<BTreeSet<_>>()
        .len()
        >= 2
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct DedupResolver {
    catalog: Arc<dyn SkillCatalog>,
    sources: Vec<CompetitorSource>,
    skills_dir: PathBuf,
    call_timeout: Duration,
    own_cache: TtlCache<(), BTreeSet<String>>,
    competitor_cache: TtlCache<String, BTreeSet<String>>,
}

impl DedupResolver {
    pub fn new(
        catalog: Arc<dyn SkillCatalog>,
        sources: Vec<CompetitorSource>,
        skills_dir: PathBuf,
        own_ttl: Duration,
        competitor_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            sources,
            skills_dir,
            call_timeout,
            own_cache: TtlCache::new(own_ttl),
            competitor_cache: TtlCache::new(competitor_ttl),
        }
    }

    pub fn sources(&self) -> &[CompetitorSource] {
        &self.sources
    }

    pub fn clear_caches(&self) {
        self.own_cache.clear();
        self.competitor_cache.clear();
    }

    pub async fn resolve(&self, topic: &str) -> DedupDecision {
        let slug = slugify(topic);

        if self.skills_dir.join(&slug).join("SKILL.md").exists() {
            return decision(
                slug.clone(),
                vec![conflict(LOCAL_SOURCE_ID, &slug, MatchType::Exact, Tier::Own)],
            );
        }
        let own = self.own_listing().await;
        if own.contains(&slug) {
            return decision(
                slug.clone(),
                vec![conflict(OWN_SOURCE_ID, &slug, MatchType::Exact, Tier::Own)],
            );
        }

        let listings = self.competitor_listings().await;
        let mut conflicts = Vec::new();

        for source in &self.sources {
            if listings.get(&source.id).is_some_and(|s| s.contains(&slug)) {
                conflicts.push(conflict(&source.id, &slug, MatchType::Exact, source.tier));
            }
        }

        if let Some(canonical) = canonical_alias(&slug) {
            for source in &self.sources {
                if listings.get(&source.id).is_some_and(|s| s.contains(canonical)) {
                    conflicts.push(conflict(&source.id, canonical, MatchType::Alias, source.tier));
                }
            }
        }

        let mut fuzzy: BTreeMap<String, (String, Tier)> = BTreeMap::new();
        for known in own.iter().filter(|k| is_fuzzy_match(&slug, k)) {
            fuzzy
                .entry(known.clone())
                .or_insert_with(|| (OWN_SOURCE_ID.to_string(), Tier::Own));
        }
        for source in &self.sources {
            let Some(listing) = listings.get(&source.id) else {
                continue;
            };
            for known in listing.iter().filter(|k| is_fuzzy_match(&slug, k)) {
                fuzzy
                    .entry(known.clone())
                    .or_insert_with(|| (source.id.clone(), source.tier));
            }
        }
        conflicts.extend(
            fuzzy
                .into_iter()
                .take(MAX_FUZZY_MATCHES)
                .map(|(name, (source_id, tier))| conflict(&source_id, &name, MatchType::Fuzzy, tier)),
        );

        decision(slug, conflicts)
    }

    /// Current listing for every source, keyed by source id, plus our own
    /// under [`OWN_SOURCE_ID`].
    pub async fn market_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map = self.competitor_listings().await;
        map.insert(OWN_SOURCE_ID.to_string(), self.own_listing().await);
        map
    }

    async fn own_listing(&self) -> BTreeSet<String> {
        if let Some(hit) = self.own_cache.get(&()) {
            return hit;
        }
        let mut skills = local_skill_dirs(&self.skills_dir);
        match tokio::time::timeout(self.call_timeout, self.catalog.own_skills()).await {
            Ok(Ok(remote)) => {
                skills.extend(remote);
                self.own_cache.insert((), skills.clone());
            }
            Ok(Err(e)) => warn!(error = %e, "own catalog unavailable, using local listing"),
            Err(_) => warn!("own catalog timed out, using local listing"),
        }
        skills
    }

    async fn competitor_listings(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut out = BTreeMap::new();
        for source in &self.sources {
            if let Some(hit) = self.competitor_cache.get(&source.id) {
                out.insert(source.id.clone(), hit);
                continue;
            }
            let mut skills = source.known.clone();
            let call = self.catalog.competitor_skills(&source.id);
            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(live)) => {
                    skills.extend(live);
                    self.competitor_cache.insert(source.id.clone(), skills.clone());
                }
                Ok(Err(e)) => debug!(source = %source.id, error = %e, "catalog listing failed"),
                Err(_) => debug!(source = %source.id, "catalog listing timed out"),
            }
            out.insert(source.id.clone(), skills);
        }
        out
    }
}

fn local_skill_dirs(dir: &std::path::Path) -> BTreeSet<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect()
}

fn conflict(source_id: &str, skill: &str, match_type: MatchType, tier: Tier) -> DedupConflict {
    DedupConflict {
        source_id: source_id.to_string(),
        skill_name: skill.to_string(),
        match_type,
        tier,
    }
}

fn decision(slug: String, conflicts: Vec<DedupConflict>) -> DedupDecision {
    let own_exact = conflicts
        .iter()
        .any(|c| c.tier == Tier::Own && c.match_type == MatchType::Exact);
    let exact_sources: BTreeSet<&str> = conflicts
        .iter()
        .filter(|c| c.match_type == MatchType::Exact)
        .map(|c| c.source_id.as_str())
        .collect();

    let (action, reason) = if own_exact {
        (DedupAction::Skip, "already published, not writing twice".to_string())
    } else if conflicts.is_empty() {
        (DedupAction::Generate, "unique topic".to_string())
    } else if !exact_sources.is_empty() {
        let list = exact_sources.into_iter().collect::<Vec<_>>().join(", ");
        (
            DedupAction::Compete,
            format!("topic exists in: {list}; writing independently from primary sources"),
        )
    } else {
        (
            DedupAction::Variant,
            "similar topics exist; writing a differentiated variant".to_string(),
        )
    };

    DedupDecision {
        slug,
        action,
        conflicts,
        reason,
    }
}

// ---------------------------------------------------------------------------
// Gap analysis
// ---------------------------------------------------------------------------

/// Headings that say nothing about what a document actually covers.
const BOILERPLATE_HEADINGS: &[&str] = &[
    "quick start",
    "when to use",
    "resources",
    "troubleshooting",
    "pre-deploy checklist",
    "failure modes",
    "examples",
    "guidelines",
    "installation",
    "overview",
    "introduction",
    "usage",
];

/// Most covered topics kept per document.
pub const MAX_COVERED_TOPICS: usize = 15;

/// Production topics worth focusing on, with keywords that mark them covered.
pub const DEFAULT_GAPS: &[(&str, &[&str])] = &[
    ("Idempotency and retry safety", &["idempoten", "retry", "retries"]),
    ("Rate limiting with exponential backoff", &["rate limit", "backoff", "throttl"]),
    ("Error classification and handling", &["error handling", "errors", "exception"]),
    ("Production monitoring and alerting", &["monitoring", "alerting", "observability"]),
    ("Security hardening and secrets management", &["security", "secret", "hardening"]),
    ("Performance optimization patterns", &["performance", "optimiz", "caching"]),
];

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{2,3}\s+(.+?)\s*$").expect("static pattern"))
}

fn fence_lang_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(\w+)").expect("static pattern"))
}

/// Topics a document covers: non-boilerplate H2/H3 headings plus a
/// code-language signal, capped at [`MAX_COVERED_TOPICS`].
pub fn covered_topics(document: &str) -> Vec<String> {
    let mut covered: Vec<String> = heading_re()
        .captures_iter(document)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|h| h.chars().count() > 3 && !BOILERPLATE_HEADINGS.contains(&h.to_lowercase().as_str()))
        .collect();

    let langs: BTreeSet<&str> = fence_lang_re()
        .captures_iter(document)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .take(5)
        .collect();
    if !langs.is_empty() {
        covered.push(format!(
            "Code examples: {}",
            langs.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    covered.truncate(MAX_COVERED_TOPICS);
    covered
}

/// Default gaps not already covered by any of `covered`.
pub fn focus_areas(covered: &[String]) -> Vec<String> {
    let lowered: Vec<String> = covered.iter().map(|c| c.to_lowercase()).collect();
    DEFAULT_GAPS
        .iter()
        .filter(|(_, keywords)| {
            !lowered
                .iter()
                .any(|c| keywords.iter().any(|k| c.contains(k)))
        })
        .map(|(gap, _)| gap.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub sources_read: Vec<String>,
    pub covered: Vec<String>,
    pub focus: Vec<String>,
    pub notes: Vec<String>,
}

pub struct GapAnalyzer {
    catalog: Arc<dyn SkillCatalog>,
    call_timeout: Duration,
}

impl GapAnalyzer {
    pub fn new(catalog: Arc<dyn SkillCatalog>, call_timeout: Duration) -> Self {
        Self {
            catalog,
            call_timeout,
        }
    }

    pub async fn analyze(&self, decision: &DedupDecision) -> GapAnalysis {
        let mut analysis = GapAnalysis::default();

        for c in decision.exact_conflicts().filter(|c| c.tier != Tier::Own) {
            let call = self.catalog.fetch_document(&c.source_id, &c.skill_name);
            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(Some(doc))) => {
                    let topics = covered_topics(&doc);
                    analysis.notes.push(format!(
                        "read {}/{}: {} topics covered",
                        c.source_id,
                        c.skill_name,
                        topics.len()
                    ));
                    analysis.sources_read.push(c.source_id.clone());
                    for t in topics {
                        if !analysis.covered.contains(&t) {
                            analysis.covered.push(t);
                        }
                    }
                }
                Ok(Ok(None)) => analysis
                    .notes
                    .push(format!("{}/{}: no document", c.source_id, c.skill_name)),
                Ok(Err(e)) => analysis
                    .notes
                    .push(format!("{}/{}: {e}", c.source_id, c.skill_name)),
                Err(_) => analysis
                    .notes
                    .push(format!("{}/{}: fetch timed out", c.source_id, c.skill_name)),
            }
        }

        analysis.focus = focus_areas(&analysis.covered);
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticCatalog;

    fn resolver(catalog: StaticCatalog, skills_dir: PathBuf) -> DedupResolver {
        DedupResolver::new(
            Arc::new(catalog),
            standard_sources(),
            skills_dir,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_fuzzy_match_rules() {
        assert!(is_fuzzy_match("stripe", "stripe-webhooks"));
        assert!(is_fuzzy_match("code-review-bot", "code-review"));
        assert!(is_fuzzy_match("aws-lambda-deploy", "aws-lambda-layers"));
        assert!(!is_fuzzy_match("stripe", "stripe"));
        assert!(!is_fuzzy_match("aws-lambda", "aws-s3"));
    }

    #[tokio::test]
    async fn test_local_skill_skips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stripe")).unwrap();
        std::fs::write(dir.path().join("stripe/SKILL.md"), "---\n").unwrap();

        let d = resolver(StaticCatalog::default(), dir.path().to_path_buf())
            .resolve("Stripe")
            .await;
        assert_eq!(d.action, DedupAction::Skip);
        assert_eq!(d.conflicts[0].source_id, LOCAL_SOURCE_ID);
    }

    #[tokio::test]
    async fn test_own_catalog_skips() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StaticCatalog::default().with_own(&["twilio-sms"]);
        let d = resolver(catalog, dir.path().to_path_buf())
            .resolve("Twilio SMS")
            .await;
        assert!(d.should_skip());
    }

    #[tokio::test]
    async fn test_exact_competitor_is_compete() {
        let dir = tempfile::tempdir().unwrap();
        let d = resolver(StaticCatalog::default(), dir.path().to_path_buf())
            .resolve("Terraform")
            .await;
        assert_eq!(d.action, DedupAction::Compete);
        let exact: Vec<_> = d.exact_conflicts().collect();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].source_id, "hashicorp");
        assert_eq!(exact[0].tier, Tier::Enterprise);
    }

    #[tokio::test]
    async fn test_alias_only_is_variant() {
        let dir = tempfile::tempdir().unwrap();
        let d = resolver(StaticCatalog::default(), dir.path().to_path_buf())
            .resolve("tf")
            .await;
        assert_eq!(d.action, DedupAction::Variant);
        assert!(d
            .conflicts
            .iter()
            .any(|c| c.match_type == MatchType::Alias && c.skill_name == "terraform"));
    }

    #[tokio::test]
    async fn test_unique_topic_generates() {
        let dir = tempfile::tempdir().unwrap();
        let d = resolver(StaticCatalog::default(), dir.path().to_path_buf())
            .resolve("Resend Email")
            .await;
        assert_eq!(d.action, DedupAction::Generate);
        assert!(d.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_live_listing_is_cached_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StaticCatalog::default().with_competitor("composio", &["resend-email"]);
        let r = resolver(catalog.clone(), dir.path().to_path_buf());

        assert_eq!(r.resolve("Resend Email").await.action, DedupAction::Compete);
        r.resolve("Resend Email").await;
        let first = catalog.listing_calls();
        assert_eq!(first, standard_sources().len() + 1);

        r.clear_caches();
        r.resolve("Resend Email").await;
        assert_eq!(catalog.listing_calls(), first * 2);
    }

    #[test]
    fn test_covered_topics_and_focus() {
        let doc = "# Stripe\n\n## Quick Start\n\n## Webhook signature verification\n\n### Retry and idempotency keys\n\n## Usage\n\n```python\nx\n```\n```js\ny\n```\n";
        let covered = covered_topics(doc);
        assert_eq!(
            covered,
            vec![
                "Webhook signature verification".to_string(),
                "Retry and idempotency keys".to_string(),
                "Code examples: js, python".to_string(),
            ]
        );
        let focus = focus_areas(&covered);
        assert_eq!(focus.len(), DEFAULT_GAPS.len() - 1);
        assert!(!focus.contains(&"Idempotency and retry safety".to_string()));
    }

    #[tokio::test]
    async fn test_gap_analyzer_reads_exact_conflicts() {
        let catalog = StaticCatalog::default().with_document(
            "hashicorp",
            "terraform",
            "## State locking\n\n## Monitoring drift\n",
        );
        let decision = DedupDecision {
            slug: "terraform".into(),
            action: DedupAction::Compete,
            conflicts: vec![conflict("hashicorp", "terraform", MatchType::Exact, Tier::Enterprise)],
            reason: String::new(),
        };
        let analysis = GapAnalyzer::new(Arc::new(catalog), Duration::from_secs(5))
            .analyze(&decision)
            .await;
        assert_eq!(analysis.sources_read, vec!["hashicorp".to_string()]);
        assert_eq!(analysis.covered.len(), 2);
        assert!(!analysis
            .focus
            .contains(&"Production monitoring and alerting".to_string()));
    }
}
