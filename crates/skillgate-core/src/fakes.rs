//! In-memory fakes for the runner, package index and collaborator traits
//! (testing only).
//!
//! Each fake is scripted up front and records what it was asked, so tests
//! can assert on call counts and payloads. Clones share state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::{ContentGenerator, PublishRequest, PublishTarget, SkillCatalog, SourceCollector};
use crate::domain::{Ecosystem, Language, Result, SkillgateError};
use crate::levels::{IndexError, IndexLookup, IndexResult, PackageIndex};
use crate::sandbox::{CodeRunner, ExecutionOutcome, RunMode, SandboxError, SandboxResult};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RunnerScript {
    fail_any: Vec<(String, String)>,
    fail_execute: Vec<(String, String)>,
    missing: BTreeSet<Language>,
    timeouts: Vec<String>,
    runs: Vec<(Language, String, RunMode)>,
}

/// Code runner that never spawns anything. Every run succeeds unless a
/// scripted rule matches the source.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<RunnerScript>>,
}

impl ScriptedRunner {
    pub fn all_ok() -> Self {
        Self::default()
    }

    /// Exit 1 with `stderr` in any mode when the source contains `needle`.
    pub fn fail_when(self, needle: &str, stderr: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .fail_any
            .push((needle.to_string(), stderr.to_string()));
        self
    }

    /// Exit 1 with `stderr` only when executing a source containing `needle`.
    pub fn fail_on_execute(self, needle: &str, stderr: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .fail_execute
            .push((needle.to_string(), stderr.to_string()));
        self
    }

    pub fn missing_interpreter(self, language: Language) -> Self {
        self.script.lock().unwrap().missing.insert(language);
        self
    }

    pub fn time_out_when(self, needle: &str) -> Self {
        self.script.lock().unwrap().timeouts.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().runs.len()
    }

    pub fn runs(&self) -> Vec<(Language, String, RunMode)> {
        self.script.lock().unwrap().runs.clone()
    }
}

fn program_for(language: Language) -> &'static str {
    match language {
        Language::Python => "python3",
        Language::Javascript | Language::Typescript => "node",
        _ => "bash",
    }
}

#[async_trait]
impl CodeRunner for ScriptedRunner {
    async fn run(&self, language: Language, source: &str, mode: RunMode) -> SandboxResult<ExecutionOutcome> {
        let mut script = self.script.lock().unwrap();
        script.runs.push((language, source.to_string(), mode));

        if script.missing.contains(&language) {
            return Err(SandboxError::InterpreterMissing {
                program: program_for(language).to_string(),
            });
        }
        if script.timeouts.iter().any(|n| source.contains(n.as_str())) {
            return Err(SandboxError::Timeout {
                elapsed_ms: 8_000,
                limit_ms: 8_000,
            });
        }

        let failure = script
            .fail_any
            .iter()
            .chain(script.fail_execute.iter().filter(|_| mode == RunMode::Execute))
            .find(|(needle, _)| source.contains(needle.as_str()))
            .map(|(_, stderr)| stderr.clone());

        Ok(match failure {
            Some(stderr) => ExecutionOutcome {
                exit_code: 1,
                stdout: String::new(),
                stderr,
                duration_ms: 1,
            },
            None => ExecutionOutcome {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 1,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryPackageIndex
// ---------------------------------------------------------------------------

/// Package index backed by a fixed table. Unknown names are `NotFound`.
#[derive(Debug, Default)]
pub struct MemoryPackageIndex {
    known: HashMap<(Ecosystem, String), String>,
    failing: BTreeSet<(Ecosystem, String)>,
    lookups: Mutex<usize>,
}

impl MemoryPackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ecosystem: Ecosystem, name: &str, version: &str) -> Self {
        self.known
            .insert((ecosystem, name.to_string()), version.to_string());
        self
    }

    /// Lookups of this package return a transport error.
    pub fn failing(mut self, ecosystem: Ecosystem, name: &str) -> Self {
        self.failing.insert((ecosystem, name.to_string()));
        self
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl PackageIndex for MemoryPackageIndex {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> IndexResult<IndexLookup> {
        *self.lookups.lock().unwrap() += 1;
        let key = (ecosystem, name.to_string());
        if self.failing.contains(&key) {
            return Err(IndexError::Transport("connection reset".to_string()));
        }
        Ok(match self.known.get(&key) {
            Some(version) => IndexLookup::Found {
                version: version.clone(),
            },
            None => IndexLookup::NotFound,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct GeneratorScript {
    replies: Vec<String>,
    error: Option<String>,
    prompts: Vec<String>,
}

/// Generator that hands out scripted replies in order and records prompts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<GeneratorScript>>,
}

impl ScriptedGenerator {
    pub fn replying(replies: &[&str]) -> Self {
        let g = Self::default();
        g.script.lock().unwrap().replies = replies.iter().rev().map(|r| r.to_string()).collect();
        g
    }

    pub fn failing(message: &str) -> Self {
        let g = Self::default();
        g.script.lock().unwrap().error = Some(message.to_string());
        g
    }

    pub fn prompts(&self) -> Vec<String> {
        self.script.lock().unwrap().prompts.clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut script = self.script.lock().unwrap();
        script.prompts.push(prompt.to_string());
        if let Some(message) = &script.error {
            return Err(SkillgateError::Collaborator(message.clone()));
        }
        script
            .replies
            .pop()
            .ok_or_else(|| SkillgateError::Collaborator("no scripted reply left".to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PublisherState {
    published: BTreeMap<String, PublishRequest>,
    requests: Vec<PublishRequest>,
    error: Option<String>,
}

/// Publish target that keeps the latest request per slug.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<Mutex<PublisherState>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        let p = Self::default();
        p.state.lock().unwrap().error = Some(message.to_string());
        p
    }

    pub fn requests(&self) -> Vec<PublishRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn published(&self, slug: &str) -> Option<PublishRequest> {
        self.state.lock().unwrap().published.get(slug).cloned()
    }
}

#[async_trait]
impl PublishTarget for RecordingPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        if let Some(message) = &state.error {
            return Err(SkillgateError::Collaborator(message.clone()));
        }
        state.published.insert(request.slug.clone(), request.clone());
        Ok(format!("memory://skills/{}/SKILL.md", request.slug))
    }
}

// ---------------------------------------------------------------------------
// StaticCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogState {
    own: BTreeSet<String>,
    competitors: BTreeMap<String, BTreeSet<String>>,
    documents: BTreeMap<(String, String), String>,
    listing_calls: usize,
}

/// Catalog with fixed listings and documents. Unknown sources list nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl StaticCatalog {
    pub fn with_own(self, skills: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .own
            .extend(skills.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_competitor(self, source_id: &str, skills: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .competitors
            .entry(source_id.to_string())
            .or_default()
            .extend(skills.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_document(self, source_id: &str, skill: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert((source_id.to_string(), skill.to_string()), text.to_string());
        self
    }

    /// Listing calls made so far, own and competitor combined.
    pub fn listing_calls(&self) -> usize {
        self.state.lock().unwrap().listing_calls
    }
}

#[async_trait]
impl SkillCatalog for StaticCatalog {
    async fn own_skills(&self) -> Result<BTreeSet<String>> {
        let mut state = self.state.lock().unwrap();
        state.listing_calls += 1;
        Ok(state.own.clone())
    }

    async fn competitor_skills(&self, source_id: &str) -> Result<BTreeSet<String>> {
        let mut state = self.state.lock().unwrap();
        state.listing_calls += 1;
        Ok(state.competitors.get(source_id).cloned().unwrap_or_default())
    }

    async fn fetch_document(&self, source_id: &str, skill: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .get(&(source_id.to_string(), skill.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// StaticCollector
// ---------------------------------------------------------------------------

/// Collector returning the same excerpts for every topic.
#[derive(Debug, Clone, Default)]
pub struct StaticCollector {
    sources: BTreeMap<String, String>,
    error: Option<String>,
}

impl StaticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_id: &str, text: &str) -> Self {
        self.sources.insert(source_id.to_string(), text.to_string());
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SourceCollector for StaticCollector {
    async fn collect(&self, _topic: &str) -> Result<BTreeMap<String, String>> {
        match &self.error {
            Some(message) => Err(SkillgateError::Collaborator(message.clone())),
            None => Ok(self.sources.clone()),
        }
    }
}
