//! GitHub-backed publish target and skill catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillgate_core::{
    CompetitorSource, PublishRequest, PublishTarget, Result, SkillCatalog,
};
use tracing::{debug, info};

use crate::error::{RemoteError, RemoteResult};
use crate::http::build_client;

pub const GITHUB_API: &str = "https://api.github.com";
pub const GITHUB_RAW: &str = "https://raw.githubusercontent.com";
pub const SKILL_FILE: &str = "SKILL.md";

const COMMITTER_NAME: &str = "SharpSkills-Bot";
const COMMITTER_EMAIL: &str = "bot@sharpskill.dev";

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Token for authenticated calls; publishing needs one
    pub token: Option<String>,
    /// Owner of the published catalog
    pub username: String,
    /// Repository holding the published catalog
    pub repo: String,
    /// Directory inside the repository with one folder per skill
    pub skills_path: String,
    pub api_base: String,
    pub raw_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            username: std::env::var("GITHUB_USERNAME").unwrap_or_else(|_| "SharpSkill".to_string()),
            repo: std::env::var("GITHUB_REPO").unwrap_or_else(|_| "skills".to_string()),
            skills_path: "skills".to_string(),
            api_base: GITHUB_API.to_string(),
            raw_base: GITHUB_RAW.to_string(),
        }
    }
}

impl GithubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific catalog repository, without a token
    pub fn new(username: &str, repo: &str) -> Self {
        GithubConfig {
            token: None,
            username: username.to_string(),
            repo: repo.to_string(),
            skills_path: "skills".to_string(),
            api_base: GITHUB_API.to_string(),
            raw_base: GITHUB_RAW.to_string(),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Point at alternate API and raw-content roots.
    pub fn with_bases(mut self, api_base: &str, raw_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.raw_base = raw_base.trim_end_matches('/').to_string();
        self
    }

    pub fn full_repo(&self) -> String {
        format!("{}/{}", self.username, self.repo)
    }

    /// Contents API URL for `path` inside `repo`.
    pub fn contents_url(&self, repo: &str, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, repo, path)
            .trim_end_matches('/')
            .to_string()
    }

    /// Raw URL of a skill document on the `main` branch.
    pub fn raw_skill_url(&self, repo: &str, skills_path: &str, skill: &str) -> String {
        if skills_path.is_empty() {
            format!("{}/{}/main/{}/{}", self.raw_base, repo, skill, SKILL_FILE)
        } else {
            format!(
                "{}/{}/main/{}/{}/{}",
                self.raw_base, repo, skills_path, skill, SKILL_FILE
            )
        }
    }

    pub fn published_path(&self, slug: &str) -> String {
        if self.skills_path.is_empty() {
            format!("{slug}/{SKILL_FILE}")
        } else {
            format!("{}/{slug}/{SKILL_FILE}", self.skills_path)
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Directory names from a contents listing. Anything other than a JSON
/// array (e.g. a single file object) yields nothing.
pub fn parse_dir_listing(body: &Value) -> BTreeSet<String> {
    body.as_array()
        .map(|items| {
            items
                .iter()
                .filter(|i| i.get("type").and_then(Value::as_str) == Some("dir"))
                .filter_map(|i| i.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn pr_title_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"adds?\s+([a-z0-9-]+)\s+skill").expect("static pattern"))
}

/// Skill names announced by open pull request titles ("Add foo skill").
pub fn parse_pr_titles(body: &Value) -> BTreeSet<String> {
    body.as_array()
        .map(|prs| {
            prs.iter()
                .filter_map(|pr| pr.get("title").and_then(Value::as_str))
                .filter_map(|title| {
                    let lower = title.to_lowercase();
                    pr_title_pattern()
                        .captures(&lower)
                        .map(|c| c[1].to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn commit_body(request: &PublishRequest, sha: Option<&str>) -> Value {
    let mut body = json!({
        "message": request.message,
        "content": base64::engine::general_purpose::STANDARD.encode(request.content.as_bytes()),
        "committer": {"name": COMMITTER_NAME, "email": COMMITTER_EMAIL},
    });
    if let Some(sha) = sha {
        body["sha"] = json!(sha);
    }
    body
}

// ---------------------------------------------------------------------------
// Shared client
// ---------------------------------------------------------------------------

struct GithubApi {
    config: GithubConfig,
    client: reqwest::Client,
}

impl GithubApi {
    fn new(config: GithubConfig, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            config,
            client: build_client(timeout)?,
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github.v3+json");
        match &self.config.token {
            Some(token) => builder.header("Authorization", format!("token {token}")),
            None => builder,
        }
    }

    /// JSON body of a GET, `None` on 404.
    async fn get_json(&self, url: &str) -> RemoteResult<Option<Value>> {
        debug!(url = %url, "github get");
        let response = self.request(reqwest::Method::GET, url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            s => Err(RemoteError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Create-or-update of `skills/<slug>/SKILL.md` through the contents API.
pub struct GithubPublisher {
    api: GithubApi,
}

impl GithubPublisher {
    pub fn new(config: GithubConfig, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            api: GithubApi::new(config, timeout)?,
        })
    }

    async fn put(&self, request: &PublishRequest) -> RemoteResult<String> {
        let config = &self.api.config;
        if config.token.is_none() {
            return Err(RemoteError::NotConfigured("GITHUB_TOKEN".to_string()));
        }
        let path = config.published_path(&request.slug);
        let url = config.contents_url(&config.full_repo(), &path);

        let sha = self
            .api
            .get_json(&url)
            .await?
            .and_then(|v| v.get("sha").and_then(Value::as_str).map(str::to_string));

        let response = self
            .api
            .request(reqwest::Method::PUT, &url)
            .json(&commit_body(request, sha.as_deref()))
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => {
                info!(slug = %request.slug, updated = sha.is_some(), "published");
                Ok(format!("https://github.com/{}/blob/main/{}", config.full_repo(), path))
            }
            status => Err(RemoteError::Status { url, status }),
        }
    }
}

#[async_trait]
impl PublishTarget for GithubPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String> {
        Ok(self.put(request).await?)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Listings of our own catalog and of competing catalogs hosted on GitHub.
pub struct GithubCatalog {
    api: GithubApi,
    sources: BTreeMap<String, CompetitorSource>,
}

impl GithubCatalog {
    pub fn new(
        config: GithubConfig,
        sources: Vec<CompetitorSource>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        Ok(Self {
            api: GithubApi::new(config, timeout)?,
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
        })
    }

    fn source(&self, source_id: &str) -> RemoteResult<&CompetitorSource> {
        self.sources
            .get(source_id)
            .ok_or_else(|| RemoteError::NotConfigured(format!("unknown source {source_id}")))
    }

    async fn list_dirs(&self, repo: &str, path: &str) -> RemoteResult<BTreeSet<String>> {
        let url = self.api.config.contents_url(repo, path);
        Ok(self
            .api
            .get_json(&url)
            .await?
            .map(|v| parse_dir_listing(&v))
            .unwrap_or_default())
    }

    async fn open_pr_skills(&self, repo: &str) -> RemoteResult<BTreeSet<String>> {
        let url = format!(
            "{}/repos/{}/pulls?state=open&per_page=100",
            self.api.config.api_base, repo
        );
        Ok(self
            .api
            .get_json(&url)
            .await?
            .map(|v| parse_pr_titles(&v))
            .unwrap_or_default())
    }

    async fn raw(&self, url: &str) -> RemoteResult<Option<String>> {
        debug!(url = %url, "raw fetch");
        let response = self.api.request(reqwest::Method::GET, url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.text().await?)),
            s => Err(RemoteError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl SkillCatalog for GithubCatalog {
    async fn own_skills(&self) -> Result<BTreeSet<String>> {
        let config = &self.api.config;
        Ok(self.list_dirs(&config.full_repo(), &config.skills_path).await?)
    }

    async fn competitor_skills(&self, source_id: &str) -> Result<BTreeSet<String>> {
        let source = self.source(source_id)?;
        let mut skills = self.list_dirs(&source.repo, &source.skills_path).await?;
        skills.extend(self.open_pr_skills(&source.repo).await?);
        Ok(skills)
    }

    async fn fetch_document(&self, source_id: &str, skill: &str) -> Result<Option<String>> {
        let config = &self.api.config;
        let url = match self.sources.get(source_id) {
            Some(source) => config.raw_skill_url(&source.repo, &source.skills_path, skill),
            None => config.raw_skill_url(&config.full_repo(), &config.skills_path, skill),
        };
        Ok(self.raw(&url).await?)
    }
}
