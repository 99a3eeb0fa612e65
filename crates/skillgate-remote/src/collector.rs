//! Source harvesting from package registries and the most-starred GitHub
//! repository for a topic.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use skillgate_core::{slugify, Result, SourceCollector};
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::github::GithubConfig;
use crate::http::{build_client, clip};
use crate::index::{NPM_REGISTRY, PYPI_REGISTRY};

pub const NPM_README_CHARS: usize = 5_000;
pub const PYPI_DESCRIPTION_CHARS: usize = 4_000;
pub const GITHUB_README_CHARS: usize = 6_000;
pub const ISSUE_BODY_CHARS: usize = 400;
pub const RELEASE_BODY_CHARS: usize = 300;
pub const MAX_ISSUES: usize = 8;
pub const MAX_RELEASES: usize = 5;

/// Collects `npm_official`, `pypi_official`, `github_readme_official`,
/// `github_issues_community` and `github_releases_official` excerpts.
/// Sources that cannot be read are left out.
pub struct RegistrySourceCollector {
    client: reqwest::Client,
    github: GithubConfig,
    npm_base: String,
    pypi_base: String,
    pacing: Duration,
}

impl RegistrySourceCollector {
    pub fn new(github: GithubConfig, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            github,
            npm_base: NPM_REGISTRY.to_string(),
            pypi_base: PYPI_REGISTRY.to_string(),
            pacing: Duration::from_millis(200),
        })
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_registries(mut self, npm_base: &str, pypi_base: &str) -> Self {
        self.npm_base = npm_base.trim_end_matches('/').to_string();
        self.pypi_base = pypi_base.trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, url: &str) -> RemoteResult<Option<reqwest::Response>> {
        debug!(url = %url, "source fetch");
        let mut builder = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");
        if url.starts_with(&self.github.api_base) {
            if let Some(token) = &self.github.token {
                builder = builder.header("Authorization", format!("token {token}"));
            }
        }
        let response = builder.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response)),
            s => Err(RemoteError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }

    async fn get_json(&self, url: &str) -> RemoteResult<Option<Value>> {
        match self.get(url).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn get_text(&self, url: &str) -> RemoteResult<Option<String>> {
        match self.get(url).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn github_sources(&self, key: &str, out: &mut BTreeMap<String, String>) -> RemoteResult<()> {
        let search = format!(
            "{}/search/repositories?q={key}&sort=stars&per_page=3",
            self.github.api_base
        );
        let Some(repo) = self
            .get_json(&search)
            .await?
            .and_then(|v| v.pointer("/items/0").cloned())
        else {
            return Ok(());
        };
        let Some(full_name) = repo.get("full_name").and_then(Value::as_str) else {
            return Ok(());
        };
        let stars = repo.get("stargazers_count").and_then(Value::as_u64).unwrap_or(0);

        for branch in ["main", "master"] {
            let url = format!("{}/{full_name}/{branch}/README.md", self.github.raw_base);
            if let Some(readme) = self.get_text(&url).await? {
                out.insert(
                    "github_readme_official".to_string(),
                    format!(
                        "OFFICIAL GitHub {full_name} ({stars} stars)\n{}",
                        clip(&readme, GITHUB_README_CHARS)
                    ),
                );
                break;
            }
        }

        let issues_url = format!(
            "{}/repos/{full_name}/issues?state=closed&labels=bug&sort=comments&per_page=20",
            self.github.api_base
        );
        if let Some(issues) = self.get_json(&issues_url).await? {
            if let Some(text) = issue_excerpt(&issues) {
                out.insert("github_issues_community".to_string(), text);
            }
        }

        let releases_url = format!(
            "{}/repos/{full_name}/releases?per_page={MAX_RELEASES}",
            self.github.api_base
        );
        if let Some(releases) = self.get_json(&releases_url).await? {
            if let Some(text) = release_excerpt(&releases) {
                out.insert("github_releases_official".to_string(), text);
            }
        }
        Ok(())
    }

    async fn gather(&self, topic: &str) -> RemoteResult<BTreeMap<String, String>> {
        let key = slugify(topic);
        let mut out = BTreeMap::new();

        match self.get_json(&format!("{}/{key}", self.npm_base)).await {
            Ok(Some(pkg)) => {
                if let Some(text) = npm_excerpt(&key, &pkg) {
                    out.insert("npm_official".to_string(), text);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "npm source unavailable"),
        }
        self.pause().await;

        match self.get_json(&format!("{}/{key}/json", self.pypi_base)).await {
            Ok(Some(pkg)) => {
                if let Some(text) = pypi_excerpt(&key, &pkg) {
                    out.insert("pypi_official".to_string(), text);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "pypi source unavailable"),
        }
        self.pause().await;

        if let Err(e) = self.github_sources(&key, &mut out).await {
            debug!(error = %e, "github sources unavailable");
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Excerpt formatting
// ---------------------------------------------------------------------------

pub fn npm_excerpt(key: &str, pkg: &Value) -> Option<String> {
    let latest = pkg.pointer("/dist-tags/latest").and_then(Value::as_str)?;
    let description = pkg.get("description").and_then(Value::as_str).unwrap_or("");
    let keywords: Vec<&str> = pkg
        .get("keywords")
        .and_then(Value::as_array)
        .map(|k| k.iter().filter_map(Value::as_str).take(10).collect())
        .unwrap_or_default();
    let readme = pkg.get("readme").and_then(Value::as_str).unwrap_or("");
    Some(format!(
        "OFFICIAL npm {key}@{latest}\nDesc: {description}\nKeywords: {}\nREADME:\n{}",
        keywords.join(", "),
        clip(readme, NPM_README_CHARS)
    ))
}

pub fn pypi_excerpt(key: &str, pkg: &Value) -> Option<String> {
    let info = pkg.get("info")?;
    let version = info.get("version").and_then(Value::as_str).unwrap_or("");
    let summary = info.get("summary").and_then(Value::as_str).unwrap_or("");
    let description = info.get("description").and_then(Value::as_str).unwrap_or("");
    Some(format!(
        "OFFICIAL PyPI {key}@{version}\nSummary: {summary}\nInstall: pip install {key}\nDocs:\n{}",
        clip(description, PYPI_DESCRIPTION_CHARS)
    ))
}

/// Closed bug issues that drew discussion, most-commented first as listed.
pub fn issue_excerpt(issues: &Value) -> Option<String> {
    let texts: Vec<String> = issues
        .as_array()?
        .iter()
        .take(12)
        .filter_map(|i| {
            let comments = i.get("comments").and_then(Value::as_u64).unwrap_or(0);
            if comments == 0 {
                return None;
            }
            let title = i.get("title").and_then(Value::as_str).unwrap_or("");
            let body = i.get("body").and_then(Value::as_str).unwrap_or("");
            Some(format!(
                "BUG ({comments} comments): {title}\n{}",
                clip(body, ISSUE_BODY_CHARS)
            ))
        })
        .take(MAX_ISSUES)
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n\n"))
}

pub fn release_excerpt(releases: &Value) -> Option<String> {
    let texts: Vec<String> = releases
        .as_array()?
        .iter()
        .take(MAX_RELEASES)
        .map(|r| {
            let tag = r.get("tag_name").and_then(Value::as_str).unwrap_or("");
            let name = r.get("name").and_then(Value::as_str).unwrap_or("");
            let body = r.get("body").and_then(Value::as_str).unwrap_or("");
            format!("RELEASE {tag}: {name}\n{}", clip(body, RELEASE_BODY_CHARS))
        })
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n\n"))
}

#[async_trait]
impl SourceCollector for RegistrySourceCollector {
    async fn collect(&self, topic: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.gather(topic).await?)
    }
}
