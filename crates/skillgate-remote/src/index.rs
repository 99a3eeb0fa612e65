//! npm and PyPI package index lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use skillgate_core::{Ecosystem, IndexError, IndexLookup, IndexResult, PackageIndex};
use tracing::debug;

use crate::error::RemoteResult;
use crate::http::build_client;

pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";
pub const PYPI_REGISTRY: &str = "https://pypi.org/pypi";

/// Public npm and PyPI registries behind one [`PackageIndex`].
pub struct RegistryIndex {
    client: reqwest::Client,
    npm_base: String,
    pypi_base: String,
    timeout: Duration,
}

impl RegistryIndex {
    pub fn new(timeout: Duration) -> RemoteResult<Self> {
        Self::with_bases(NPM_REGISTRY, PYPI_REGISTRY, timeout)
    }

    /// Point at alternate registry roots (mirrors, tests).
    pub fn with_bases(npm_base: &str, pypi_base: &str, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            npm_base: npm_base.trim_end_matches('/').to_string(),
            pypi_base: pypi_base.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn url_for(&self, ecosystem: Ecosystem, name: &str) -> String {
        match ecosystem {
            Ecosystem::Npm => format!("{}/{}", self.npm_base, name.replace('/', "%2F")),
            Ecosystem::Pypi => format!("{}/{}/json", self.pypi_base, name),
        }
    }
}

/// Latest version from an index document.
pub fn parse_latest_version(ecosystem: Ecosystem, body: &Value) -> Option<String> {
    let version = match ecosystem {
        Ecosystem::Npm => body.pointer("/dist-tags/latest"),
        Ecosystem::Pypi => body.pointer("/info/version"),
    };
    version.and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl PackageIndex for RegistryIndex {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> IndexResult<IndexLookup> {
        let url = self.url_for(ecosystem, name);
        debug!(url = %url, "index lookup");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexError::Timeout(self.timeout.as_millis() as u64)
            } else {
                IndexError::Transport(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(IndexLookup::NotFound),
            s if s.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| IndexError::Malformed(e.to_string()))?;
                let version = parse_latest_version(ecosystem, &body)
                    .ok_or_else(|| IndexError::Malformed(format!("{url}: no latest version")))?;
                Ok(IndexLookup::Found { version })
            }
            s => Err(IndexError::Transport(format!("{url} returned HTTP {}", s.as_u16()))),
        }
    }
}
