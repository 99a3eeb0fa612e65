//! L2: dependency existence against public package indexes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::TtlCache;
use crate::domain::{CodeBlock, Ecosystem, Level, LevelRecorder, LevelResult, LevelStatus};
use crate::score::skip_credit;

// ---------------------------------------------------------------------------
// Index contract
// ---------------------------------------------------------------------------

/// Definitive answer from a package index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexLookup {
    Found { version: String },
    NotFound,
}

/// Lookup failures. None of these are cached.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    #[error("lookup timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected index response: {0}")]
    Malformed(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[async_trait]
pub trait PackageIndex: Send + Sync {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> IndexResult<IndexLookup>;
}

/// Cache keyed by `(ecosystem, package name)`.
pub type LookupCache = TtlCache<(Ecosystem, String), IndexLookup>;

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Enforces a minimum spacing between consecutive real index calls.
#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    /// Sleep until at least `spacing` has passed since the previous call.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.spacing {
                tokio::time::sleep(self.spacing - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct DependencyResolver {
    index: Arc<dyn PackageIndex>,
    cache: Arc<LookupCache>,
    limiter: RateLimiter,
    lookup_timeout: Duration,
}

enum Confirmation {
    Found(String),
    Absent,
    Unconfirmed(String),
}

impl DependencyResolver {
    pub fn new(
        index: Arc<dyn PackageIndex>,
        cache: Arc<LookupCache>,
        spacing: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            index,
            cache,
            limiter: RateLimiter::new(spacing),
            lookup_timeout,
        }
    }

    pub async fn resolve(&self, blocks: &[CodeBlock]) -> LevelResult {
        let mut rec = LevelRecorder::start(Level::L2);
        let wanted = group_by_ecosystem(blocks);
        let total: usize = wanted.values().map(BTreeSet::len).sum();

        if total == 0 {
            rec.observe("no external packages detected");
            return rec.finish(LevelStatus::Skip, skip_credit(Level::L2));
        }

        let mut confirmed = 0;
        for (ecosystem, names) in &wanted {
            for name in names {
                match self.confirm(*ecosystem, name).await {
                    Confirmation::Found(version) => {
                        rec.observe(format!("{ecosystem}:{name}@{version}"));
                        confirmed += 1;
                    }
                    Confirmation::Absent => {
                        rec.fail(format!("{ecosystem}:{name} not found (wrong package name?)"))
                    }
                    Confirmation::Unconfirmed(reason) => {
                        rec.fail(format!("{ecosystem}:{name} could not be confirmed: {reason}"))
                    }
                }
            }
        }

        let status = if rec.has_failures() {
            LevelStatus::Fail
        } else {
            LevelStatus::Pass
        };
        debug!(confirmed, total, "dependency level finished");
        rec.finish(status, confirmed as f64 / total as f64)
    }

    async fn confirm(&self, ecosystem: Ecosystem, name: &str) -> Confirmation {
        let key = (ecosystem, name.to_string());
        let lookup = match self.cache.get(&key) {
            Some(hit) => hit,
            None => {
                self.limiter.wait().await;
                let call = self.index.lookup(ecosystem, name);
                match tokio::time::timeout(self.lookup_timeout, call).await {
                    Ok(Ok(lookup)) => {
                        self.cache.insert(key, lookup.clone());
                        lookup
                    }
                    Ok(Err(e)) => return Confirmation::Unconfirmed(e.to_string()),
                    Err(_) => {
                        let e = IndexError::Timeout(self.lookup_timeout.as_millis() as u64);
                        return Confirmation::Unconfirmed(e.to_string());
                    }
                }
            }
        };
        match lookup {
            IndexLookup::Found { version } => Confirmation::Found(version),
            IndexLookup::NotFound => Confirmation::Absent,
        }
    }
}

fn group_by_ecosystem(blocks: &[CodeBlock]) -> BTreeMap<Ecosystem, BTreeSet<String>> {
    let mut wanted: BTreeMap<Ecosystem, BTreeSet<String>> = BTreeMap::new();
    for block in blocks {
        if let Some(ecosystem) = block.language().ecosystem() {
            wanted
                .entry(ecosystem)
                .or_default()
                .extend(block.declared_packages().iter().cloned());
        }
    }
    wanted.retain(|_, names| !names.is_empty());
    wanted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::fakes::MemoryPackageIndex;

    fn resolver(index: Arc<MemoryPackageIndex>, cache: Arc<LookupCache>) -> DependencyResolver {
        DependencyResolver::new(index, cache, Duration::ZERO, Duration::from_secs(1))
    }

    fn fresh_cache() -> Arc<LookupCache> {
        Arc::new(TtlCache::new(Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn test_no_packages_skips() {
        let blocks = extract("```python\nimport os\nprint(os.getcwd())\n```\n");
        let index = Arc::new(MemoryPackageIndex::new());
        let result = resolver(index, fresh_cache()).resolve(&blocks).await;
        assert_eq!(result.status(), LevelStatus::Skip);
        assert_eq!(result.score(), skip_credit(Level::L2));
    }

    #[tokio::test]
    async fn test_absent_package_is_named() {
        let blocks = extract(
            "```python\nimport requests\nimport nopenope_fake\nrequests.get('x')\n```\n",
        );
        let index = Arc::new(MemoryPackageIndex::new().with(Ecosystem::Pypi, "requests", "2.32.3"));
        let result = resolver(index, fresh_cache()).resolve(&blocks).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        assert_eq!(result.score(), 0.5);
        assert!(result.failures()[0].contains("pypi:nopenope-fake"));
        assert!(result.observations().contains(&"pypi:requests@2.32.3".to_string()));
    }

    #[tokio::test]
    async fn test_packages_deduplicated_across_blocks() {
        let blocks = extract(
            "```js\nconst a = require('axios');\na.get('/');\n```\n\n```ts\nimport axios from 'axios';\nawait axios.get('/');\n```\n",
        );
        let index = Arc::new(MemoryPackageIndex::new().with(Ecosystem::Npm, "axios", "1.7.2"));
        let result = resolver(index.clone(), fresh_cache()).resolve(&blocks).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(index.lookups(), 1);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_and_skips_errors() {
        let blocks = extract("```python\nimport flaky_pkg\nimport requests\n```\n");
        let index = Arc::new(
            MemoryPackageIndex::new()
                .with(Ecosystem::Pypi, "requests", "2.32.3")
                .failing(Ecosystem::Pypi, "flaky-pkg"),
        );
        let cache = fresh_cache();
        let r = resolver(index.clone(), cache.clone());

        let first = r.resolve(&blocks).await;
        assert_eq!(first.status(), LevelStatus::Fail);
        assert!(first.failures()[0].contains("could not be confirmed"));
        assert_eq!(cache.len(), 1);

        r.resolve(&blocks).await;
        // requests served from cache; flaky-pkg looked up again
        assert_eq!(index.lookups(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(150));
        let start = tokio::time::Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
