//! Pipeline configuration.
//!
//! Defaults are usable as-is; [`PipelineConfig::from_env`] overlays any
//! `SKILLGATE_*` variables that are set.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Result, SkillgateError};
use crate::sandbox::SandboxConfig;
use crate::score::PUBLISH_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Minimum overall score for an unlabelled publish.
    pub publish_threshold: f64,
    pub sandbox: SandboxConfig,
    pub max_sandbox_blocks: usize,
    pub max_mocked_blocks: usize,
    /// Minimum spacing between real package index calls (milliseconds).
    pub index_spacing_ms: u64,
    pub index_timeout_ms: u64,
    pub index_cache_ttl_secs: u64,
    pub own_catalog_ttl_secs: u64,
    pub competitor_catalog_ttl_secs: u64,
    /// Upper bound on failure notes handed to the repair request.
    pub repair_note_limit: usize,
    /// Timeout applied to collector, generator and publisher calls (milliseconds).
    pub collaborator_timeout_ms: u64,
    /// Delay between topics in a batch (milliseconds).
    pub batch_pacing_ms: u64,
    pub skills_dir: PathBuf,
    pub drafts_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            publish_threshold: PUBLISH_THRESHOLD,
            sandbox: SandboxConfig::default(),
            max_sandbox_blocks: crate::levels::MAX_SANDBOX_BLOCKS,
            max_mocked_blocks: crate::levels::MAX_MOCKED_BLOCKS,
            index_spacing_ms: 150,
            index_timeout_ms: 5_000,
            index_cache_ttl_secs: 3_600,
            own_catalog_ttl_secs: 3_600,
            competitor_catalog_ttl_secs: 6 * 3_600,
            repair_note_limit: 12,
            collaborator_timeout_ms: 120_000,
            batch_pacing_ms: 2_000,
            skills_dir: PathBuf::from("skills"),
            drafts_dir: PathBuf::from("drafts"),
            reports_dir: PathBuf::from("test_reports"),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `SKILLGATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        overlay(&lookup, "SKILLGATE_THRESHOLD", &mut cfg.publish_threshold)?;
        overlay(&lookup, "SKILLGATE_SANDBOX_TIMEOUT_MS", &mut cfg.sandbox.timeout_ms)?;
        overlay(&lookup, "SKILLGATE_CHECK_TIMEOUT_MS", &mut cfg.sandbox.check_timeout_ms)?;
        overlay(&lookup, "SKILLGATE_INDEX_SPACING_MS", &mut cfg.index_spacing_ms)?;
        overlay(&lookup, "SKILLGATE_INDEX_TIMEOUT_MS", &mut cfg.index_timeout_ms)?;
        overlay(&lookup, "SKILLGATE_COLLABORATOR_TIMEOUT_MS", &mut cfg.collaborator_timeout_ms)?;
        overlay(&lookup, "SKILLGATE_BATCH_PACING_MS", &mut cfg.batch_pacing_ms)?;
        overlay(&lookup, "SKILLGATE_PYTHON", &mut cfg.sandbox.python_bin)?;
        overlay(&lookup, "SKILLGATE_NODE", &mut cfg.sandbox.node_bin)?;
        overlay(&lookup, "SKILLGATE_BASH", &mut cfg.sandbox.bash_bin)?;
        overlay(&lookup, "SKILLGATE_SKILLS_DIR", &mut cfg.skills_dir)?;
        overlay(&lookup, "SKILLGATE_DRAFTS_DIR", &mut cfg.drafts_dir)?;
        overlay(&lookup, "SKILLGATE_REPORTS_DIR", &mut cfg.reports_dir)?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.publish_threshold) {
            return Err(SkillgateError::Config(format!(
                "publish threshold must be within [0, 1], got {}",
                self.publish_threshold
            )));
        }
        if self.sandbox.timeout_ms == 0 {
            return Err(SkillgateError::Config(
                "sandbox timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn index_spacing(&self) -> Duration {
        Duration::from_millis(self.index_spacing_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }
}

fn overlay<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| SkillgateError::Config(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.publish_threshold, 0.75);
        assert_eq!(cfg.index_spacing_ms, 150);
        assert_eq!(cfg.batch_pacing_ms, 2_000);
        assert_eq!(cfg.repair_note_limit, 12);
        assert_eq!(cfg.reports_dir, PathBuf::from("test_reports"));
    }

    #[test]
    fn test_env_overlay() {
        let cfg = PipelineConfig::from_lookup(lookup_from(&[
            ("SKILLGATE_THRESHOLD", "0.8"),
            ("SKILLGATE_PYTHON", "/usr/bin/python3.12"),
            ("SKILLGATE_REPORTS_DIR", "/var/lib/skillgate/reports"),
        ]))
        .unwrap();
        assert_eq!(cfg.publish_threshold, 0.8);
        assert_eq!(cfg.sandbox.python_bin, "/usr/bin/python3.12");
        assert_eq!(cfg.reports_dir, PathBuf::from("/var/lib/skillgate/reports"));
        assert_eq!(cfg.sandbox.timeout_ms, 8_000);
    }

    #[test]
    fn test_bad_value_is_config_error() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("SKILLGATE_INDEX_SPACING_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, SkillgateError::Config(_)));
        assert!(err.to_string().contains("SKILLGATE_INDEX_SPACING_MS"));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("SKILLGATE_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }
}
