//! On-disk artifacts: reports, drafts and local skill copies.
//!
//! Reports are written once per run to `<reports>/<slug>_<trace>.json` with a
//! sha256 sidecar (`.digest`) that is verified on every read. A report path
//! that already exists is never overwritten.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PipelineConfig;
use crate::domain::{FinalStatus, PipelineReport, Result, SkillgateError};

const SKILL_FILE: &str = "SKILL.md";
const DRAFT_REPORT_FILE: &str = "test_report.json";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One line per persisted report, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub trace_id: String,
    pub topic: String,
    pub slug: String,
    pub final_status: FinalStatus,
    pub overall_score: f64,
    pub started_at: DateTime<Utc>,
}

impl From<&PipelineReport> for ReportSummary {
    fn from(r: &PipelineReport) -> Self {
        Self {
            trace_id: r.trace_id.clone(),
            topic: r.topic.clone(),
            slug: r.slug.clone(),
            final_status: r.final_status,
            overall_score: r.overall_score,
            started_at: r.started_at,
        }
    }
}

/// Count summaries per terminal status, keyed by the status name.
pub fn status_counts(summaries: &[ReportSummary]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for s in summaries {
        *counts.entry(s.final_status.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    reports_dir: PathBuf,
    drafts_dir: PathBuf,
    skills_dir: PathBuf,
}

impl ReportStore {
    pub fn new(
        reports_dir: impl Into<PathBuf>,
        drafts_dir: impl Into<PathBuf>,
        skills_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            drafts_dir: drafts_dir.into(),
            skills_dir: skills_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.reports_dir, &config.drafts_dir, &config.skills_dir)
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn report_path(&self, report: &PipelineReport) -> PathBuf {
        self.reports_dir
            .join(format!("{}_{}.json", report.slug, report.trace_id))
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// Write the report and its digest. Fails with `ReportExists` if this
    /// run was already persisted.
    pub fn persist(&self, report: &PipelineReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let path = self.report_path(report);
        let json = serde_json::to_vec_pretty(report)?;

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SkillgateError::ReportExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&json)?;
        std::fs::write(path.with_extension("digest"), sha256_hex(&json))?;
        Ok(path)
    }

    /// Read a report and verify it against its digest.
    pub fn load(&self, path: &Path) -> Result<PipelineReport> {
        let json = std::fs::read(path)?;
        let expected = std::fs::read_to_string(path.with_extension("digest"))?;
        let actual = sha256_hex(&json);
        if expected.trim() != actual {
            return Err(SkillgateError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&json)?)
    }

    /// Load the report for `trace_id`.
    pub fn find(&self, trace_id: &str) -> Result<PipelineReport> {
        let suffix = format!("_{trace_id}.json");
        let path = self
            .report_files()?
            .into_iter()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(&suffix))
            })
            .ok_or_else(|| SkillgateError::ReportNotFound(trace_id.to_string()))?;
        self.load(&path)
    }

    /// Summaries of every readable report, oldest first. Reports that fail
    /// verification are left out.
    pub fn list(&self) -> Result<Vec<ReportSummary>> {
        let mut out: Vec<ReportSummary> = self
            .report_files()?
            .iter()
            .filter_map(|p| match self.load(p) {
                Ok(r) => Some(ReportSummary::from(&r)),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "skipping unreadable report");
                    None
                }
            })
            .collect();
        out.sort_by_key(|s| s.started_at);
        Ok(out)
    }

    fn report_files(&self) -> Result<Vec<PathBuf>> {
        if !self.reports_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.reports_dir)? {
            let path = entry?.path();
            let is_report = path.extension().is_some_and(|e| e == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with("batch_"));
            if is_report {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn skill_path(&self, slug: &str) -> PathBuf {
        self.skills_dir.join(slug).join(SKILL_FILE)
    }

    /// Write the local copy of a document, replacing any previous version.
    pub fn write_skill(&self, slug: &str, content: &str) -> Result<PathBuf> {
        let path = self.skill_path(slug);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read_skill(&self, slug: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.skill_path(slug)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Keep a document that was not published unlabelled, with its report.
    pub fn write_draft(&self, slug: &str, content: &str, report: &PipelineReport) -> Result<PathBuf> {
        let dir = self.drafts_dir.join(slug);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(SKILL_FILE);
        std::fs::write(&path, content)?;
        std::fs::write(dir.join(DRAFT_REPORT_FILE), serde_json::to_vec_pretty(report)?)?;
        Ok(path)
    }

    /// Write a batch summary next to the reports.
    pub fn write_batch<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let path = self
            .reports_dir
            .join(format!("batch_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
        std::fs::write(&path, serde_json::to_vec_pretty(summary)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> ReportStore {
        ReportStore::new(root.join("reports"), root.join("drafts"), root.join("skills"))
    }

    fn finished(trace: &str, status: FinalStatus) -> PipelineReport {
        let mut r = PipelineReport::new("Stripe", "stripe", trace);
        r.overall_score = 0.9;
        r.finalize(status);
        r
    }

    #[test]
    fn test_persist_then_load_verifies_digest() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let report = finished("abc123def456", FinalStatus::Pass);

        let path = s.persist(&report).unwrap();
        assert!(path.ends_with("reports/stripe_abc123def456.json"));
        assert!(path.with_extension("digest").exists());
        assert_eq!(s.load(&path).unwrap(), report);
        assert_eq!(s.find("abc123def456").unwrap().trace_id, "abc123def456");
    }

    #[test]
    fn test_persist_is_create_once() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let report = finished("abc123def456", FinalStatus::Pass);
        s.persist(&report).unwrap();
        assert!(matches!(s.persist(&report), Err(SkillgateError::ReportExists(_))));
    }

    #[test]
    fn test_tampered_report_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let path = s.persist(&finished("abc123def456", FinalStatus::Beta)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("BETA", "PASS")).unwrap();
        assert!(matches!(s.load(&path), Err(SkillgateError::DigestMismatch { .. })));
        assert!(s.list().unwrap().is_empty());
    }

    #[test]
    fn test_find_missing_trace() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            store(dir.path()).find("nope"),
            Err(SkillgateError::ReportNotFound(_))
        ));
    }

    #[test]
    fn test_list_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        s.persist(&finished("aaa", FinalStatus::Pass)).unwrap();
        s.persist(&finished("bbb", FinalStatus::Beta)).unwrap();
        s.persist(&finished("ccc", FinalStatus::Pass)).unwrap();
        s.write_batch(&serde_json::json!({"total": 3})).unwrap();

        let list = s.list().unwrap();
        assert_eq!(list.len(), 3);
        let counts = status_counts(&list);
        assert_eq!(counts["PASS"], 2);
        assert_eq!(counts["BETA"], 1);
    }

    #[test]
    fn test_skill_and_draft_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        assert_eq!(s.read_skill("stripe").unwrap(), None);

        s.write_skill("stripe", "---\nv1").unwrap();
        s.write_skill("stripe", "---\nv2").unwrap();
        assert_eq!(s.read_skill("stripe").unwrap().as_deref(), Some("---\nv2"));

        let draft = s
            .write_draft("stripe", "---\ndraft", &finished("abc", FinalStatus::Fail))
            .unwrap();
        assert!(draft.ends_with("drafts/stripe/SKILL.md"));
        assert!(dir.path().join("drafts/stripe/test_report.json").exists());
    }
}
