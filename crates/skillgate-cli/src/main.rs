//! skillgate - validation and publish gating for generated skill documents
//!
//! ## Commands
//!
//! - `run`: generate, validate and route one topic
//! - `batch`: run a list of topics with pacing between them
//! - `test`: re-validate the local copy of a skill without publishing
//! - `validate`: header checks over local skill documents
//! - `report`: list persisted run reports or show one
//! - `dedup`: show the dedup decision for a topic

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};

use skillgate_core::{
    standard_sources, status_counts, validate_header, Collaborators, ContentGenerator,
    DedupDecision, FinalStatus, PipelineConfig, PipelineReport, ProcessRunner, SkillPipeline,
    StageRecord,
};
use skillgate_remote::{
    AnthropicConfig, AnthropicGenerator, GithubCatalog, GithubConfig, GithubPublisher,
    RegistryIndex, RegistrySourceCollector,
};

#[derive(Parser)]
#[command(name = "skillgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate, repair and publish generated skill documents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding one folder per local skill
    #[arg(long, global = true, env = "SKILLGATE_SKILLS_DIR")]
    skills_dir: Option<PathBuf>,

    /// Directory for persisted run reports
    #[arg(long, global = true, env = "SKILLGATE_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one topic
    Run {
        /// Tool or library the skill is about
        topic: String,
    },

    /// Run the pipeline for several topics
    Batch {
        /// Topics to run, in order
        topics: Vec<String>,

        /// File with one topic per line (`#` starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Re-validate a local skill document without publishing
    Test {
        /// Skill slug under the skills directory
        slug: String,
    },

    /// Check document headers of local skills
    Validate {
        /// Skill slug to check
        slug: Option<String>,

        /// Check every skill under the skills directory
        #[arg(long, conflicts_with = "slug")]
        all: bool,
    },

    /// List persisted reports, or show one by trace id
    Report {
        /// Trace id of the report to show
        #[arg(long)]
        trace: Option<String>,
    },

    /// Show the dedup decision for a topic
    Dedup {
        topic: String,

        /// Drop cached catalog listings first
        #[arg(long)]
        refresh: bool,

        /// Print every catalog listing that was consulted
        #[arg(long)]
        scan: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    skillgate_core::init_tracing(cli.json, level);

    let mut config = PipelineConfig::from_env().context("Invalid SKILLGATE_* configuration")?;
    if let Some(dir) = cli.skills_dir {
        config.skills_dir = dir;
    }
    if let Some(dir) = cli.reports_dir {
        config.reports_dir = dir;
    }

    match cli.command {
        Commands::Run { topic } => cmd_run(&build_pipeline(config)?, &topic).await,
        Commands::Batch { topics, file } => {
            cmd_batch(&build_pipeline(config)?, topics, file.as_deref()).await
        }
        Commands::Test { slug } => cmd_test(&build_pipeline(config)?, &slug).await,
        Commands::Validate { slug, all } => cmd_validate(&config.skills_dir, slug.as_deref(), all),
        Commands::Report { trace } => cmd_report(&build_pipeline(config)?, trace.as_deref()),
        Commands::Dedup {
            topic,
            refresh,
            scan,
        } => cmd_dedup(&build_pipeline(config)?, &topic, refresh, scan).await,
    }
}

/// Wire the HTTP collaborators from the environment.
fn build_pipeline(config: PipelineConfig) -> Result<SkillPipeline> {
    let call_timeout = config.collaborator_timeout();
    let github = GithubConfig::from_env();
    let sources = standard_sources();

    let generator: Option<Arc<dyn ContentGenerator>> = match AnthropicConfig::from_env() {
        Some(cfg) => Some(Arc::new(
            AnthropicGenerator::new(cfg, call_timeout).context("Failed to build generator")?,
        )),
        None => {
            debug!("ANTHROPIC_API_KEY not set; generation and repair unavailable");
            None
        }
    };

    let collaborators = Collaborators {
        collector: Arc::new(RegistrySourceCollector::new(github.clone(), call_timeout)?),
        generator,
        publisher: Arc::new(GithubPublisher::new(github.clone(), call_timeout)?),
        catalog: Arc::new(GithubCatalog::new(github, sources.clone(), call_timeout)?),
        index: Arc::new(RegistryIndex::new(config.index_timeout())?),
        runner: Arc::new(ProcessRunner::new(config.sandbox.clone())),
    };

    Ok(SkillPipeline::new(config, collaborators)?.with_competitor_sources(sources))
}

async fn cmd_run(pipeline: &SkillPipeline, topic: &str) -> Result<()> {
    let report = pipeline.run(topic).await?;
    print_report(&report);
    if report.final_status == FinalStatus::Fail {
        bail!("{} ended in FAIL (trace {})", report.slug, report.trace_id);
    }
    Ok(())
}

async fn cmd_batch(pipeline: &SkillPipeline, mut topics: Vec<String>, file: Option<&Path>) -> Result<()> {
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topics from {:?}", path))?;
        topics.extend(parse_topics(&text));
    }
    if topics.is_empty() {
        bail!("no topics given");
    }

    let summary = pipeline.batch(&topics).await;
    for run in &summary.runs {
        println!(
            "{:<11} {:.2}  {}  ({})",
            run.final_status.as_str(),
            run.overall_score,
            run.slug,
            run.trace_id
        );
    }
    for topic in &summary.rejected_topics {
        println!("{:<11}       {}", "REJECTED", topic);
    }
    println!();
    for (status, count) in &summary.counts {
        println!("{status}: {count}");
    }
    println!("total: {}", summary.total);
    Ok(())
}

async fn cmd_test(pipeline: &SkillPipeline, slug: &str) -> Result<()> {
    let report = pipeline.test_local(slug).await?;
    print_report(&report);
    if report.final_status == FinalStatus::Fail {
        bail!("{slug} failed validation (trace {})", report.trace_id);
    }
    Ok(())
}

fn cmd_validate(skills_dir: &Path, slug: Option<&str>, all: bool) -> Result<()> {
    let slugs = match (slug, all) {
        (Some(s), _) => vec![s.to_string()],
        (None, true) => local_skills(skills_dir)?,
        (None, false) => bail!("give a slug or --all"),
    };

    let mut invalid = 0;
    for slug in &slugs {
        let problems = validate_file(&skills_dir.join(slug).join("SKILL.md"));
        if problems.is_empty() {
            println!("ok       {slug}");
        } else {
            invalid += 1;
            println!("invalid  {slug}");
            for p in problems {
                println!("           - {p}");
            }
        }
    }
    println!("\n{} checked, {} invalid", slugs.len(), invalid);
    if invalid > 0 {
        bail!("{invalid} document(s) failed header validation");
    }
    Ok(())
}

fn cmd_report(pipeline: &SkillPipeline, trace: Option<&str>) -> Result<()> {
    if let Some(trace_id) = trace {
        let report = pipeline.store().find(trace_id)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let summaries = pipeline.store().list()?;
    if summaries.is_empty() {
        println!("No reports in {:?}", pipeline.store().reports_dir());
        return Ok(());
    }
    for s in &summaries {
        println!(
            "{}  {:<11} {:.2}  {}  {}",
            s.started_at.format("%Y-%m-%d %H:%M"),
            s.final_status.as_str(),
            s.overall_score,
            s.slug,
            s.trace_id
        );
    }
    println!();
    for (status, count) in status_counts(&summaries) {
        println!("{status}: {count}");
    }
    Ok(())
}

async fn cmd_dedup(pipeline: &SkillPipeline, topic: &str, refresh: bool, scan: bool) -> Result<()> {
    if refresh {
        pipeline.clear_caches();
    }
    let decision = pipeline.dedup().resolve(topic).await;
    print_decision(&decision);

    if scan {
        println!();
        for (source, skills) in pipeline.dedup().market_map().await {
            println!("{source} ({})", skills.len());
            for skill in skills {
                println!("  {skill}");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_topics(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn local_skills(skills_dir: &Path) -> Result<Vec<String>> {
    let mut slugs = Vec::new();
    for entry in std::fs::read_dir(skills_dir)
        .with_context(|| format!("Failed to read skills directory {:?}", skills_dir))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            slugs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    slugs.sort();
    Ok(slugs)
}

fn validate_file(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => validate_header(&text).problems,
        Err(e) => vec![format!("cannot read {}: {e}", path.display())],
    }
}

fn print_decision(decision: &DedupDecision) {
    println!("{}  {}", decision.action.as_str(), decision.slug);
    println!("  {}", decision.reason);
    for c in &decision.conflicts {
        println!(
            "  - {} {} [{} / {}]",
            c.match_type.as_str(),
            c.skill_name,
            c.source_id,
            c.tier.as_str()
        );
    }
}

fn print_report(report: &PipelineReport) {
    println!("{} ({})", report.slug, report.trace_id);
    for stage in &report.stages {
        match stage {
            StageRecord::Step(step) => {
                println!("  {:<14} {}", step.stage.as_str(), step.status.as_str());
                for note in &step.notes {
                    println!("      {note}");
                }
            }
            StageRecord::Level(level) => {
                println!(
                    "  {:<14} {} ({:.2})",
                    level.level().title(),
                    level.status().as_str(),
                    level.score()
                );
                for failure in level.failures() {
                    println!("      ! {failure}");
                }
            }
            StageRecord::Repair(repair) => {
                println!("  {:<14} {}", "repair", repair.status.as_str());
                for note in &repair.notes {
                    println!("      {note}");
                }
            }
        }
    }
    println!(
        "=> {} score {:.2}{}",
        report.final_status,
        report.overall_score,
        if report.hard_failure { " (hard failure)" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics_skips_comments_and_blanks() {
        let text = "stripe\n\n# payments done\n  redis  \n";
        assert_eq!(parse_topics(text), vec!["stripe", "redis"]);
    }

    #[test]
    fn test_validate_file_reports_problems() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.md");
        std::fs::write(&good, "---\nname: good\ndescription: \"Does a thing\"\n---\n# Good\n").unwrap();
        assert!(validate_file(&good).is_empty());

        let bad = dir.path().join("bad.md");
        std::fs::write(&bad, "# no header\n").unwrap();
        assert!(!validate_file(&bad).is_empty());

        assert!(!validate_file(&dir.path().join("missing.md")).is_empty());
    }

    #[test]
    fn test_local_skills_lists_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zod")).unwrap();
        std::fs::create_dir(dir.path().join("axios")).unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();
        assert_eq!(local_skills(dir.path()).unwrap(), vec!["axios", "zod"]);
    }

    #[test]
    fn test_cli_parses_dedup_flags() {
        let cli = Cli::try_parse_from(["skillgate", "--json", "dedup", "stripe", "--scan"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Dedup { topic, refresh, scan } => {
                assert_eq!(topic, "stripe");
                assert!(!refresh && scan);
            }
            _ => panic!("expected dedup"),
        }
    }
}
