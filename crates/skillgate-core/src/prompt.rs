//! Prompt text for generation and repair, plus the template fallback used
//! when no generator is available.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::dedup::GapAnalysis;
use crate::document::MAX_DESCRIPTION_CHARS;
use crate::domain::{DedupAction, SourceBreakdown};

/// Characters of each source excerpt quoted into the generation prompt.
pub const EXCERPT_CHARS: usize = 1500;
/// Excerpts quoted per provenance.
pub const EXCERPTS_PER_KIND: usize = 3;

/// Sections every generated document is asked to carry, in order.
pub const SECTIONS: &[&str] = &[
    "Quick Start",
    "When to Use",
    "Core Patterns",
    "Production Notes",
    "Failure Modes",
    "Pre-Deploy Checklist",
    "Troubleshooting",
    "Resources",
];

/// Count excerpts by provenance from their source ids.
pub fn source_breakdown(sources: &BTreeMap<String, String>) -> SourceBreakdown {
    SourceBreakdown {
        official: sources.keys().filter(|k| k.contains("official")).count(),
        community: sources.keys().filter(|k| k.contains("community")).count(),
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Everything that shapes one generation request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationBrief<'a> {
    pub topic: &'a str,
    pub slug: &'a str,
    pub action: DedupAction,
    pub gaps: Option<&'a GapAnalysis>,
    pub sources: &'a BTreeMap<String, String>,
}

pub fn generation_prompt(brief: &GenerationBrief<'_>) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "Write a production-grade skill document for: {}\n",
        brief.topic
    );

    match brief.action {
        DedupAction::Compete => {
            p.push_str("A document on this topic already exists elsewhere. Write a better one from primary sources.\n");
        }
        DedupAction::Variant => {
            p.push_str("Related documents exist. Take a distinct, more specific angle.\n");
        }
        DedupAction::Generate | DedupAction::Skip => {}
    }
    if let Some(gaps) = brief.gaps {
        if !gaps.covered.is_empty() {
            let _ = writeln!(p, "Already covered elsewhere: {}", gaps.covered.join("; "));
        }
        if !gaps.focus.is_empty() {
            let _ = writeln!(p, "Focus on: {}", gaps.focus.join("; "));
        }
    }
    p.push('\n');

    for (kind, label) in [("official", "OFFICIAL"), ("community", "COMMUNITY")] {
        for (id, text) in brief
            .sources
            .iter()
            .filter(|(id, _)| id.contains(kind))
            .take(EXCERPTS_PER_KIND)
        {
            let _ = writeln!(p, "=== {label} SOURCE: {id} ===\n{}\n", excerpt(text));
        }
    }

    let _ = writeln!(
        p,
        "Header requirements:\n\
         - open with a `---` metadata block\n\
         - name: {} (kebab-case)\n\
         - description: at most {} characters, no XML tags\n",
        brief.slug, MAX_DESCRIPTION_CHARS
    );
    let _ = writeln!(p, "Sections, in order:");
    for s in SECTIONS {
        let _ = writeln!(p, "## {s}");
    }
    p.push_str(
        "\nEvery code block must run as written: real package names, fenced with a language tag, \
         credentials read from the environment.\n\n\
         Return ONLY the document, starting with ---",
    );
    p
}

/// Prompt for the single repair attempt.
pub fn repair_prompt(failure_notes: &[String], document: &str) -> String {
    let mut p = String::from("Fix this skill document to resolve the test failures below.\n\nFAILURES:\n");
    for note in failure_notes {
        let _ = writeln!(p, "- {note}");
    }
    p.push_str(
        "\nRules:\n\
         - fix only the broken code blocks\n\
         - replace packages that do not exist with real ones\n\
         - keep the metadata header exactly as it is\n\
         - return ONLY the fixed document, starting with ---\n\n\
         DOCUMENT:\n",
    );
    p.push_str(document);
    p
}

/// Minimal document written when no generator is configured or it failed.
pub fn template_document(topic: &str, slug: &str, sources: &BTreeMap<String, String>) -> String {
    let install = if sources.contains_key("pypi_official") {
        format!("pip install {slug}")
    } else {
        format!("npm install {slug}")
    };
    format!(
        "---\n\
         name: {slug}\n\
         description: \"Production patterns for {topic}. Use when integrating {topic} into a service.\"\n\
         ---\n\n\
         # {topic}\n\n\
         ## Quick Start\n\n\
         ```bash\n{install}\n```\n\n\
         ## When to Use\n\n\
         Use this skill when working with {topic}.\n\n\
         ## Core Patterns\n\n\
         Consult the official documentation for current API usage.\n\n\
         ## Production Notes\n\n\
         Read credentials from the environment and never commit them.\n\n\
         ## Failure Modes\n\n\
         Network errors, authentication errors and rate limits.\n\n\
         ## Pre-Deploy Checklist\n\n\
         - [ ] credentials configured\n\
         - [ ] error handling in place\n\n\
         ## Troubleshooting\n\n\
         Check the service status page and your credentials first.\n\n\
         ## Resources\n\n\
         - Official documentation for {topic}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::validate_header;

    fn sources() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("npm_official".to_string(), "npm readme".to_string()),
            ("pypi_official".to_string(), "pypi readme".to_string()),
            ("github_issues_community".to_string(), "issue text".to_string()),
        ])
    }

    #[test]
    fn test_source_breakdown() {
        let b = source_breakdown(&sources());
        assert_eq!(b.official, 2);
        assert_eq!(b.community, 1);
    }

    #[test]
    fn test_generation_prompt_carries_gaps_and_sources() {
        let src = sources();
        let gaps = GapAnalysis {
            covered: vec!["Webhooks".into()],
            focus: vec!["Idempotency and retry safety".into()],
            ..GapAnalysis::default()
        };
        let p = generation_prompt(&GenerationBrief {
            topic: "Stripe",
            slug: "stripe",
            action: DedupAction::Compete,
            gaps: Some(&gaps),
            sources: &src,
        });
        assert!(p.contains("Write a better one"));
        assert!(p.contains("Already covered elsewhere: Webhooks"));
        assert!(p.contains("Focus on: Idempotency and retry safety"));
        assert!(p.contains("=== OFFICIAL SOURCE: npm_official ==="));
        assert!(p.contains("=== COMMUNITY SOURCE: github_issues_community ==="));
        assert!(p.contains("## Pre-Deploy Checklist"));
        assert!(p.ends_with("starting with ---"));
    }

    #[test]
    fn test_repair_prompt_lists_notes_before_document() {
        let p = repair_prompt(&["L1: SyntaxError L2: bad".into()], "---\nname: x\n---\n");
        let note = p.find("- L1: SyntaxError").expect("note present");
        let doc = p.find("DOCUMENT:\n---").expect("document present");
        assert!(note < doc);
    }

    #[test]
    fn test_template_has_valid_header() {
        let doc = template_document("Resend Email", "resend-email", &sources());
        assert!(validate_header(&doc).is_valid());
        assert!(doc.contains("pip install resend-email"));

        let doc = template_document("Resend Email", "resend-email", &BTreeMap::new());
        assert!(doc.contains("npm install resend-email"));
    }
}
