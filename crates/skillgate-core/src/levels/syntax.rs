//! L1: per-language static parse check.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::document::{parse_header, REQUIRED_OPENING_MARKER};
use crate::domain::{CodeBlock, Language, Level, LevelRecorder, LevelResult, LevelStatus};
use crate::sandbox::{truncate_chars, CodeRunner, RunMode, SandboxError};

/// Checker diagnostics are cut to this many characters.
pub const DIAGNOSTIC_LIMIT: usize = 200;

pub struct SyntaxValidator {
    runner: Arc<dyn CodeRunner>,
}

enum BlockCheck {
    Passed,
    Failed(String),
    Warned(String),
    /// Counted as passed, with a warning.
    PassedWithWarning(String),
}

impl SyntaxValidator {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self { runner }
    }

    pub async fn validate(&self, document: &str, blocks: &[CodeBlock]) -> LevelResult {
        let mut rec = LevelRecorder::start(Level::L1);

        if document.starts_with(REQUIRED_OPENING_MARKER) {
            if let Err(e) = parse_header(document) {
                rec.fail(format!("malformed metadata header: {e}"));
                return rec.finish(LevelStatus::Fail, 0.0);
            }
        }

        if blocks.is_empty() {
            rec.fail("no code blocks found");
            return rec.finish(LevelStatus::Fail, 0.0);
        }

        let mut passed = 0;
        for (i, block) in blocks.iter().enumerate() {
            let label = block.label(i);
            match self.check_block(block).await {
                BlockCheck::Passed => {
                    rec.observe(format!("{label}: syntax OK"));
                    passed += 1;
                }
                BlockCheck::PassedWithWarning(note) => {
                    rec.warn(format!("{label}: {note}"));
                    passed += 1;
                }
                BlockCheck::Warned(note) => rec.warn(format!("{label}: {note}")),
                BlockCheck::Failed(diag) => rec.fail(format!("{label}: {diag}")),
            }
        }

        let status = if rec.has_failures() {
            LevelStatus::Fail
        } else {
            LevelStatus::Pass
        };
        debug!(passed, total = blocks.len(), "syntax level finished");
        rec.finish(status, passed as f64 / blocks.len() as f64)
    }

    async fn check_block(&self, block: &CodeBlock) -> BlockCheck {
        match block.language() {
            Language::Python | Language::Javascript | Language::Typescript | Language::Bash => {
                self.check_with_runner(block).await
            }
            Language::Yaml => check_yaml(block.source_text()),
            Language::Json => match serde_json::from_str::<serde_json::Value>(block.source_text()) {
                Ok(_) => BlockCheck::Passed,
                Err(e) => BlockCheck::Failed(truncate_chars(&format!("invalid JSON: {e}"), DIAGNOSTIC_LIMIT)),
            },
            Language::Sql | Language::Unknown => {
                BlockCheck::PassedWithWarning("untestable language, not checked".to_string())
            }
        }
    }

    async fn check_with_runner(&self, block: &CodeBlock) -> BlockCheck {
        match self
            .runner
            .run(block.language(), block.source_text(), RunMode::Check)
            .await
        {
            Ok(outcome) if outcome.success() => BlockCheck::Passed,
            Ok(outcome) => {
                let diag = outcome.diagnostic().trim();
                let diag = if diag.is_empty() {
                    format!("checker exited with code {}", outcome.exit_code)
                } else {
                    diag.to_string()
                };
                BlockCheck::Failed(truncate_chars(&diag, DIAGNOSTIC_LIMIT))
            }
            Err(SandboxError::InterpreterMissing { program }) => {
                BlockCheck::PassedWithWarning(format!("{program} not available, check skipped"))
            }
            Err(e) => BlockCheck::Warned(format!("check did not complete: {e}")),
        }
    }
}

fn check_yaml(source: &str) -> BlockCheck {
    for doc in serde_yaml::Deserializer::from_str(source) {
        if let Err(e) = serde_yaml::Value::deserialize(doc) {
            return BlockCheck::Failed(truncate_chars(&format!("invalid YAML: {e}"), DIAGNOSTIC_LIMIT));
        }
    }
    BlockCheck::Passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::fakes::ScriptedRunner;

    fn validator(runner: ScriptedRunner) -> SyntaxValidator {
        SyntaxValidator::new(Arc::new(runner))
    }

    #[tokio::test]
    async fn test_zero_blocks_fails() {
        let doc = "---\nname: empty\ndescription: nothing\n---\n\n# No code\n";
        let result = validator(ScriptedRunner::all_ok()).validate(doc, &[]).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        assert_eq!(result.score(), 0.0);
        assert_eq!(result.failures(), ["no code blocks found"]);
    }

    #[tokio::test]
    async fn test_malformed_header_fails_before_block_checks() {
        let doc = "---\nname: broken\n\n```python\nprint('never checked at all')\n```\n";
        let runner = ScriptedRunner::all_ok();
        let blocks = extract(doc);
        let result = validator(runner.clone()).validate(doc, &blocks).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        assert!(result.failures()[0].starts_with("malformed metadata header"));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_structured_formats_checked_in_process() {
        let doc = "```json\n{\"name\": \"demo\", \"ok\": true}\n```\n\n```yaml\nservices:\n  web: [unclosed\n```\n\n```sql\nSELECT id FROM users WHERE 1 = 1;\n```\n";
        let blocks = extract(doc);
        assert_eq!(blocks.len(), 3);
        let result = validator(ScriptedRunner::all_ok()).validate(doc, &blocks).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        assert_eq!(result.failures().len(), 1);
        assert!(result.failures()[0].contains("invalid YAML"));
        assert!((result.score() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_checker_failure_is_truncated() {
        let doc = "```python\ndef broken(:\n    pass\n```\n";
        let blocks = extract(doc);
        let runner = ScriptedRunner::all_ok().fail_when("def broken", &"SyntaxError L1: invalid syntax ".repeat(20));
        let result = validator(runner).validate(doc, &blocks).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        let note = &result.failures()[0];
        assert!(note.starts_with("[python|official] block #1: SyntaxError L1"));
        assert!(note.len() <= "[python|official] block #1: ".len() + DIAGNOSTIC_LIMIT);
    }

    #[tokio::test]
    async fn test_missing_checker_passes_with_warning() {
        let doc = "```js\nconsole.log('hello from node');\n```\n";
        let blocks = extract(doc);
        let runner = ScriptedRunner::all_ok().missing_interpreter(Language::Javascript);
        let result = validator(runner).validate(doc, &blocks).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(result.score(), 1.0);
        assert!(result.observations()[0].contains("not available"));
    }

    #[tokio::test]
    async fn test_check_timeout_is_warning_not_failure() {
        let doc = "```bash\nwhile true; do sleep 1; done\n```\n";
        let blocks = extract(doc);
        let runner = ScriptedRunner::all_ok().time_out_when("while true");
        let result = validator(runner).validate(doc, &blocks).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(result.score(), 0.0);
        assert!(result.failures().is_empty());
    }
}
