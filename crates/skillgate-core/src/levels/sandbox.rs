//! L3: isolated execution of blocks that need no credentials.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{CodeBlock, Level, LevelRecorder, LevelResult, LevelStatus};
use crate::sandbox::{truncate_chars, CodeRunner, ErrorClassifier, RunMode};
use crate::score::skip_credit;

/// Most blocks executed per run.
pub const MAX_SANDBOX_BLOCKS: usize = 4;

/// Running counts shared by the sandbox and mocked levels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockTally {
    pub executed: usize,
    pub clean: usize,
    pub hard: usize,
}

impl BlockTally {
    /// PASS when at least half ran clean or nothing hard-failed; FAIL only
    /// when every executed block hard-failed.
    pub fn status(&self) -> LevelStatus {
        if self.clean * 2 >= self.executed || self.hard == 0 {
            LevelStatus::Pass
        } else if self.hard == self.executed {
            LevelStatus::Fail
        } else {
            LevelStatus::Partial
        }
    }

    pub fn score(&self) -> f64 {
        crate::domain::level::ratio(self.clean, self.executed)
    }
}

/// A level in progress that executes blocks and tallies the outcomes.
pub(crate) struct ExecutionRun {
    rec: LevelRecorder,
    tally: BlockTally,
    success_note: &'static str,
}

impl ExecutionRun {
    pub fn start(level: Level, success_note: &'static str) -> Self {
        Self {
            rec: LevelRecorder::start(level),
            tally: BlockTally::default(),
            success_note,
        }
    }

    pub fn observe(&mut self, note: impl Into<String>) {
        self.rec.observe(note);
    }

    /// Execute one (possibly rewritten) block and fold the outcome in.
    pub async fn run_block(
        &mut self,
        runner: &dyn CodeRunner,
        classifier: &ErrorClassifier,
        block: &CodeBlock,
        source: &str,
        label: &str,
    ) {
        self.tally.executed += 1;
        match runner.run(block.language(), source, RunMode::Execute).await {
            Ok(outcome) if outcome.success() => {
                self.tally.clean += 1;
                let out = outcome.stdout.trim();
                if out.is_empty() {
                    self.rec.observe(format!("{label}: {}", self.success_note));
                } else {
                    self.rec.observe(format!(
                        "{label}: {} -> {}",
                        self.success_note,
                        truncate_chars(out, 80)
                    ));
                }
            }
            Ok(outcome) => {
                let diag = outcome.diagnostic().trim();
                let kind = classifier.classify(diag);
                let note = format!("{label}: {}: {}", kind.describe(), truncate_chars(diag, 100));
                if kind.is_hard() {
                    self.tally.hard += 1;
                    self.rec.fail(note);
                } else {
                    self.rec.warn(note);
                }
            }
            Err(e) => self.rec.warn(format!("{label}: {e}")),
        }
    }

    pub fn finish(self) -> LevelResult {
        debug!(tally = ?self.tally, "execution level finished");
        self.rec.finish(self.tally.status(), self.tally.score())
    }

    /// Finish as SKIP with the level's neutral credit.
    pub fn skip(mut self, level: Level, note: &str) -> LevelResult {
        self.rec.observe(note);
        self.rec.finish(LevelStatus::Skip, skip_credit(level))
    }
}

pub struct SandboxExecutor {
    runner: Arc<dyn CodeRunner>,
    classifier: ErrorClassifier,
    max_blocks: usize,
}

impl SandboxExecutor {
    pub fn new(runner: Arc<dyn CodeRunner>, classifier: ErrorClassifier) -> Self {
        Self {
            runner,
            classifier,
            max_blocks: MAX_SANDBOX_BLOCKS,
        }
    }

    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub async fn execute(&self, blocks: &[CodeBlock]) -> LevelResult {
        let mut run = ExecutionRun::start(Level::L3, "runs OK");
        let candidates: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| b.language().is_directly_executable() && !b.requires_credentials())
            .collect();

        if candidates.is_empty() {
            return run.skip(Level::L3, "no credential-free runnable blocks, sandbox skipped");
        }
        if candidates.len() > self.max_blocks {
            run.observe(format!(
                "{} runnable blocks, executing the first {}",
                candidates.len(),
                self.max_blocks
            ));
        }

        for (i, block) in candidates.into_iter().take(self.max_blocks).enumerate() {
            run.run_block(
                self.runner.as_ref(),
                &self.classifier,
                block,
                block.source_text(),
                &block.label(i),
            )
            .await;
        }
        run.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::fakes::ScriptedRunner;

    fn executor(runner: ScriptedRunner) -> SandboxExecutor {
        SandboxExecutor::new(Arc::new(runner), ErrorClassifier::standard())
    }

    #[test]
    fn test_tally_status_rules() {
        let t = |executed, clean, hard| BlockTally { executed, clean, hard }.status();
        assert_eq!(t(4, 2, 2), LevelStatus::Pass);
        assert_eq!(t(4, 0, 0), LevelStatus::Pass);
        assert_eq!(t(3, 1, 2), LevelStatus::Partial);
        assert_eq!(t(2, 0, 2), LevelStatus::Fail);
        assert_eq!(t(3, 0, 1), LevelStatus::Partial);
    }

    #[tokio::test]
    async fn test_credential_blocks_are_not_candidates() {
        let doc = "```python\nimport os\nkey = os.getenv('STRIPE_API_KEY')\n```\n";
        let runner = ScriptedRunner::all_ok();
        let result = executor(runner.clone()).execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Skip);
        assert_eq!(result.score(), skip_credit(Level::L3));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_execution_cap() {
        let doc: String = (0..6)
            .map(|i| format!("```bash\necho \"step number {i}\"\n```\n\n"))
            .collect();
        let runner = ScriptedRunner::all_ok();
        let result = executor(runner.clone()).execute(&extract(&doc)).await;
        assert_eq!(runner.calls(), MAX_SANDBOX_BLOCKS);
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(result.score(), 1.0);
    }

    #[tokio::test]
    async fn test_soft_failures_do_not_fail_level() {
        let doc = "```python\nimport stripe_sdk_missing\nprint('hi')\n```\n\n```js\nconsole.log(undefinedThing.value);\n```\n";
        let runner = ScriptedRunner::all_ok()
            .fail_on_execute("stripe_sdk_missing", "ModuleNotFoundError: No module named 'stripe_sdk_missing'")
            .fail_on_execute("undefinedThing", "ReferenceError: undefinedThing is not defined");
        let result = executor(runner).execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(result.score(), 0.0);
        assert!(result.failures().is_empty());
        assert_eq!(result.observations().len(), 2);
    }

    #[tokio::test]
    async fn test_all_hard_failures_fail_level() {
        let doc = "```python\nprint 'python two style'\n```\n";
        let runner = ScriptedRunner::all_ok()
            .fail_on_execute("python two", "SyntaxError: Missing parentheses in call to 'print'");
        let result = executor(runner).execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Fail);
        assert!(result.failures()[0].contains("syntax error"));
    }

    #[tokio::test]
    async fn test_timeout_is_soft() {
        let doc = "```bash\nwhile true; do sleep 1; done\n```\n";
        let runner = ScriptedRunner::all_ok().time_out_when("while true");
        let result = executor(runner).execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert!(result.observations()[0].contains("timed out"));
    }
}
