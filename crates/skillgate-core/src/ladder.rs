//! The full L1–L4 ladder over one document version.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::domain::{CodeBlock, LevelResult};
use crate::extract::extract;
use crate::levels::{
    DependencyResolver, LookupCache, MockedExecutor, PackageIndex, SandboxExecutor,
    SyntaxValidator,
};
use crate::obs;
use crate::sandbox::{CodeRunner, ErrorClassifier};
use crate::score::{aggregate, Aggregate};

/// Everything the ladder produced for one document version.
#[derive(Debug, Clone)]
pub struct LadderOutcome {
    pub blocks: Vec<CodeBlock>,
    pub levels: Vec<LevelResult>,
    pub aggregate: Aggregate,
}

pub struct ValidationLadder {
    syntax: SyntaxValidator,
    dependencies: DependencyResolver,
    sandbox: SandboxExecutor,
    mocked: MockedExecutor,
}

impl ValidationLadder {
    pub fn new(
        config: &PipelineConfig,
        runner: Arc<dyn CodeRunner>,
        index: Arc<dyn PackageIndex>,
        cache: Arc<LookupCache>,
        classifier: ErrorClassifier,
    ) -> Self {
        Self {
            syntax: SyntaxValidator::new(runner.clone()),
            dependencies: DependencyResolver::new(
                index,
                cache,
                config.index_spacing(),
                config.index_timeout(),
            ),
            sandbox: SandboxExecutor::new(runner.clone(), classifier.clone())
                .with_max_blocks(config.max_sandbox_blocks),
            mocked: MockedExecutor::new(runner, classifier).with_max_blocks(config.max_mocked_blocks),
        }
    }

    /// Extract blocks from `document` and run every level once, in order.
    pub async fn run(&self, trace_id: &str, document: &str) -> LadderOutcome {
        let blocks = extract(document);

        let levels = vec![
            self.syntax.validate(document, &blocks).await,
            self.dependencies.resolve(&blocks).await,
            self.sandbox.execute(&blocks).await,
            self.mocked.execute(&blocks).await,
        ];
        for level in &levels {
            obs::emit_level_completed(trace_id, level);
        }

        let aggregate = aggregate(&levels);
        LadderOutcome {
            blocks,
            levels,
            aggregate,
        }
    }
}
