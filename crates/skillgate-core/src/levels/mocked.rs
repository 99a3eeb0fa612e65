//! L4: execution of credential-bearing blocks against inert stand-ins.
//!
//! Environment and secret lookups are rewritten to `'mock_<name>'` literals,
//! then a language prelude makes imports of known external services resolve
//! to call/attribute-tolerant stubs.

use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};

use super::sandbox::ExecutionRun;
use crate::domain::{CodeBlock, Language, Level, LevelResult};
use crate::sandbox::{CodeRunner, ErrorClassifier};

/// Most blocks executed per run.
pub const MAX_MOCKED_BLOCKS: usize = 3;

/// Python modules replaced with stubs by default.
pub const DEFAULT_SERVICE_MODULES: &[&str] = &[
    "stripe",
    "twilio",
    "sendgrid",
    "resend",
    "openai",
    "anthropic",
    "psycopg2",
    "pymongo",
    "redis",
    "boto3",
    "langchain",
    "litellm",
    "crewai",
    "google.cloud",
];

const JS_PRELUDE: &str = r#"const __skillgateModule = require('module');
const __skillgateStub = new Proxy(function () {}, {
  get(_target, prop) {
    if (prop === 'then') return undefined;
    if (prop === Symbol.toPrimitive) return () => 'mock';
    if (prop === Symbol.for('nodejs.util.inspect.custom')) return () => '[mock]';
    return __skillgateStub;
  },
  apply() { return __skillgateStub; },
  construct() { return __skillgateStub; },
});
__skillgateModule.prototype.require = function () { return __skillgateStub; };
"#;

fn python_subscript_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"os\.environ\[\s*['"](\w+)['"]\s*\]"#).expect("static pattern")
    })
}

/// Opening of an `os.getenv(...)` / `os.environ.get(...)` call up to and
/// including the variable name. The rest of the call is matched by hand.
fn python_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"os\.(?:getenv|environ\.get)\(\s*['"](\w+)['"]"#).expect("static pattern")
    })
}

fn js_env_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"process\.env\.(\w+)|process\.env\[\s*['"](\w+)['"]\s*\]"#)
            .expect("static pattern")
    })
}

fn future_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^from\s+__future__\s+import\b").expect("static pattern"))
}

fn mock_name(name: &str) -> String {
    format!("'mock_{}'", name.to_lowercase())
}

fn mock_literal(caps: &Captures<'_>) -> String {
    let name = (1..caps.len())
        .find_map(|i| caps.get(i))
        .map_or("value", |m| m.as_str());
    mock_name(name)
}

/// Byte offset just past the `)` closing a call whose arguments start at
/// `from`. Nested parentheses and string literals are skipped.
fn closing_paren(source: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in source[from..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn rewrite_python_calls(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    while let Some(caps) = python_call_re().captures_at(source, cursor) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        match closing_paren(source, whole.end()) {
            Some(end) => {
                out.push_str(&source[cursor..whole.start()]);
                out.push_str(&mock_name(name.as_str()));
                cursor = end;
            }
            None => {
                out.push_str(&source[cursor..whole.end()]);
                cursor = whole.end();
            }
        }
    }
    out.push_str(&source[cursor..]);
    out
}

/// Replace every credential/environment reference with a mock literal.
pub fn rewrite_env_references(language: Language, source: &str) -> String {
    match language {
        Language::Python => {
            let subscripts = python_subscript_re().replace_all(source, |caps: &Captures<'_>| mock_literal(caps));
            rewrite_python_calls(&subscripts)
        }
        Language::Javascript => js_env_re()
            .replace_all(source, |caps: &Captures<'_>| mock_literal(caps))
            .into_owned(),
        _ => source.to_string(),
    }
}

/// Split top-level `from __future__ import` lines off `source`. They must
/// stay ahead of any prelude.
fn split_future_imports(source: &str) -> (String, String) {
    let mut future = String::new();
    let mut rest = String::with_capacity(source.len());
    for line in source.lines() {
        if future_import_re().is_match(line) {
            future.push_str(line);
            future.push('\n');
        } else {
            rest.push_str(line);
            rest.push('\n');
        }
    }
    (future, rest)
}

/// Stand-ins are `MagicMock`s whose attributes and call results are stand-ins
/// too. Magic methods come back as plain `MagicMock`s so `str()`, `bool()`,
/// iteration and numeric conversion keep their usual defaults.
fn python_prelude(modules: &[String]) -> String {
    let names = modules
        .iter()
        .map(|m| format!("'{m}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "import sys
from unittest.mock import MagicMock
class _SkillgateStub(MagicMock):
    def _get_child_mock(self, **kw):
        name = kw.get('_new_name') or kw.get('name') or ''
        if name.startswith('__') and name.endswith('__'):
            return MagicMock(**kw)
        return _SkillgateStub(**kw)
for _name in [{names}]:
    _parts = _name.split('.')
    for _i in range(1, len(_parts) + 1):
        _full = '.'.join(_parts[:_i])
        if not isinstance(sys.modules.get(_full), _SkillgateStub):
            sys.modules[_full] = _SkillgateStub(name=_full)
        if _i > 1:
            setattr(sys.modules['.'.join(_parts[:_i - 1])], _parts[_i - 1], sys.modules[_full])
"
    )
}

pub struct MockedExecutor {
    runner: Arc<dyn CodeRunner>,
    classifier: ErrorClassifier,
    max_blocks: usize,
    service_modules: Vec<String>,
}

impl MockedExecutor {
    pub fn new(runner: Arc<dyn CodeRunner>, classifier: ErrorClassifier) -> Self {
        Self {
            runner,
            classifier,
            max_blocks: MAX_MOCKED_BLOCKS,
            service_modules: DEFAULT_SERVICE_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub fn with_service_modules(mut self, modules: Vec<String>) -> Self {
        self.service_modules = modules;
        self
    }

    /// The source actually executed for `block`.
    pub fn instrument(&self, block: &CodeBlock) -> String {
        let body = rewrite_env_references(block.language(), block.source_text());
        match block.language() {
            Language::Python => {
                let (future, rest) = split_future_imports(&body);
                format!("{future}{}{rest}", python_prelude(&self.service_modules))
            }
            Language::Javascript => format!("{JS_PRELUDE}{body}"),
            _ => body,
        }
    }

    pub async fn execute(&self, blocks: &[CodeBlock]) -> LevelResult {
        let mut run = ExecutionRun::start(Level::L4, "structure valid with mocks");
        let candidates: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| b.requires_credentials() && b.language().is_mockable())
            .collect();

        if candidates.is_empty() {
            return run.skip(Level::L4, "no credential-bearing blocks to mock");
        }

        for (i, block) in candidates.into_iter().take(self.max_blocks).enumerate() {
            let source = self.instrument(block);
            run.run_block(
                self.runner.as_ref(),
                &self.classifier,
                block,
                &source,
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
    use crate::domain::LevelStatus;
    use crate::extract::extract;
    use crate::fakes::ScriptedRunner;
    use crate::sandbox::{ProcessRunner, RunMode, SandboxConfig};

    #[test]
    fn test_python_env_rewrites() {
        let src = r#"a = os.environ["STRIPE_API_KEY"]
b = os.environ.get('DB_URL', 'sqlite://')
c = os.getenv("OPENAI_API_KEY")
d = os.getenv('REGION', 'us-east-1')"#;
        let out = rewrite_env_references(Language::Python, src);
        assert_eq!(
            out,
            "a = 'mock_stripe_api_key'\nb = 'mock_db_url'\nc = 'mock_openai_api_key'\nd = 'mock_region'"
        );
    }

    #[test]
    fn test_python_call_rewrite_spans_nested_arguments() {
        let src = r#"timeout = int(os.getenv('TIMEOUT', str(30)))
sep = os.environ.get("SEP", ')')
key = os.getenv('KEY', os.getenv('FALLBACK'))"#;
        let out = rewrite_env_references(Language::Python, src);
        assert_eq!(
            out,
            "timeout = int('mock_timeout')\nsep = 'mock_sep'\nkey = 'mock_key'"
        );
    }

    #[test]
    fn test_unterminated_call_left_alone() {
        let src = "value = os.getenv('BROKEN', (1, 2)";
        assert_eq!(rewrite_env_references(Language::Python, src), src);
    }

    #[test]
    fn test_future_imports_precede_prelude() {
        let doc = "```python\nfrom __future__ import annotations\nimport os\nimport stripe\nstripe.api_key = os.getenv('STRIPE_API_KEY')\n```\n";
        let executor =
            MockedExecutor::new(Arc::new(ScriptedRunner::all_ok()), ErrorClassifier::standard());
        let source = executor.instrument(&extract(doc)[0]);
        assert!(source.starts_with("from __future__ import annotations\nimport sys\n"));
        assert_eq!(source.matches("__future__").count(), 1);
        assert!(source.contains("stripe.api_key = 'mock_stripe_api_key'"));
    }

    #[test]
    fn test_js_env_rewrites() {
        let src = "const key = process.env.STRIPE_SECRET_KEY;\nconst url = process.env['DATABASE_URL'];";
        let out = rewrite_env_references(Language::Javascript, src);
        assert_eq!(
            out,
            "const key = 'mock_stripe_secret_key';\nconst url = 'mock_database_url';"
        );
    }

    #[test]
    fn test_prelude_registers_dotted_parents() {
        let prelude = python_prelude(&["google.cloud".to_string()]);
        assert!(prelude.contains("'google.cloud'"));
        assert!(prelude.contains("range(1, len(_parts) + 1)"));
    }

    #[tokio::test]
    async fn test_only_credential_blocks_are_mocked() {
        let doc = "```python\nimport stripe\nstripe.api_key = os.getenv('STRIPE_API_KEY')\n```\n\n```python\nprint('no secrets in here')\n```\n";
        let runner = ScriptedRunner::all_ok();
        let executor = MockedExecutor::new(Arc::new(runner.clone()), ErrorClassifier::standard());
        let result = executor.execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Pass);
        assert_eq!(result.score(), 1.0);

        let runs = runner.runs();
        assert_eq!(runs.len(), 1);
        let (lang, source, mode) = &runs[0];
        assert_eq!(*lang, Language::Python);
        assert_eq!(*mode, RunMode::Execute);
        assert!(source.starts_with("import sys\nfrom unittest.mock import MagicMock"));
        assert!(source.contains("stripe.api_key = 'mock_stripe_api_key'"));
    }

    #[tokio::test]
    async fn test_js_block_gets_require_stub() {
        let doc = "```js\nconst Stripe = require('stripe');\nconst s = new Stripe(process.env.STRIPE_KEY);\n```\n";
        let runner = ScriptedRunner::all_ok();
        let executor = MockedExecutor::new(Arc::new(runner.clone()), ErrorClassifier::standard());
        executor.execute(&extract(doc)).await;

        let (_, source, _) = &runner.runs()[0];
        assert!(source.starts_with(JS_PRELUDE));
        assert!(!source.contains("const require"));
        assert!(source.contains("new Stripe('mock_stripe_key')"));
    }

    #[tokio::test]
    async fn test_no_candidates_skips() {
        let doc = "```bash\nexport TOKEN=abc && echo done\n```\n";
        let executor =
            MockedExecutor::new(Arc::new(ScriptedRunner::all_ok()), ErrorClassifier::standard());
        let result = executor.execute(&extract(doc)).await;
        assert_eq!(result.status(), LevelStatus::Skip);
        assert_eq!(result.score(), 0.9);
    }

    // The tests below run real interpreters and return early when one is absent.

    fn has_interpreter(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    async fn run_for_real(doc: &str) -> LevelResult {
        let executor = MockedExecutor::new(
            Arc::new(ProcessRunner::new(SandboxConfig::default())),
            ErrorClassifier::standard(),
        );
        executor.execute(&extract(doc)).await
    }

    #[tokio::test]
    async fn test_stubbed_stripe_call_prints_cleanly() {
        if !has_interpreter("python3") {
            eprintln!("python3 not found, skipping");
            return;
        }
        let doc = r#"```python
import os
import stripe

stripe.api_key = os.getenv("STRIPE_API_KEY")
session = stripe.checkout.Session.create(
    mode="payment",
    line_items=[{"price": "price_123", "quantity": 1}],
)
print(f"Checkout URL: {session.url}")
print(str(session.id), bool(session), len(session.line_items))
```
"#;
        let result = run_for_real(doc).await;
        assert_eq!(result.status(), LevelStatus::Pass, "{:?}", result.failures());
        assert_eq!(result.score(), 1.0, "{:?}", result.observations());
        assert!(result.failures().is_empty());
        assert!(result
            .observations()
            .iter()
            .any(|o| o.contains("Checkout URL")));
    }

    #[tokio::test]
    async fn test_future_import_and_nested_default_run_cleanly() {
        if !has_interpreter("python3") {
            eprintln!("python3 not found, skipping");
            return;
        }
        let doc = r#"```python
from __future__ import annotations
import os
import openai

TIMEOUT = os.getenv("OPENAI_TIMEOUT", str(30))
client = openai.OpenAI(api_key=os.environ.get("OPENAI_API_KEY", os.getenv("FALLBACK_KEY")))
reply = client.chat.completions.create(model="gpt-4o", messages=[])
print(TIMEOUT, reply.choices[0].message.content)
```
"#;
        let result = run_for_real(doc).await;
        assert_eq!(result.status(), LevelStatus::Pass, "{:?}", result.failures());
        assert_eq!(result.score(), 1.0, "{:?}", result.observations());
        assert!(result
            .observations()
            .iter()
            .any(|o| o.contains("mock_openai_timeout")));
    }

    #[tokio::test]
    async fn test_js_prelude_stubs_require_for_real() {
        if !has_interpreter("node") {
            eprintln!("node not found, skipping");
            return;
        }
        let doc = r#"```javascript
const Stripe = require('stripe');
const stripe = new Stripe(process.env.STRIPE_SECRET_KEY);
async function main() {
  const session = await stripe.checkout.sessions.create({ mode: 'payment' });
  console.log(`session ${session.id}`);
}
main();
```
"#;
        let result = run_for_real(doc).await;
        assert_eq!(result.status(), LevelStatus::Pass, "{:?}", result.failures());
        assert_eq!(result.score(), 1.0, "{:?}", result.observations());
        assert!(result
            .observations()
            .iter()
            .any(|o| o.contains("session mock")));
    }
}
