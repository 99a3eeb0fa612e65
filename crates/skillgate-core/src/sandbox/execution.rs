//! Time-bounded subprocess execution of code samples.
//!
//! Every run gets a fresh temporary directory as its working directory and
//! `HOME`, a cleared environment carrying only `PATH`, and a hard wall-clock
//! limit after which the child is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::error::{SandboxError, SandboxResult};
use crate::domain::Language;

const PYTHON_AST_CHECK: &str = "import ast, sys
src = open(sys.argv[1], encoding='utf-8').read()
try:
    ast.parse(src)
except SyntaxError as e:
    sys.stderr.write('SyntaxError L%s: %s' % (e.lineno, e.msg))
    sys.exit(1)
";

/// Configuration for sandboxed runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Wall-clock limit for executing a sample (milliseconds).
    pub timeout_ms: u64,
    /// Wall-clock limit for a check-only parse (milliseconds).
    pub check_timeout_ms: u64,
    /// Captured stdout/stderr are cut to this many characters.
    pub output_limit: usize,
    pub python_bin: String,
    pub node_bin: String,
    pub bash_bin: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            check_timeout_ms: 5_000,
            output_limit: 300,
            python_bin: "python3".to_string(),
            node_bin: "node".to_string(),
            bash_bin: "bash".to_string(),
        }
    }
}

/// Whether the runner only parses the sample or actually executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Check,
    Execute,
}

/// Exit status and truncated output of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stderr if present, otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Runs a code sample in some language.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(
        &self,
        language: Language,
        source: &str,
        mode: RunMode,
    ) -> SandboxResult<ExecutionOutcome>;
}

/// [`CodeRunner`] backed by local interpreters.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: SandboxConfig,
}

impl ProcessRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn command_for(
        &self,
        language: Language,
        mode: RunMode,
        file: &Path,
    ) -> SandboxResult<(String, Vec<String>)> {
        let path = file.to_string_lossy().to_string();
        let cmd = match (language, mode) {
            (Language::Python, RunMode::Check) => (
                self.config.python_bin.clone(),
                vec!["-c".to_string(), PYTHON_AST_CHECK.to_string(), path],
            ),
            (Language::Python, RunMode::Execute) => (self.config.python_bin.clone(), vec![path]),
            (Language::Javascript | Language::Typescript, RunMode::Check) => (
                self.config.node_bin.clone(),
                vec!["--check".to_string(), path],
            ),
            (Language::Javascript, RunMode::Execute) => (self.config.node_bin.clone(), vec![path]),
            (Language::Bash, RunMode::Check) => {
                (self.config.bash_bin.clone(), vec!["-n".to_string(), path])
            }
            (Language::Bash, RunMode::Execute) => (self.config.bash_bin.clone(), vec![path]),
            _ => return Err(SandboxError::Unsupported { language }),
        };
        Ok(cmd)
    }
}

fn file_name_for(language: Language) -> &'static str {
    match language {
        Language::Python => "snippet.py",
        Language::Typescript => "snippet.ts",
        Language::Bash => "snippet.sh",
        _ => "snippet.js",
    }
}

#[async_trait]
impl CodeRunner for ProcessRunner {
    async fn run(
        &self,
        language: Language,
        source: &str,
        mode: RunMode,
    ) -> SandboxResult<ExecutionOutcome> {
        let start = Instant::now();
        let workdir = tempfile::tempdir()?;
        let file = workdir.path().join(file_name_for(language));
        let (program, args) = self.command_for(language, mode, &file)?;
        tokio::fs::write(&file, source).await?;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(workdir.path())
            .env_clear()
            .env("HOME", workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::InterpreterMissing {
                program: program.clone(),
            },
            _ => SandboxError::Io(e),
        })?;

        let limit_ms = match mode {
            RunMode::Check => self.config.check_timeout_ms,
            RunMode::Execute => self.config.timeout_ms,
        };
        let output = tokio::time::timeout(Duration::from_millis(limit_ms), child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
                limit_ms,
            })??;

        let limit = self.config.output_limit;
        Ok(ExecutionOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_chars(&String::from_utf8_lossy(&output.stdout), limit),
            stderr: truncate_chars(&String::from_utf8_lossy(&output.stderr), limit),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
