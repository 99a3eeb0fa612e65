//! Code block extraction and dependency inference.
//!
//! [`extract`] is pure and deterministic: the same document always yields the
//! same blocks in the same order with the same inferred packages.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{CodeBlock, Language, OriginTag};

/// Blocks whose trimmed body is shorter than this are ignored.
pub const MIN_BLOCK_CHARS: usize = 15;

/// Upper bound on packages inferred from a single block.
pub const MAX_PACKAGES_PER_BLOCK: usize = 10;

const COMMUNITY_MARKER: &str = "Source: community";

const PYTHON_STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii", "bisect",
    "builtins", "calendar", "cgi", "cmath", "collections", "concurrent", "configparser",
    "contextlib", "contextvars", "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal",
    "difflib", "dis", "email", "enum", "errno", "fnmatch", "fractions", "ftplib", "functools",
    "gc", "getpass", "gettext", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "imaplib", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword",
    "linecache", "locale", "logging", "lzma", "math", "mimetypes", "multiprocessing", "numbers",
    "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue", "random", "re",
    "sched", "secrets", "select", "shelve", "shlex", "shutil", "signal", "smtplib", "socket",
    "sqlite3", "ssl", "stat", "statistics", "string", "struct", "subprocess", "sys", "tarfile",
    "tempfile", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "traceback", "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "venv",
    "warnings", "wave", "weakref", "webbrowser", "xml", "zipfile", "zlib", "zoneinfo",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "crypto", "dgram",
    "dns", "events", "fs", "http", "http2", "https", "module", "net", "os", "path", "perf_hooks",
    "process", "querystring", "readline", "stream", "string_decoder", "timers", "tls", "tty",
    "url", "util", "v8", "vm", "worker_threads", "zlib",
];

/// Python import names whose distribution name differs.
const PYTHON_DISTRIBUTIONS: &[(&str, &str)] = &[
    ("yaml", "pyyaml"),
    ("PIL", "pillow"),
    ("cv2", "opencv-python"),
    ("sklearn", "scikit-learn"),
    ("bs4", "beautifulsoup4"),
    ("dotenv", "python-dotenv"),
    ("jwt", "pyjwt"),
];

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([^\n`]*)\n((?s:.*?))```").expect("static pattern"))
}

fn python_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:import|from)\s+([A-Za-z_]\w*)").expect("static pattern")
    })
}

fn js_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:require\(\s*['"]([^'"]+)['"]\s*\)|\bfrom\s+['"]([^'"]+)['"]|\bimport\s+['"]([^'"]+)['"])"#,
        )
        .expect("static pattern")
    })
}

fn credential_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"process\.env\.|os\.getenv|os\.environ|API_KEY|SECRET|TOKEN|PASSWORD|\.connect\(")
            .expect("static pattern")
    })
}

/// Language word of a fence info string (`python title="app.py"`, `js {1,3}`).
fn fence_tag(info: &str) -> &str {
    info.trim()
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .unwrap_or("")
}

/// Extract every testable code block from `document`, in document order.
pub fn extract(document: &str) -> Vec<CodeBlock> {
    fence_re()
        .captures_iter(document)
        .filter_map(|caps| {
            let tag = fence_tag(caps.get(1).map_or("", |m| m.as_str()));
            let body = caps.get(2).map_or("", |m| m.as_str());
            if body.trim().chars().count() < MIN_BLOCK_CHARS {
                return None;
            }
            let language = Language::from_fence_tag(tag);
            let packages = infer_packages(language, body);
            let origin = if body.contains(COMMUNITY_MARKER) {
                OriginTag::Community
            } else {
                OriginTag::Official
            };
            Some(CodeBlock::new(
                language,
                body.trim_end(),
                packages,
                requires_credentials(body),
                origin,
            ))
        })
        .collect()
}

/// Whether the body references secrets or environment configuration.
pub fn requires_credentials(body: &str) -> bool {
    credential_re().is_match(body)
}

/// Package-index names a block depends on, capped at [`MAX_PACKAGES_PER_BLOCK`].
pub fn infer_packages(language: Language, body: &str) -> BTreeSet<String> {
    let found: Vec<String> = match language {
        Language::Python => python_packages(body),
        Language::Javascript | Language::Typescript => node_packages(body),
        _ => Vec::new(),
    };

    let mut seen = BTreeSet::new();
    for name in found {
        if seen.len() == MAX_PACKAGES_PER_BLOCK {
            break;
        }
        seen.insert(name);
    }
    seen
}

fn python_packages(body: &str) -> Vec<String> {
    python_import_re()
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|module| !PYTHON_STDLIB.contains(module))
        .map(python_distribution)
        .collect()
}

fn python_distribution(module: &str) -> String {
    PYTHON_DISTRIBUTIONS
        .iter()
        .find(|(import, _)| *import == module)
        .map(|(_, dist)| dist.to_string())
        .unwrap_or_else(|| module.to_lowercase().replace('_', "-"))
}

fn node_packages(body: &str) -> Vec<String> {
    js_import_re()
        .captures_iter(body)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
        })
        .filter_map(node_package_root)
        .collect()
}

/// Reduce an import specifier to the npm package it names, or `None` for
/// relative paths, built-ins, and type-only packages.
fn node_package_root(spec: &str) -> Option<String> {
    if spec.starts_with('.') || spec.starts_with('/') || spec.starts_with("node:") {
        return None;
    }
    if spec.starts_with("@types/") {
        return None;
    }
    let root = if spec.starts_with('@') {
        let mut parts = spec.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        format!("{scope}/{name}")
    } else {
        spec.split('/').next()?.to_string()
    };
    if NODE_BUILTINS.contains(&root.as_str()) {
        return None;
    }
    Some(root)
}
