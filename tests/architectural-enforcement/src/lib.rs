//! Architectural Enforcement Integration Tests
//!
//! This package contains source-scanning tests that enforce workspace rules:
//! - No sleep() calls in production code
//! - No unwrap()/expect() in production code
//!
//! The helpers here locate production sources and strip what is not
//! production code: comments and everything from `#[cfg(test)]` onward.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["colloquy/core/src", "colloquy/cli/src"];

/// Workspace root, found from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file under [`PRODUCTION_DIRS`]
#[must_use]
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// A production line: 1-based line number and the code before any `//`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Code with trailing comment removed
    pub code: String,
}

/// Production lines of a source text
///
/// Stops at the first `#[cfg(test)]`, which by convention opens the test
/// module at the bottom of a file.
#[must_use]
pub fn production_lines(source: &str) -> Vec<CodeLine> {
    source
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line).trim_end();
            if code.trim().is_empty() {
                None
            } else {
                Some(CodeLine {
                    number: idx + 1,
                    code: code.to_string(),
                })
            }
        })
        .collect()
}

/// Scan every production file, collecting `path:line - code` for matching lines
#[must_use]
pub fn find_violations(is_violation: impl Fn(&str) -> bool) -> Vec<String> {
    let mut violations = Vec::new();
    for path in production_sources() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for line in production_lines(&content) {
            if is_violation(&line.code) {
                violations.push(format!(
                    "{}:{} - {}",
                    path.display(),
                    line.number,
                    line.code.trim()
                ));
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_skip_comments_and_tests() {
        let source = "\
fn a() {} // trailing
// whole line
let url = \"https://x\";

#[cfg(test)]
mod tests { fn b() {} }
";
        let lines = production_lines(source);
        assert_eq!(
            lines,
            vec![
                CodeLine {
                    number: 1,
                    code: "fn a() {}".to_string()
                },
                CodeLine {
                    number: 3,
                    code: "let url = \"https:".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_production_sources_found() {
        let sources = production_sources();
        assert!(sources.iter().any(|p| p.ends_with("colloquy/core/src/lib.rs")));
        assert!(sources.iter().any(|p| p.ends_with("colloquy/cli/src/main.rs")));
    }
}
