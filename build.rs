use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED", "CORRECTED", "FIX", "FIXES", "NEW", "CHANGED", "CHANGES", "CHANGE", "MODIFIED",
    "MODIFIES", "MODIFY", "UPDATED", "UPDATES", "UPDATE",
];

/// One source hygiene rule: a line regex plus a filter that decides whether a
/// matching line is a real violation.
struct Rule {
    name: &'static str,
    pattern: String,
    is_violation: fn(&str) -> bool,
    advice: &'static str,
    include_build_script: bool,
}

// Collects every violating line of a single file.
struct ViolationCollector {
    is_violation: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.is_violation)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

/// Underscore-prefixed names in code, ignoring comments and string contents.
fn underscore_in_code(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn stars_outside_doc_comment(line: &str) -> bool {
    !is_doc_comment(line) || FORBIDDEN_WORDS.iter().any(|w| line.contains(w))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else if let Some(idx) = line.find("/*") {
        let rest = &line[idx + 2..];
        Some(rest.find("*/").map_or(rest, |end| &rest[..end]).trim())
    } else {
        None
    }
}

fn all_caps_comment(line: &str) -> bool {
    let Some(text) = comment_text(line) else {
        return false;
    };
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

fn always(line: &str) -> bool {
    !line.is_empty()
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "underscore-prefixed names",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            is_violation: underscore_in_code,
            advice: "Use the binding or remove it; underscore prefixes are not allowed.",
            include_build_script: true,
        },
        Rule {
            name: "forbidden comment words",
            pattern: format!(r"(//|/\*|///).*(?:{})", FORBIDDEN_WORDS.join("|")),
            is_violation: always,
            advice: "Comments describe the code as it is, not its history; remove the comment.",
            include_build_script: false,
        },
        Rule {
            name: "'**' in non-doc comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            is_violation: stars_outside_doc_comment,
            advice: "Emphasis markup is only allowed in doc comments.",
            include_build_script: false,
        },
        Rule {
            name: "all-uppercase comments",
            pattern: r"(//|/\*|///).*".to_string(),
            is_violation: all_caps_comment,
            advice: "Rewrite the comment in normal case or delete it.",
            include_build_script: false,
        },
        Rule {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            is_violation: always,
            advice: "Use the code or remove it.",
            include_build_script: false,
        },
    ]
}

/// Rust sources of this crate, skipping build output and the reference pack.
fn rust_sources() -> Vec<PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_entry(|e| {
            let path = e.path();
            !path.starts_with("./target") && !path.starts_with("./examples")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.path().to_path_buf())
        .collect()
}

fn check_rule(rule: &Rule, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
    let mut searcher = Searcher::new();
    for path in sources {
        if !rule.include_build_script && path.file_name().is_some_and(|n| n == "build.rs") {
            continue;
        }
        if std::fs::read_to_string(path).is_err() {
            continue;
        }
        let mut collector = ViolationCollector {
            is_violation: rule.is_violation,
            violations: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;
        if !collector.violations.is_empty() {
            return Err(format_violations(rule, path, &collector.violations).into());
        }
    }
    Ok(())
}

fn format_violations(rule: &Rule, path: &Path, violations: &[String]) -> String {
    let mut message = format!(
        "\n❌ ERROR: Found {} {} in {}:\n",
        violations.len(),
        rule.name,
        path.display()
    );
    for violation in violations {
        message.push_str(&format!("   {violation}\n"));
    }
    message.push_str(&format!("\n⚠️ {}\n", rule.advice));
    message
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let sources = rust_sources();
    for rule in rules() {
        if let Err(e) = check_rule(&rule, &sources) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
