use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FORBIDDEN_WORDS: &[&str] = &[
    "FIXED", "CORRECTED", "FIX", "FIXES", "NEW", "CHANGED", "CHANGES", "CHANGE", "MODIFIED",
    "MODIFIES", "MODIFY", "UPDATED", "UPDATES", "UPDATE",
];

/// The source-hygiene rules enforced on every Rust file of the crate.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenWord,
    StarsInComment,
    UppercaseComment,
    AllowDeadCode,
}

impl Rule {
    const ALL: [Rule; 5] = [
        Rule::UnderscorePrefix,
        Rule::ForbiddenWord,
        Rule::StarsInComment,
        Rule::UppercaseComment,
        Rule::AllowDeadCode,
    ];

    fn pattern(self) -> String {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenWord => format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            Rule::StarsInComment => r"(//|/\*).*\*\*".to_string(),
            Rule::UppercaseComment => r"(//|/\*).*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed identifiers",
            Rule::ForbiddenWord => "change-log style comments",
            Rule::StarsInComment => "'**' in non-doc comments",
            Rule::UppercaseComment => "comments written entirely in uppercase",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Either use the binding (dropping the underscore) or remove it completely."
            }
            Rule::ForbiddenWord => {
                "Comments must describe the code, not its history. Remove the comment."
            }
            Rule::StarsInComment => "Markdown emphasis belongs in doc comments only.",
            Rule::UppercaseComment => "Rewrite the comment in normal case or delete it.",
            Rule::AllowDeadCode => "Either use the code or remove it completely.",
        }
    }

    /// Decides whether a line the regex matched really breaks the rule.
    fn is_violation(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Rule::UnderscorePrefix => !is_comment(trimmed) && !underscore_only_in_strings(line),
            Rule::ForbiddenWord => comment_text(line)
                .is_some_and(|text| FORBIDDEN_WORDS.iter().any(|w| contains_word(text, w))),
            Rule::StarsInComment => !trimmed.starts_with("///") && !trimmed.starts_with("//!"),
            Rule::UppercaseComment => comment_text(line).is_some_and(|text| {
                let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
                letters.peek().is_some() && letters.all(char::is_uppercase)
            }),
            Rule::AllowDeadCode => true,
        }
    }
}

/// Collects the offending lines of one file for one rule.
struct RuleViolations {
    rule: Rule,
    file_path: PathBuf,
    lines: Vec<String>,
}

impl RuleViolations {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            lines: Vec::new(),
        }
    }

    fn into_error_message(self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.lines.len(),
            self.rule.description(),
            self.file_path.display()
        );
        for line in &self.lines {
            message.push_str(&format!("   {line}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.rule.advice()));
        Some(message)
    }
}

impl Sink for RuleViolations {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.is_violation(line_text) {
            self.lines.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

/// The text of a line comment, or of a block comment opened on this line.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches(['/', '!']).trim());
    }
    let start = line.find("/*")? + 2;
    let rest = &line[start..];
    Some(rest.find("*/").map_or(rest, |end| &rest[..end]).trim())
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// True when every underscore-prefixed token on the line sits inside a string literal.
fn underscore_only_in_strings(line: &str) -> bool {
    if !line.contains('"') {
        return false;
    }
    let outside: String = line
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join(" ");
    !outside
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token.len() > 1 && token.starts_with('_'))
}

/// Rust sources of this crate, skipping build output and the vendored reference tree.
fn crate_sources() -> impl Iterator<Item = PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_entry(|e| {
            let path = e.path();
            !path.starts_with("./target") && !path.starts_with("./examples")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != "build.rs")
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan_sources() -> Result<(), Box<dyn Error>> {
    let mut searcher = Searcher::new();
    let mut failures = Vec::new();

    for rule in Rule::ALL {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
        for path in crate_sources() {
            if std::fs::read_to_string(&path).is_err() {
                continue;
            }
            let mut violations = RuleViolations::new(rule, &path);
            searcher.search_path(&matcher, &path, &mut violations)?;
            if let Some(message) = violations.into_error_message() {
                failures.push(message);
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.concat().into())
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in ["analysis", "src", "tests", "benches"] {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = scan_sources() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
