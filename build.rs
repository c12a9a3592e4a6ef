use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources. Nothing else is scanned.
const SOURCE_ROOTS: [&str; 4] = ["score", "cli", "tests", "benches"];

// The source rules the build enforces.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenCommentWord,
    StarsInComment,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b",
            Rule::ForbiddenCommentWord => {
                r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)"
            }
            Rule::StarsInComment => r"(//|/\*).*\*\*",
            Rule::AllCapsComment => r"(//|/\*|///).*",
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely."
            }
            Rule::ForbiddenCommentWord => {
                "Comments narrating edits ('FIXED', 'NEW', 'UPDATED', ...) are STRICTLY FORBIDDEN in this project.\n   Remove them completely rather than commenting them out."
            }
            Rule::StarsInComment => {
                "The '**' pattern is not allowed in regular comments (but is allowed in doc comments)."
            }
            Rule::AllCapsComment => {
                "Comments where all alphabetic characters are uppercase are STRICTLY FORBIDDEN in this project."
            }
            Rule::AllowDeadCode => {
                "#[allow(dead_code)] attributes are STRICTLY FORBIDDEN in this project.\n   Either use the code (removing the attribute) or remove it completely."
            }
        }
    }
}

// Collects every matching line of one file that actually violates the rule.
struct ViolationCollector {
    rule: Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} violation(s) in {}:\n",
            self.violations.len(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.explanation()));
        Some(error_msg)
    }

    fn is_violation(&self, line_text: &str) -> bool {
        let trimmed = line_text.trim_start();
        match self.rule {
            Rule::UnderscorePrefix => !is_comment(trimmed) && !underscore_only_in_strings(line_text),
            Rule::ForbiddenCommentWord | Rule::AllowDeadCode => true,
            // Bold markup is fine in doc comments.
            Rule::StarsInComment => !trimmed.starts_with("///"),
            Rule::AllCapsComment => comment_text(trimmed).is_some_and(|text| {
                let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

// The text of a line that is a comment, without its marker.
fn comment_text(trimmed: &str) -> Option<&str> {
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else {
        let start = trimmed.find("/*")? + 2;
        let body = &trimmed[start..];
        Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
    }
}

// True when every underscore-prefixed word on the line sits inside a string literal.
fn underscore_only_in_strings(line_text: &str) -> bool {
    let parts: Vec<&str> = line_text.split('"').collect();
    let has_prefixed_word = |code: &str| {
        code.split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|word| word.starts_with('_') && word.len() > 1)
    };
    parts.len() > 1
        && parts
            .iter()
            .step_by(2)
            .all(|code| !has_prefixed_word(code))
}

fn source_files() -> impl Iterator<Item = PathBuf> {
    SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(rule: Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
    let mut searcher = Searcher::new();

    for path in source_files() {
        let mut collector = ViolationCollector::new(rule, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let build_timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=SPARSE_PRS_BUILD_TIMESTAMP={build_timestamp}");

    for rule in [
        Rule::UnderscorePrefix,
        Rule::ForbiddenCommentWord,
        Rule::StarsInComment,
        Rule::AllCapsComment,
        Rule::AllowDeadCode,
    ] {
        if let Err(e) = scan(rule) {
            // The error is only visible in cargo's output if printed here.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
