//! Bundler parsing: `Gemfile` (constraints) and `Gemfile.lock` (pinned).

use std::sync::OnceLock;

use git_pkgs::ManifestKind;
use regex::Regex;

use super::{file_name, ManifestOutput, ManifestParser, ParsedDependency};

static GEM_RE: OnceLock<Regex> = OnceLock::new();
static GROUP_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static VERSION_LIKE_RE: OnceLock<Regex> = OnceLock::new();
static SPEC_RE: OnceLock<Regex> = OnceLock::new();

fn gem_re() -> &'static Regex {
    GEM_RE.get_or_init(|| Regex::new(r#"^\s*gem\s+['"]([A-Za-z0-9._-]+)['"](.*)$"#).unwrap())
}

fn group_re() -> &'static Regex {
    GROUP_RE.get_or_init(|| Regex::new(r"^\s*group\s+(.+?)\s+do\b").unwrap())
}

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r#"['"]([^'"]+)['"]"#).unwrap())
}

fn version_like_re() -> &'static Regex {
    // Operator-prefixed constraint or a bare dotted version. Branch names
    // and URLs in kwargs must not match.
    VERSION_LIKE_RE.get_or_init(|| {
        Regex::new(r"^\s*(?:(?:~>|>=|<=|!=|<|>|=)\s*\d\S*|\d+(?:\.[0-9A-Za-z]+)*)\s*$").unwrap()
    })
}

fn spec_re() -> &'static Regex {
    // Exactly four spaces of indent: the resolved-gem lines of a specs: block.
    SPEC_RE.get_or_init(|| Regex::new(r"^    ([A-Za-z0-9._-]+) \(([^)]+)\)$").unwrap())
}

pub struct RubygemsParser;

impl ManifestParser for RubygemsParser {
    fn ecosystem(&self) -> &'static str {
        "rubygems"
    }

    fn recognize(&self, path: &str) -> bool {
        matches!(file_name(path), "Gemfile" | "Gemfile.lock")
    }

    fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        let text = std::str::from_utf8(bytes).ok()?;
        match file_name(path) {
            "Gemfile" => Some(parse_gemfile(text)),
            "Gemfile.lock" => Some(parse_gemfile_lock(text)),
            _ => None,
        }
    }
}

fn parse_gemfile(text: &str) -> ManifestOutput {
    let mut deps = Vec::new();
    // Stack of group names opened by `group ... do` blocks. Any `do`-less
    // nesting (conditionals) is approximated by tracking `end` lines only
    // against this stack.
    let mut group_stack: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = group_re().captures(line) {
            group_stack.push(group_kind(&caps[1]));
            continue;
        }
        if line.trim() == "end" {
            group_stack.pop();
            continue;
        }

        let Some(caps) = gem_re().captures(line) else { continue };
        let name = caps[1].to_string();
        let rest = &caps[2];

        // Version constraints are the quoted strings that look like
        // requirements; quoted kwarg values (git URLs, branch names) do not.
        let constraints: Vec<&str> = quoted_re()
            .captures_iter(rest)
            .map(|c| c.get(1).unwrap().as_str())
            .filter(|s| version_like_re().is_match(s))
            .collect();
        let requirement =
            if constraints.is_empty() { ">= 0".to_string() } else { constraints.join(", ") };

        let dependency_type = if rest.contains(":development") || rest.contains(":test") {
            inline_group_kind(rest)
        } else if let Some(g) = group_stack.last() {
            g.clone()
        } else {
            "runtime".to_string()
        };

        deps.push(ParsedDependency { name, requirement, dependency_type });
    }

    ManifestOutput { ecosystem: "rubygems", kind: ManifestKind::Manifest, dependencies: deps }
}

fn group_kind(groups: &str) -> String {
    if groups.contains(":development") {
        "development".to_string()
    } else if groups.contains(":test") {
        "test".to_string()
    } else {
        "runtime".to_string()
    }
}

fn inline_group_kind(rest: &str) -> String {
    if rest.contains(":development") { "development".to_string() } else { "test".to_string() }
}

fn parse_gemfile_lock(text: &str) -> ManifestOutput {
    let mut deps = Vec::new();
    let mut in_specs = false;
    let mut in_source_section = false;

    for line in text.lines() {
        if !line.starts_with(' ') {
            // Top-level section header: GEM, GIT, PATH, PLATFORMS, ...
            in_source_section = matches!(line.trim_end(), "GEM" | "GIT" | "PATH");
            in_specs = false;
            continue;
        }
        if line.trim_end() == "  specs:" {
            in_specs = in_source_section;
            continue;
        }
        if !in_specs {
            continue;
        }
        if let Some(caps) = spec_re().captures(line) {
            deps.push(ParsedDependency::new(&caps[1], &caps[2], "runtime"));
        }
    }

    ManifestOutput { ecosystem: "rubygems", kind: ManifestKind::Lockfile, dependencies: deps }
}
