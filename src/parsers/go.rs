//! Go module parsing: `go.mod`. (`go.sum` is a checksum file and sits on
//! the registry deny list.)

use std::sync::OnceLock;

use git_pkgs::ManifestKind;
use regex::Regex;

use super::{file_name, ManifestOutput, ManifestParser, ParsedDependency};

static REQUIRE_RE: OnceLock<Regex> = OnceLock::new();

fn require_re() -> &'static Regex {
    REQUIRE_RE.get_or_init(|| {
        Regex::new(r"^\s*([^\s]+)\s+(v[^\s]+)\s*(//\s*indirect)?\s*$").unwrap()
    })
}

pub struct GoParser;

impl ManifestParser for GoParser {
    fn ecosystem(&self) -> &'static str {
        "go"
    }

    fn recognize(&self, path: &str) -> bool {
        file_name(path) == "go.mod"
    }

    fn parse(&self, _path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        let text = std::str::from_utf8(bytes).ok()?;
        let mut deps = Vec::new();
        let mut in_require_block = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("require (") {
                in_require_block = true;
                continue;
            }
            if in_require_block {
                if trimmed == ")" {
                    in_require_block = false;
                    continue;
                }
                push_requirement(trimmed, &mut deps);
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("require ") {
                push_requirement(rest, &mut deps);
            }
        }

        Some(ManifestOutput { ecosystem: "go", kind: ManifestKind::Manifest, dependencies: deps })
    }
}

fn push_requirement(line: &str, out: &mut Vec<ParsedDependency>) {
    let Some(caps) = require_re().captures(line) else { return };
    let dep_type = if caps.get(3).is_some() { "indirect" } else { "runtime" };
    out.push(ParsedDependency::new(&caps[1], &caps[2], dep_type));
}
