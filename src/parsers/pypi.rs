//! pip requirements parsing: `requirements*.txt` files.

use std::sync::OnceLock;

use git_pkgs::ManifestKind;
use regex::Regex;

use super::{file_name, ManifestOutput, ManifestParser, ParsedDependency};

static REQ_LINE_RE: OnceLock<Regex> = OnceLock::new();

fn req_line_re() -> &'static Regex {
    REQ_LINE_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)(\[[^\]]*\])?\s*(.*)$").unwrap()
    })
}

pub struct PypiParser;

impl ManifestParser for PypiParser {
    fn ecosystem(&self) -> &'static str {
        "pypi"
    }

    fn recognize(&self, path: &str) -> bool {
        let base = file_name(path);
        base.starts_with("requirements") && base.ends_with(".txt")
    }

    fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        let text = std::str::from_utf8(bytes).ok()?;
        let base = file_name(path);
        let dep_type = if base.contains("dev") || base.contains("test") {
            "development"
        } else {
            "runtime"
        };

        let mut deps = Vec::new();
        for line in text.lines() {
            // Continuation backslashes and inline comments first.
            let line = line.trim_end_matches('\\').trim();
            let line = line.split(" #").next().unwrap_or(line).trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }
            // URL and local-path requirements carry no registry name.
            if line.contains("://") || line.starts_with('.') || line.starts_with('/') {
                continue;
            }
            // Environment markers are not part of the requirement.
            let line = line.split(';').next().unwrap_or(line).trim();

            let Some(caps) = req_line_re().captures(line) else { continue };
            let name = caps[1].to_string();
            let spec = caps[3].trim();
            let requirement = if spec.is_empty() { "*".to_string() } else { spec.to_string() };
            deps.push(ParsedDependency { name, requirement, dependency_type: dep_type.to_string() });
        }

        Some(ManifestOutput { ecosystem: "pypi", kind: ManifestKind::Manifest, dependencies: deps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_variants() {
        assert!(PypiParser.recognize("requirements.txt"));
        assert!(PypiParser.recognize("requirements-dev.txt"));
        assert!(PypiParser.recognize("api/requirements.txt"));
        assert!(!PypiParser.recognize("requirements.in"));
        assert!(!PypiParser.recognize("setup.py"));
    }

    #[test]
    fn test_basic_pins_and_ranges() {
        let reqs = b"django==4.2.1\nrequests>=2.28,<3\nclick\n";
        let out = PypiParser.parse("requirements.txt", reqs).unwrap();
        assert_eq!(out.kind, ManifestKind::Manifest);
        assert_eq!(
            out.dependencies,
            vec![
                ParsedDependency::new("django", "==4.2.1", "runtime"),
                ParsedDependency::new("requests", ">=2.28,<3", "runtime"),
                ParsedDependency::new("click", "*", "runtime"),
            ]
        );
    }

    #[test]
    fn test_comments_options_and_urls_skipped() {
        let reqs = b"# pinned for prod\n-r base.txt\n--no-binary :all:\ngit+https://github.com/x/y\n./local-pkg\nflask==2.3  # web\n";
        let out = PypiParser.parse("requirements.txt", reqs).unwrap();
        assert_eq!(out.dependencies, vec![ParsedDependency::new("flask", "==2.3", "runtime")]);
    }

    #[test]
    fn test_extras_and_markers() {
        let reqs = b"uvicorn[standard]==0.23.0\nimportlib-metadata>=4; python_version < \"3.10\"\n";
        let out = PypiParser.parse("requirements.txt", reqs).unwrap();
        assert_eq!(out.dependencies[0].name, "uvicorn");
        assert_eq!(out.dependencies[0].requirement, "==0.23.0");
        assert_eq!(out.dependencies[1].name, "importlib-metadata");
        assert_eq!(out.dependencies[1].requirement, ">=4");
    }

    #[test]
    fn test_dev_file_marks_development() {
        let out = PypiParser.parse("requirements-dev.txt", b"pytest==7.4\n").unwrap();
        assert_eq!(out.dependencies[0].dependency_type, "development");
    }
}
