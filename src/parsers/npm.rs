//! npm parsing: `package.json` (constraints) and `package-lock.json`
//! (pinned; lockfile v1 through v3 layouts).

use git_pkgs::ManifestKind;
use serde_json::Value;

use super::{file_name, ManifestOutput, ManifestParser, ParsedDependency};

const DEP_SECTIONS: &[(&str, &str)] = &[
    ("dependencies", "runtime"),
    ("devDependencies", "development"),
    ("optionalDependencies", "optional"),
    ("peerDependencies", "peer"),
];

pub struct NpmParser;

impl ManifestParser for NpmParser {
    fn ecosystem(&self) -> &'static str {
        "npm"
    }

    fn recognize(&self, path: &str) -> bool {
        matches!(file_name(path), "package.json" | "package-lock.json")
    }

    fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let root = value.as_object()?;
        match file_name(path) {
            "package.json" => Some(parse_package_json(root)),
            "package-lock.json" => Some(parse_package_lock(root)),
            _ => None,
        }
    }
}

fn parse_package_json(root: &serde_json::Map<String, Value>) -> ManifestOutput {
    let mut deps = Vec::new();
    for (section, dep_type) in DEP_SECTIONS {
        let Some(map) = root.get(*section).and_then(Value::as_object) else { continue };
        for (name, req) in map {
            if let Some(req) = req.as_str() {
                deps.push(ParsedDependency::new(name, req, dep_type));
            }
        }
    }
    ManifestOutput { ecosystem: "npm", kind: ManifestKind::Manifest, dependencies: deps }
}

fn parse_package_lock(root: &serde_json::Map<String, Value>) -> ManifestOutput {
    let mut deps = Vec::new();

    if let Some(packages) = root.get("packages").and_then(Value::as_object) {
        // Lockfile v2/v3: keys are install paths, "" being the root package.
        for (path, entry) in packages {
            let Some(name) = path.rsplit_once("node_modules/").map(|(_, n)| n) else { continue };
            let Some(version) = entry.get("version").and_then(Value::as_str) else { continue };
            let dep_type = if entry.get("dev").and_then(Value::as_bool).unwrap_or(false) {
                "development"
            } else {
                "runtime"
            };
            deps.push(ParsedDependency::new(name, version, dep_type));
        }
    } else if let Some(map) = root.get("dependencies").and_then(Value::as_object) {
        // Lockfile v1: nested tree.
        collect_v1(map, &mut deps);
    }

    ManifestOutput { ecosystem: "npm", kind: ManifestKind::Lockfile, dependencies: deps }
}

fn collect_v1(map: &serde_json::Map<String, Value>, out: &mut Vec<ParsedDependency>) {
    for (name, entry) in map {
        if let Some(version) = entry.get("version").and_then(Value::as_str) {
            let dep_type = if entry.get("dev").and_then(Value::as_bool).unwrap_or(false) {
                "development"
            } else {
                "runtime"
            };
            out.push(ParsedDependency::new(name, version, dep_type));
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            collect_v1(nested, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_json_sections() {
        let json = br#"{
            "name": "app",
            "dependencies": { "express": "^4.18.0" },
            "devDependencies": { "jest": "^29.0.0" },
            "peerDependencies": { "react": ">=17" }
        }"#;
        let out = NpmParser.parse("package.json", json).unwrap();
        assert_eq!(out.kind, ManifestKind::Manifest);
        let by_name: std::collections::HashMap<_, _> = out
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), (d.requirement.as_str(), d.dependency_type.as_str())))
            .collect();
        assert_eq!(by_name["express"], ("^4.18.0", "runtime"));
        assert_eq!(by_name["jest"], ("^29.0.0", "development"));
        assert_eq!(by_name["react"], (">=17", "peer"));
    }

    #[test]
    fn test_package_json_no_sections() {
        let out = NpmParser.parse("package.json", br#"{"name": "app"}"#).unwrap();
        assert!(out.dependencies.is_empty());
    }

    #[test]
    fn test_lock_v3_packages() {
        let json = br#"{
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "app" },
                "node_modules/express": { "version": "4.18.2" },
                "node_modules/express/node_modules/debug": { "version": "2.6.9" },
                "node_modules/jest": { "version": "29.5.0", "dev": true }
            }
        }"#;
        let out = NpmParser.parse("package-lock.json", json).unwrap();
        assert_eq!(out.kind, ManifestKind::Lockfile);
        let by_name: std::collections::HashMap<_, _> = out
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), (d.requirement.as_str(), d.dependency_type.as_str())))
            .collect();
        assert_eq!(by_name["express"], ("4.18.2", "runtime"));
        assert_eq!(by_name["debug"], ("2.6.9", "runtime"));
        assert_eq!(by_name["jest"], ("29.5.0", "development"));
    }

    #[test]
    fn test_lock_v1_nested_dependencies() {
        let json = br#"{
            "lockfileVersion": 1,
            "dependencies": {
                "express": {
                    "version": "4.18.2",
                    "dependencies": { "debug": { "version": "2.6.9" } }
                }
            }
        }"#;
        let out = NpmParser.parse("package-lock.json", json).unwrap();
        let names: Vec<_> = out.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["express", "debug"]);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(NpmParser.parse("package.json", b"{not json").is_none());
        assert!(NpmParser.parse("package.json", b"[1, 2, 3]").is_none());
    }
}
