//! Cargo parsing: `Cargo.toml` (constraints) and `Cargo.lock` (pinned).

use git_pkgs::ManifestKind;
use toml::Value;

use super::{file_name, ManifestOutput, ManifestParser, ParsedDependency};

const DEP_TABLES: &[(&str, &str)] = &[
    ("dependencies", "runtime"),
    ("dev-dependencies", "development"),
    ("build-dependencies", "build"),
];

pub struct CargoParser;

impl ManifestParser for CargoParser {
    fn ecosystem(&self) -> &'static str {
        "cargo"
    }

    fn recognize(&self, path: &str) -> bool {
        matches!(file_name(path), "Cargo.toml" | "Cargo.lock")
    }

    fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        let text = std::str::from_utf8(bytes).ok()?;
        let value: Value = text.parse().ok()?;
        match file_name(path) {
            "Cargo.toml" => Some(parse_cargo_toml(&value)),
            "Cargo.lock" => Some(parse_cargo_lock(&value)),
            _ => None,
        }
    }
}

fn parse_cargo_toml(value: &Value) -> ManifestOutput {
    let mut deps = Vec::new();

    collect_dep_tables(value, &mut deps);

    // Platform-specific tables: [target.'cfg(...)'.dependencies] etc.
    if let Some(targets) = value.get("target").and_then(Value::as_table) {
        for target in targets.values() {
            collect_dep_tables(target, &mut deps);
        }
    }

    ManifestOutput { ecosystem: "cargo", kind: ManifestKind::Manifest, dependencies: deps }
}

fn collect_dep_tables(value: &Value, out: &mut Vec<ParsedDependency>) {
    for (table, dep_type) in DEP_TABLES {
        let Some(map) = value.get(*table).and_then(Value::as_table) else { continue };
        for (key, spec) in map {
            let (name, requirement) = match spec {
                Value::String(req) => (key.clone(), req.clone()),
                Value::Table(t) => {
                    // `foo = { package = "bar", version = "1" }` depends on bar.
                    let name = t
                        .get("package")
                        .and_then(Value::as_str)
                        .unwrap_or(key)
                        .to_string();
                    let req = t
                        .get("version")
                        .and_then(Value::as_str)
                        .unwrap_or("*")
                        .to_string();
                    (name, req)
                }
                _ => continue,
            };
            out.push(ParsedDependency { name, requirement, dependency_type: dep_type.to_string() });
        }
    }
}

fn parse_cargo_lock(value: &Value) -> ManifestOutput {
    let mut deps = Vec::new();
    if let Some(packages) = value.get("package").and_then(Value::as_array) {
        for package in packages {
            let Some(name) = package.get("name").and_then(Value::as_str) else { continue };
            let Some(version) = package.get("version").and_then(Value::as_str) else { continue };
            deps.push(ParsedDependency::new(name, version, "runtime"));
        }
    }
    ManifestOutput { ecosystem: "cargo", kind: ManifestKind::Lockfile, dependencies: deps }
}
