use std::collections::HashMap;
use std::path::Path;

use crate::application::interfaces::Analyzer;
use crate::domain::{
    DomainError, DependencyEntity, Entity, EntityBatch, Provenance,
};

/// Pattern analyzer for dependency manifests across ecosystems:
/// `requirements.txt` (pypi), `package.json` (npm), `go.mod` (go), and
/// `Cargo.toml` (crates). Emits one Dependency entity per declaration;
/// the last version seen wins for duplicate `(name, ecosystem)` pairs.
pub struct ManifestAnalyzer;

impl Analyzer for ManifestAnalyzer {
    fn language(&self) -> &'static str {
        "manifest"
    }

    fn patterns(&self) -> &'static [&'static str] {
        &["requirements.txt", "package.json", "go.mod", "cargo.toml"]
    }

    fn analyze(
        &self,
        path: &Path,
        content: &str,
        repo: &str,
    ) -> Result<EntityBatch, DomainError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let deps = match file_name.as_str() {
            "requirements.txt" => parse_requirements(content),
            "package.json" => parse_package_json(content)?,
            "go.mod" => parse_go_mod(content),
            "cargo.toml" => parse_cargo_toml(content),
            _ => vec![],
        };

        // Last-seen version wins within a single manifest.
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        let mut batch = EntityBatch::new();
        for (name, ecosystem, version, dep_kind) in deps {
            let entity = DependencyEntity {
                name: name.clone(),
                ecosystem: ecosystem.clone(),
                version,
                dep_kind,
                repo: repo.to_string(),
            };
            match seen.get(&(name.clone(), ecosystem.clone())) {
                Some(&idx) => batch.entities[idx] = (Entity::Dependency(entity), Provenance::Pattern),
                None => {
                    seen.insert((name, ecosystem), batch.entities.len());
                    batch.push(Entity::Dependency(entity), Provenance::Pattern);
                }
            }
        }

        Ok(batch)
    }
}

type Declared = (String, String, String, String);

fn parse_requirements(content: &str) -> Vec<Declared> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                return None;
            }
            let (name, version) = ["==", ">=", "<=", "~=", ">", "<"]
                .iter()
                .find_map(|op| {
                    line.split_once(op)
                        .map(|(n, v)| (n.trim(), v.trim().to_string()))
                })
                .unwrap_or((line, String::new()));
            // Strip extras: requests[security]
            let name = name.split('[').next().unwrap_or(name).trim();
            if name.is_empty() {
                return None;
            }
            Some((
                name.to_string(),
                "pypi".to_string(),
                version,
                "direct".to_string(),
            ))
        })
        .collect()
}

fn parse_package_json(content: &str) -> Result<Vec<Declared>, DomainError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| DomainError::analyzer(format!("invalid package.json: {e}")))?;

    let mut deps = Vec::new();
    for (section, kind) in [("dependencies", "direct"), ("devDependencies", "dev")] {
        if let Some(map) = value.get(section).and_then(|v| v.as_object()) {
            for (name, version) in map {
                deps.push((
                    name.clone(),
                    "npm".to_string(),
                    version.as_str().unwrap_or_default().to_string(),
                    kind.to_string(),
                ));
            }
        }
    }
    Ok(deps)
}

fn parse_go_mod(content: &str) -> Vec<Declared> {
    let mut deps = Vec::new();
    let mut in_require_block = false;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("require (") {
            in_require_block = true;
            continue;
        }
        if in_require_block && line.starts_with(')') {
            in_require_block = false;
            continue;
        }

        let spec = if in_require_block {
            Some(line)
        } else {
            line.strip_prefix("require ")
        };
        let Some(spec) = spec else { continue };

        let mut parts = spec.split_whitespace();
        let (Some(module), Some(version)) = (parts.next(), parts.next()) else {
            continue;
        };
        let kind = if spec.contains("// indirect") {
            "dev"
        } else {
            "direct"
        };
        deps.push((
            module.to_string(),
            "go".to_string(),
            version.to_string(),
            kind.to_string(),
        ));
    }
    deps
}

fn parse_cargo_toml(content: &str) -> Vec<Declared> {
    let mut deps = Vec::new();
    let mut section = "";

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            section = line.trim_matches(['[', ']']);
            continue;
        }
        let kind = match section {
            "dependencies" => "direct",
            "dev-dependencies" => "dev",
            _ => continue,
        };
        let Some((name, rest)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let rest = rest.trim();
        let version = if rest.starts_with('"') {
            rest.trim_matches('"').to_string()
        } else {
            // Inline table: { version = "1.0", features = [...] }
            rest.find("version")
                .and_then(|idx| {
                    let after = &rest[idx..];
                    let open = after.find('"')? + 1;
                    let close = after[open..].find('"')?;
                    Some(after[open..open + close].to_string())
                })
                .unwrap_or_default()
        };
        deps.push((
            name.to_string(),
            "crates".to_string(),
            version,
            kind.to_string(),
        ));
    }
    deps
}
