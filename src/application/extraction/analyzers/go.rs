use std::path::Path;

use crate::application::interfaces::Analyzer;
use crate::domain::{
    DomainError, Entity, EntityBatch, FieldDef, Provenance, SchemaEntity,
};

use super::helpers::{extract_route_path, first_identifier, push_api};

/// Pattern analyzer for Go sources: tagged structs as schemas and
/// gorilla/mux / net/http / echo-style route registrations.
pub struct GoAnalyzer;

impl Analyzer for GoAnalyzer {
    fn language(&self) -> &'static str {
        "go"
    }

    fn patterns(&self) -> &'static [&'static str] {
        &[".go"]
    }

    fn analyze(
        &self,
        path: &Path,
        content: &str,
        repo: &str,
    ) -> Result<EntityBatch, DomainError> {
        let mut batch = EntityBatch::new();
        let source_file = path.to_string_lossy().to_string();
        let lines: Vec<&str> = content.lines().collect();

        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();

            if let Some(rest) = trimmed.strip_prefix("type ") {
                if rest.contains("struct") && rest.contains('{') {
                    if let Some(name) = first_identifier(rest) {
                        let end = struct_end(&lines, i);
                        if let Some(schema) =
                            extract_struct(&name, &lines[i + 1..end], repo, &source_file)
                        {
                            batch.push(Entity::Schema(schema), Provenance::Pattern);
                        }
                        i = end;
                        continue;
                    }
                }
            }

            if let Some((method, route, handler)) = parse_route(trimmed) {
                push_api(&mut batch, &method, &route, &handler, repo, &source_file);
            }

            i += 1;
        }

        Ok(batch)
    }
}

fn struct_end(lines: &[&str], start: usize) -> usize {
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim_start().starts_with('}') {
            return start + 1 + offset;
        }
    }
    lines.len()
}

fn extract_struct(name: &str, body: &[&str], repo: &str, source_file: &str) -> Option<SchemaEntity> {
    let mut fields = Vec::new();

    for line in body {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let field_name = parts.next()?;
        let field_type = match parts.next() {
            Some(t) if !t.starts_with('`') => t,
            // Embedded field or malformed line
            _ => continue,
        };
        if !field_name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            continue;
        }

        let nullable = field_type.starts_with('*');
        let json_name = trimmed
            .find("json:\"")
            .map(|idx| {
                trimmed[idx + 6..]
                    .split(['"', ','])
                    .next()
                    .unwrap_or(field_name)
                    .to_string()
            })
            .unwrap_or_else(|| field_name.to_string());

        if fields.iter().any(|f: &FieldDef| f.name == json_name) {
            continue;
        }
        fields.push(FieldDef {
            name: json_name,
            field_type: field_type.trim_start_matches('*').to_string(),
            constraints: vec![],
            nullable,
            description: String::new(),
        });
    }

    if fields.is_empty() {
        return None;
    }

    Some(SchemaEntity {
        name: name.to_string(),
        repo: repo.to_string(),
        source_file: source_file.to_string(),
        description: String::new(),
        fields,
        relationships: vec![],
    })
}

fn parse_route(line: &str) -> Option<(String, String, String)> {
    // echo/gin style: e.GET("/users/:id", getUser)
    for verb in ["GET", "POST", "PUT", "DELETE", "PATCH"] {
        if line.contains(&format!(".{verb}(")) {
            let route = extract_route_path(line)?;
            let handler = line
                .rfind(',')
                .and_then(|comma| first_identifier(&line[comma + 1..]))
                .unwrap_or_default();
            return Some((verb.to_string(), route, handler));
        }
    }

    // gorilla/mux: r.HandleFunc("/users/{id}", GetUser).Methods("GET")
    if line.contains(".HandleFunc(") || line.contains(".Handle(") {
        let route = extract_route_path(line)?;
        let handler = line
            .find(',')
            .and_then(|comma| first_identifier(&line[comma + 1..]))
            .unwrap_or_default();
        let method = line
            .find(".Methods(")
            .and_then(|idx| {
                let rest = &line[idx + 9..];
                let quote = rest.find('"')? + 1;
                let end = rest[quote..].find('"')?;
                Some(rest[quote..quote + end].to_uppercase())
            })
            .unwrap_or_else(|| "ANY".to_string());
        return Some((method, route, handler));
    }

    None
}
