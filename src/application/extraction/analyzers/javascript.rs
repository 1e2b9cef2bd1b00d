use std::path::Path;

use crate::application::interfaces::Analyzer;
use crate::domain::{
    DomainError, Entity, EntityBatch, MethodDef, Provenance, ServiceEntity,
};

use super::helpers::{extract_route_path, first_identifier, push_api};

const ROUTE_VERBS: [&str; 6] = [".get(", ".post(", ".put(", ".delete(", ".patch(", ".all("];

const SERVICE_SUFFIXES: [&str; 4] = ["Service", "Controller", "Manager", "Repository"];

/// Pattern analyzer for JavaScript/TypeScript: Express-style route
/// registrations and service classes.
pub struct JavaScriptAnalyzer;

impl Analyzer for JavaScriptAnalyzer {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn patterns(&self) -> &'static [&'static str] {
        &[".js", ".jsx", ".ts", ".tsx", ".mjs"]
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
            let trimmed = lines[i].trim_start();

            if let Some((method, route, handler)) = parse_route_call(trimmed) {
                push_api(&mut batch, &method, &route, &handler, repo, &source_file);
                i += 1;
                continue;
            }

            if let Some(rest) = trimmed
                .strip_prefix("class ")
                .or_else(|| trimmed.strip_prefix("export class "))
                .or_else(|| trimmed.strip_prefix("export default class "))
            {
                if let Some(name) = first_identifier(rest) {
                    if SERVICE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                        let end = class_body_end(&lines, i);
                        let service =
                            extract_service(&name, &lines[i + 1..end], repo, &source_file);
                        batch.push(Entity::Service(service), Provenance::Pattern);
                        i = end;
                        continue;
                    }
                }
            }

            i += 1;
        }

        Ok(batch)
    }
}

fn parse_route_call(line: &str) -> Option<(String, String, String)> {
    let verb_pos = ROUTE_VERBS
        .iter()
        .find_map(|verb| line.find(verb).map(|pos| (pos, *verb)))?;
    let (pos, verb) = verb_pos;

    // Receiver must look like a router object, not arbitrary chained code.
    let receiver: String = line[..pos]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let receiver: String = receiver.chars().rev().collect();
    let lower = receiver.to_lowercase();
    if !(lower.contains("app") || lower.contains("router") || lower.contains("server") || lower == "r") {
        return None;
    }

    let route = extract_route_path(&line[pos..])?;
    let method = verb.trim_matches(['.', '(']).to_uppercase();
    let method = if method == "ALL" { "ANY".to_string() } else { method };

    // Last bare identifier argument before the closing paren is usually
    // the handler; inline arrows get an empty handler name.
    let handler = line[pos..]
        .rfind(',')
        .and_then(|comma| first_identifier(&line[pos + comma + 1..]))
        .filter(|h| h != "req" && h != "res")
        .unwrap_or_default();

    Some((method, route, handler))
}

fn class_body_end(lines: &[&str], class_line: usize) -> usize {
    let mut depth = 0i32;
    let mut seen_open = false;
    for (offset, line) in lines[class_line..].iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    seen_open = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if seen_open && depth <= 0 {
            return class_line + offset + 1;
        }
    }
    lines.len()
}

fn extract_service(name: &str, body: &[&str], repo: &str, source_file: &str) -> ServiceEntity {
    let mut methods = Vec::new();

    for line in body {
        let trimmed = line.trim_start();
        let candidate = trimmed
            .strip_prefix("async ")
            .unwrap_or(trimmed);

        // Method shorthand: `name(args) {` at class-body level.
        let Some(method_name) = first_identifier(candidate) else {
            continue;
        };
        let after_name = &candidate[method_name.len()..];
        if !after_name.trim_start().starts_with('(') || !trimmed.contains('{') {
            continue;
        }
        if method_name == "constructor"
            || method_name == "if"
            || method_name == "for"
            || method_name == "while"
            || method_name == "switch"
            || method_name == "catch"
            || method_name.starts_with('_')
        {
            continue;
        }

        methods.push(MethodDef {
            name: method_name,
            params: vec![],
            returns: String::new(),
            description: String::new(),
        });
    }

    ServiceEntity {
        name: name.to_string(),
        repo: repo.to_string(),
        source_file: source_file.to_string(),
        description: String::new(),
        methods,
        dependencies: vec![],
    }
}
