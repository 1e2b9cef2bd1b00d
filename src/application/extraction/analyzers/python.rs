use std::path::Path;

use crate::application::interfaces::Analyzer;
use crate::domain::{
    DomainError, Entity, EntityBatch, FieldDef, MethodDef, ParamDef, Provenance, SchemaEntity,
    SchemaRelation, ServiceEntity,
};

use super::helpers::{
    extract_route_path, first_identifier, indent_of, is_identifier, push_api, split_class_header,
};

/// ORM base classes that mark a Python class as a data model.
const MODEL_BASES: [&str; 7] = [
    "Base",
    "Model",
    "db.Model",
    "models.Model",
    "DeclarativeBase",
    "SQLModel",
    "BaseModel",
];

/// Class-name suffixes that mark business logic components.
const SERVICE_SUFFIXES: [&str; 4] = ["Service", "Handler", "Manager", "Controller"];

/// Pattern analyzer for Python sources: SQLAlchemy/Django/Pydantic models,
/// service classes, and Flask/FastAPI route decorators.
pub struct PythonAnalyzer;

impl Analyzer for PythonAnalyzer {
    fn language(&self) -> &'static str {
        "python"
    }

    fn patterns(&self) -> &'static [&'static str] {
        &[".py", ".pyi"]
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
            let line = lines[i];
            let trimmed = line.trim_start();

            if trimmed.starts_with("class ") {
                let class_indent = indent_of(line);
                let body_end = class_body_end(&lines, i, class_indent);
                if let Some((name, bases)) = split_class_header(trimmed) {
                    if bases.iter().any(|b| MODEL_BASES.contains(&b.as_str())) {
                        if let Some(schema) =
                            extract_schema(&name, &lines[i + 1..body_end], repo, &source_file)
                        {
                            batch.push(Entity::Schema(schema), Provenance::Pattern);
                        }
                    } else if SERVICE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                        let service =
                            extract_service(&name, &lines[i + 1..body_end], repo, &source_file);
                        batch.push(Entity::Service(service), Provenance::Pattern);
                    }
                }
                i = body_end;
                continue;
            }

            // Route decorators: @app.route("/x", methods=["GET"]) and
            // @router.get("/x") styles. The handler is the next def.
            if trimmed.starts_with('@') && trimmed.contains('(') && trimmed.contains('/') {
                if let Some((method, route)) = parse_route_decorator(trimmed) {
                    let handler = lines[i + 1..]
                        .iter()
                        .take(5)
                        .find_map(|l| {
                            let t = l.trim_start();
                            t.strip_prefix("def ")
                                .or_else(|| t.strip_prefix("async def "))
                                .and_then(first_identifier)
                        })
                        .unwrap_or_default();
                    push_api(&mut batch, &method, &route, &handler, repo, &source_file);
                }
            }

            i += 1;
        }

        Ok(batch)
    }
}

fn class_body_end(lines: &[&str], class_line: usize, class_indent: usize) -> usize {
    let mut end = class_line + 1;
    while end < lines.len() {
        let line = lines[end];
        if !line.trim().is_empty() && indent_of(line) <= class_indent {
            break;
        }
        end += 1;
    }
    end
}

fn extract_schema(name: &str, body: &[&str], repo: &str, source_file: &str) -> Option<SchemaEntity> {
    let mut fields: Vec<FieldDef> = Vec::new();
    let mut relationships = Vec::new();

    for line in body {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.starts_with("def ") || trimmed.starts_with('@') {
            continue;
        }

        if let Some(eq) = trimmed.find('=') {
            let lhs = trimmed[..eq].trim().trim_end_matches(':');
            let lhs_name = lhs.split(':').next().unwrap_or(lhs).trim();
            let rhs = trimmed[eq + 1..].trim();

            if !is_identifier(lhs_name) {
                continue;
            }

            if rhs.starts_with("Column(") || rhs.starts_with("db.Column(") {
                if let Some(field) = parse_column(lhs_name, rhs) {
                    if !fields.iter().any(|f| f.name == field.name) {
                        fields.push(field);
                    }
                }
                continue;
            }

            if rhs.starts_with("relationship(") {
                if let Some(target) = quoted_argument(rhs) {
                    relationships.push(SchemaRelation {
                        target,
                        kind: "relationship".to_string(),
                    });
                }
                continue;
            }
        }

        // Pydantic-style annotated field: `email: str` or `age: int = 0`
        if let Some(colon) = trimmed.find(':') {
            let field_name = trimmed[..colon].trim();
            if !is_identifier(field_name) {
                continue;
            }
            let rest = trimmed[colon + 1..].trim();
            let annotation = rest.split('=').next().unwrap_or(rest).trim();
            if annotation.is_empty() || annotation.ends_with(':') {
                continue;
            }
            let nullable =
                annotation.starts_with("Optional[") || annotation.ends_with("| None");
            if !fields.iter().any(|f| f.name == field_name) {
                fields.push(FieldDef {
                    name: field_name.to_string(),
                    field_type: annotation.to_string(),
                    constraints: vec![],
                    nullable,
                    description: String::new(),
                });
            }
        }
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
        relationships,
    })
}

fn parse_column(name: &str, rhs: &str) -> Option<FieldDef> {
    let open = rhs.find('(')?;
    let args = &rhs[open + 1..];
    let first_arg = args
        .split([',', ')'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches("()");
    let field_type = first_arg
        .split('(')
        .next()
        .unwrap_or("unknown")
        .rsplit('.')
        .next()
        .unwrap_or("unknown");

    let mut constraints = Vec::new();
    let mut nullable = true;
    if args.contains("primary_key=True") {
        constraints.push("primary_key".to_string());
        nullable = false;
    }
    if args.contains("unique=True") {
        constraints.push("unique".to_string());
    }
    if args.contains("nullable=False") {
        constraints.push("not_null".to_string());
        nullable = false;
    }

    Some(FieldDef {
        name: name.to_string(),
        field_type: if field_type.is_empty() {
            "unknown".to_string()
        } else {
            field_type.to_string()
        },
        constraints,
        nullable,
        description: String::new(),
    })
}

fn extract_service(name: &str, body: &[&str], repo: &str, source_file: &str) -> ServiceEntity {
    let mut methods = Vec::new();

    for line in body {
        let trimmed = line.trim_start();
        let Some(sig) = trimmed
            .strip_prefix("def ")
            .or_else(|| trimmed.strip_prefix("async def "))
        else {
            continue;
        };
        let Some(method_name) = first_identifier(sig) else {
            continue;
        };
        if method_name.starts_with('_') {
            continue;
        }

        let params = parse_def_params(sig);
        let returns = sig
            .split("->")
            .nth(1)
            .map(|r| r.trim().trim_end_matches(':').trim().to_string())
            .unwrap_or_default();

        methods.push(MethodDef {
            name: method_name,
            params,
            returns,
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

fn parse_def_params(signature: &str) -> Vec<ParamDef> {
    let Some(open) = signature.find('(') else {
        return vec![];
    };
    let Some(close) = signature[open..].find(')') else {
        return vec![];
    };
    signature[open + 1..open + close]
        .split(',')
        .filter_map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw == "self" || raw == "cls" || raw.starts_with('*') {
                return None;
            }
            let mut parts = raw.splitn(2, ':');
            let name = parts.next()?.trim();
            let annotation = parts
                .next()
                .map(|a| a.split('=').next().unwrap_or(a).trim().to_string())
                .unwrap_or_default();
            if !is_identifier(name) {
                return None;
            }
            Some(ParamDef {
                name: name.to_string(),
                param_type: annotation,
                location: String::new(),
                required: !raw.contains('='),
            })
        })
        .collect()
}

fn parse_route_decorator(line: &str) -> Option<(String, String)> {
    let route = extract_route_path(line)?;

    // FastAPI style: @router.get("/x")
    for verb in ["get", "post", "put", "delete", "patch"] {
        if line.contains(&format!(".{verb}(")) {
            return Some((verb.to_uppercase(), route));
        }
    }

    // Flask style: @app.route("/x", methods=["POST"])
    if line.contains(".route(") {
        let method = line
            .find("methods=")
            .and_then(|idx| extract_route_method(&line[idx..]))
            .unwrap_or_else(|| "GET".to_string());
        return Some((method, route));
    }

    None
}

fn extract_route_method(segment: &str) -> Option<String> {
    let open = segment.find(['[', '('])?;
    let rest = &segment[open + 1..];
    let method: String = rest
        .chars()
        .skip_while(|c| *c == '"' || *c == '\'' || c.is_whitespace())
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if method.is_empty() {
        None
    } else {
        Some(method.to_uppercase())
    }
}

fn quoted_argument(call: &str) -> Option<String> {
    let open = call.find(['"', '\''])?;
    let quote = call.as_bytes()[open] as char;
    let rest = &call[open + 1..];
    let end = rest.find(quote)?;
    let value = &rest[..end];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
