use crate::domain::{ApiEndpointEntity, Entity, EntityBatch, ParamDef, Provenance};

pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// First identifier in a string, stopping at the first non-identifier char.
pub fn first_identifier(s: &str) -> Option<String> {
    let name: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Split `class Name(Base1, Base2):` into the name and its base list.
pub fn split_class_header(line: &str) -> Option<(String, Vec<String>)> {
    let rest = line.strip_prefix("class ")?;
    let name = first_identifier(rest)?;

    let bases = match rest.find('(') {
        Some(open) => {
            let close = rest.find(')')?;
            rest[open + 1..close]
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect()
        }
        None => vec![],
    };

    Some((name, bases))
}

/// First quoted string starting with `/` in a line — the route path in
/// decorator/handler registrations across all supported frameworks.
pub fn extract_route_path(line: &str) -> Option<String> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '"' || c == '\'' {
            let rest = &line[i + 1..];
            if let Some(end) = rest.find(c) {
                let candidate = &rest[..end];
                if candidate.starts_with('/') {
                    return Some(candidate.to_string());
                }
                i += end + 2;
                continue;
            }
        }
        i += 1;
    }
    None
}

/// Path parameters from route segments: `:id` (Express/mux style) and
/// `{id}` (FastAPI/OpenAPI style).
pub fn path_params(path: &str) -> Vec<ParamDef> {
    path.split('/')
        .filter_map(|segment| {
            let name = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')))?;
            if name.is_empty() {
                return None;
            }
            Some(ParamDef {
                name: name.to_string(),
                param_type: "string".to_string(),
                location: "path".to_string(),
                required: true,
            })
        })
        .collect()
}

pub fn push_api(
    batch: &mut EntityBatch,
    method: &str,
    path: &str,
    handler: &str,
    repo: &str,
    source_file: &str,
) {
    batch.push(
        Entity::Api(ApiEndpointEntity {
            method: method.to_uppercase(),
            path: path.to_string(),
            handler: handler.to_string(),
            repo: repo.to_string(),
            source_file: source_file.to_string(),
            description: String::new(),
            params: path_params(path),
        }),
        Provenance::Pattern,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_path_skips_non_path_strings() {
        let line = r#"app.get("application/json", "/users/:id", handler)"#;
        assert_eq!(extract_route_path(line).as_deref(), Some("/users/:id"));
    }

    #[test]
    fn path_params_handles_both_styles() {
        let params = path_params("/users/:id/orders/{order_id}");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "id");
        assert_eq!(params[1].name, "order_id");
        assert!(params.iter().all(|p| p.location == "path"));
    }

    #[test]
    fn class_header_with_and_without_bases() {
        assert_eq!(
            split_class_header("class User(Base, Mixin):"),
            Some((
                "User".to_string(),
                vec!["Base".to_string(), "Mixin".to_string()]
            ))
        );
        assert_eq!(
            split_class_header("class Plain:"),
            Some(("Plain".to_string(), vec![]))
        );
    }
}
