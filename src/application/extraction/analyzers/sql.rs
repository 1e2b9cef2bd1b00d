use std::path::Path;

use crate::application::interfaces::Analyzer;
use crate::domain::{
    DomainError, Entity, EntityBatch, FieldDef, Provenance, SchemaEntity, SchemaRelation,
};

/// Column-level keywords that start table constraints, not columns.
const CONSTRAINT_STARTERS: [&str; 6] = [
    "PRIMARY", "FOREIGN", "CONSTRAINT", "UNIQUE", "KEY", "INDEX",
];

/// Pattern analyzer for SQL DDL: `CREATE TABLE` statements become schemas,
/// `REFERENCES` clauses become schema relationships.
pub struct SqlAnalyzer;

impl Analyzer for SqlAnalyzer {
    fn language(&self) -> &'static str {
        "sql"
    }

    fn patterns(&self) -> &'static [&'static str] {
        &[".sql", ".ddl"]
    }

    fn analyze(
        &self,
        path: &Path,
        content: &str,
        repo: &str,
    ) -> Result<EntityBatch, DomainError> {
        let mut batch = EntityBatch::new();
        let source_file = path.to_string_lossy().to_string();

        // Byte offsets into `upper` index back into `content`, so the
        // uppercase copy must be length-preserving (ASCII only).
        let upper = content.to_ascii_uppercase();
        let mut search_from = 0;
        while let Some(rel_idx) = upper[search_from..].find("CREATE TABLE") {
            let start = search_from + rel_idx;
            let Some(open) = content[start..].find('(') else {
                break;
            };
            let Some(body_len) = matching_paren(&content[start + open..]) else {
                break;
            };

            let header = &content[start + "CREATE TABLE".len()..start + open];
            let table_name = header
                .replace("IF NOT EXISTS", "")
                .replace("if not exists", "")
                .trim()
                .trim_matches(['`', '"', '[', ']'])
                .to_string();

            let body = &content[start + open + 1..start + open + body_len - 1];
            if !table_name.is_empty() {
                if let Some(schema) = parse_table(&table_name, body, repo, &source_file) {
                    batch.push(Entity::Schema(schema), Provenance::Pattern);
                }
            }

            search_from = start + open + body_len;
        }

        Ok(batch)
    }
}

/// Length of the balanced `( ... )` group starting at the first byte.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_table(name: &str, body: &str, repo: &str, source_file: &str) -> Option<SchemaEntity> {
    let mut fields: Vec<FieldDef> = Vec::new();
    let mut relationships = Vec::new();

    for raw in split_columns(body) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let upper = line.to_uppercase();
        let first_word = upper.split_whitespace().next().unwrap_or("");

        if CONSTRAINT_STARTERS.contains(&first_word) {
            // Table-level FOREIGN KEY (...) REFERENCES other(...)
            if let Some(target) = references_target(line) {
                relationships.push(SchemaRelation {
                    target,
                    kind: "belongs_to".to_string(),
                });
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let col_name = parts
            .next()?
            .trim_matches(['`', '"', '[', ']'])
            .to_string();
        // Strip length/precision arguments: `VARCHAR(255)` -> `VARCHAR`
        let col_type = parts
            .next()
            .unwrap_or("unknown")
            .split('(')
            .next()
            .unwrap_or("unknown")
            .to_string();

        let mut constraints = Vec::new();
        let mut nullable = true;
        if upper.contains("PRIMARY KEY") {
            constraints.push("primary_key".to_string());
            nullable = false;
        }
        if upper.contains("NOT NULL") {
            constraints.push("not_null".to_string());
            nullable = false;
        }
        if upper.contains("UNIQUE") {
            constraints.push("unique".to_string());
        }
        if let Some(target) = references_target(line) {
            constraints.push(format!("fk:{target}"));
            relationships.push(SchemaRelation {
                target,
                kind: "belongs_to".to_string(),
            });
        }

        if !fields.iter().any(|f| f.name == col_name) {
            fields.push(FieldDef {
                name: col_name,
                field_type: col_type,
                constraints,
                nullable,
                description: String::new(),
            });
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

/// Split a table body on top-level commas (ignoring commas inside parens,
/// e.g. `DECIMAL(10, 2)`).
fn split_columns(body: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0;

    for c in body.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                columns.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        columns.push(current);
    }
    columns
}

fn references_target(line: &str) -> Option<String> {
    let upper = line.to_ascii_uppercase();
    let idx = upper.find("REFERENCES")?;
    let rest = line[idx + "REFERENCES".len()..].trim_start();
    let target: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn analyze(content: &str) -> EntityBatch {
        SqlAnalyzer
            .analyze(&PathBuf::from("schema.sql"), content, "test-repo")
            .expect("analyze should not fail")
    }

    #[test]
    fn extracts_create_table_with_constraints() {
        let sql = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    balance DECIMAL(10, 2),
    team_id INTEGER REFERENCES teams(id)
);
"#;
        let batch = analyze(sql);
        let Entity::Schema(schema) = &batch.entities[0].0 else {
            panic!("expected schema");
        };
        assert_eq!(schema.name, "users");
        assert_eq!(schema.fields.len(), 4);
        assert!(schema.fields[0].constraints.contains(&"primary_key".to_string()));
        assert!(!schema.fields[1].nullable);
        assert_eq!(schema.fields[2].field_type, "DECIMAL");
        assert_eq!(schema.relationships[0].target, "teams");
    }

    #[test]
    fn extracts_multiple_tables_and_table_level_fks() {
        let sql = r#"
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER,
    FOREIGN KEY (user_id) REFERENCES users(id)
);
CREATE TABLE teams (id INTEGER PRIMARY KEY);
"#;
        let batch = analyze(sql);
        assert_eq!(batch.len(), 2);
        let Entity::Schema(orders) = &batch.entities[0].0 else {
            panic!("expected schema");
        };
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.relationships[0].target, "users");
    }

    #[test]
    fn no_tables_yields_empty_batch() {
        assert!(analyze("SELECT * FROM users;").is_empty());
    }

    #[test]
    fn multibyte_text_before_a_table_does_not_shift_offsets() {
        // "ﬁ" uppercases to two chars; a naive uppercase copy would make
        // byte offsets drift past the ligature.
        let sql = "-- ﬁle header comment\nCREATE TABLE users (\n  id INTEGER PRIMARY KEY\n);\n";
        let batch = analyze(sql);
        assert_eq!(batch.len(), 1);
        let Entity::Schema(schema) = &batch.entities[0].0 else {
            panic!("expected schema");
        };
        assert_eq!(schema.name, "users");
        assert_eq!(schema.fields[0].name, "id");
    }
}
