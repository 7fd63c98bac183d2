//! SQL statement construction over sanitized identifiers.
//!
//! Nothing here quotes or escapes identifiers: every name that reaches this
//! module has already passed through [`crate::identifier`], which guarantees
//! keyword-free `[a-z_][a-z0-9_]*` output.

use rusqlite::types::Value;

use crate::inference::ColumnType;

/// Build a `CREATE TABLE` statement for a sanitized table and column set.
pub fn create_table(table: &str, columns: &[String], types: &[ColumnType]) -> String {
    let cols = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = types.get(i).copied().unwrap_or(ColumnType::Text);
            format!("{} {}", name, ty.as_sql())
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", table, cols)
}

/// Build a parameterized `INSERT` statement for the binary-database path.
pub fn insert_placeholders(table: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

/// Build a literal `INSERT` statement for the SQL-script path.
pub fn insert_literals(table: &str, columns: &[String], row: &[Value]) -> String {
    let values = row.iter().map(render_literal).collect::<Vec<_>>().join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        columns.join(", "),
        values
    )
}

/// Render one value as a SQL literal. Strings are single-quoted with
/// embedded quotes doubled; blobs render as `X'hex'`; nulls as bare `NULL`.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                hex.push_str(&format!("{:02x}", b));
            }
            hex.push('\'');
            hex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_create_table() {
        let sql = create_table(
            "tb0",
            &cols(&["name", "age"]),
            &[ColumnType::Text, ColumnType::Integer],
        );
        assert_eq!(sql, "CREATE TABLE tb0 (name TEXT, age INTEGER)");
    }

    #[test]
    fn test_create_table_pads_missing_types_with_text() {
        let sql = create_table("tb0", &cols(&["a", "b"]), &[ColumnType::Integer]);
        assert_eq!(sql, "CREATE TABLE tb0 (a INTEGER, b TEXT)");
    }

    #[test]
    fn test_insert_placeholders() {
        let sql = insert_placeholders("tb0", &cols(&["name", "age", "city"]));
        assert_eq!(sql, "INSERT INTO tb0 (name, age, city) VALUES (?, ?, ?)");
    }

    #[test]
    fn test_insert_literals_quotes_and_doubles() {
        let sql = insert_literals(
            "tb0",
            &cols(&["name", "age"]),
            &[Value::Text("O'Brien".to_string()), Value::Integer(44)],
        );
        assert_eq!(sql, "INSERT INTO tb0 (name, age) VALUES ('O''Brien', 44);");
    }

    #[test]
    fn test_null_renders_bare() {
        assert_eq!(render_literal(&Value::Null), "NULL");
    }

    #[test]
    fn test_blob_renders_as_hex() {
        assert_eq!(render_literal(&Value::Blob(vec![0xde, 0xad])), "X'dead'");
    }
}
