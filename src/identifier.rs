//! Identifier sanitization for table and column names.
//!
//! Raw names arriving from sheet titles, CSV headers, or JSON keys can
//! contain anything: punctuation, SQL keywords, duplicates, or nothing at
//! all. Every name is rewritten into a deterministic, SQL-safe identifier
//! before it reaches statement construction, so the SQL emitter never has to
//! quote or escape.

use std::collections::HashMap;

/// Fallback prefix for table names (`tb0`, `tb1`, ...).
pub const TABLE_PREFIX: &str = "tb";
/// Fallback prefix for column names (`cl0`, `cl1`, ...).
pub const COLUMN_PREFIX: &str = "cl";

/// The SQLite reserved keyword set, lowercased.
///
/// https://www.sqlite.org/lang_keywords.html
const SQLITE_KEYWORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross",
    "current", "current_date", "current_time", "current_timestamp", "database", "default",
    "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each",
    "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain", "fail",
    "filter", "first", "following", "for", "foreign", "from", "full", "generated", "glob",
    "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "unbounded",
    "union", "unique", "update", "using", "vacuum", "values", "view", "virtual", "when",
    "where", "window", "with", "without",
];

fn is_keyword(name: &str) -> bool {
    SQLITE_KEYWORDS.contains(&name)
}

/// Sanitize a list of raw names into unique SQL identifiers.
///
/// The output has the same length and order as the input, every element
/// matches `[a-z_][a-z0-9_]*`, none is a SQLite keyword, and all elements
/// are pairwise distinct. The function is pure: the same input always
/// produces the same output, including the `{prefix}{index}` fallbacks for
/// empty or keyword names.
pub fn sanitize_identifiers(raw: &[String], prefix: &str) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(index, name)| {
            let base = sanitize_one(name, prefix, index);
            // Disambiguate repeats by appending the running occurrence count.
            let count = seen.get(&base).copied().unwrap_or(0);
            if count == 0 {
                seen.insert(base.clone(), 1);
                return base;
            }
            let mut n = count;
            let mut suffixed = format!("{}{}", base, n);
            while seen.contains_key(&suffixed) {
                n += 1;
                suffixed = format!("{}{}", base, n);
            }
            seen.insert(base, n + 1);
            seen.insert(suffixed.clone(), 1);
            suffixed
        })
        .collect()
}

/// Sanitize a single raw name at a given ordinal position.
pub fn sanitize_one(raw: &str, prefix: &str, index: usize) -> String {
    let cleaned = clean(raw);

    if cleaned.is_empty() || is_keyword(&cleaned) {
        return format!("{}{}", prefix, index);
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("{}{}{}", prefix, index, cleaned);
    }
    cleaned
}

/// Strip a raw name down to `[a-z0-9_]`, collapsing whitespace runs into a
/// single underscore.
fn clean(raw: &str) -> String {
    let filtered: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '_')
        .collect();

    let mut out = String::with_capacity(filtered.len());
    let mut in_space = false;
    for c in filtered.trim().chars() {
        if c == ' ' {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_space = false;
        }
    }
    out
}
