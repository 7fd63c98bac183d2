//! Column-type inference and header-row assessment.

use rusqlite::types::Value;

use crate::provider::Row;

/// SQLite column affinity chosen for an imported column.
///
/// `Text` is the default; a narrower type is only assigned when every
/// sampled non-null value parses as that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Select the inference sample from buffered data rows.
///
/// Rows 5 through 15 of the data portion when that many exist, otherwise
/// whatever is present. Early rows are skipped because they frequently hold
/// preamble or summary values that misrepresent the column.
pub fn sample_window(rows: &[Row]) -> &[Row] {
    if rows.len() > 4 {
        &rows[4..rows.len().min(15)]
    } else {
        rows
    }
}

/// Infer a column type per column from sampled rows.
///
/// Each column starts at `INTEGER` and widens: a value that is numeric but
/// not integral widens to `REAL`; a non-numeric value widens to `TEXT` and
/// inference for that column stops. Nulls and empty strings are ignored, and
/// a column with no non-null samples stays `TEXT`.
pub fn infer_column_types(samples: &[Row], column_count: usize) -> Vec<ColumnType> {
    (0..column_count)
        .map(|col| infer_column(samples.iter().filter_map(|row| row.get(col))))
        .collect()
}

fn infer_column<'a, I: Iterator<Item = &'a Value>>(values: I) -> ColumnType {
    let mut inferred = ColumnType::Integer;
    let mut saw_value = false;

    for value in values {
        let observed = match value {
            Value::Null => continue,
            Value::Integer(_) => ColumnType::Integer,
            Value::Real(_) => ColumnType::Real,
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    continue;
                }
                if s.parse::<i64>().is_ok() {
                    ColumnType::Integer
                } else if s.parse::<f64>().is_ok() {
                    ColumnType::Real
                } else {
                    ColumnType::Text
                }
            }
            // Opaque bytes never narrow.
            Value::Blob(_) => ColumnType::Text,
        };
        saw_value = true;

        inferred = match (inferred, observed) {
            (_, ColumnType::Text) => return ColumnType::Text,
            (ColumnType::Integer, ColumnType::Real) => ColumnType::Real,
            (current, _) => current,
        };
    }

    if saw_value {
        inferred
    } else {
        ColumnType::Text
    }
}

/// Score the first rows of a delimited source and return the index of the
/// best header candidate.
///
/// Wider rows with distinct, fully populated cells score highest; a mild
/// penalty on the row index prefers earlier candidates, and exact ties
/// resolve to the earliest row.
pub fn detect_header_row(rows: &[Vec<String>]) -> usize {
    let mut best_index = 0;
    let mut best_score = f64::MIN;

    for (index, row) in rows.iter().take(10).enumerate() {
        let score = score_header_candidate(index, row, rows.get(index + 1));
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    best_index
}

fn score_header_candidate(index: usize, row: &[String], next: Option<&Vec<String>>) -> f64 {
    let mut score = 0.0;
    let filled = row.iter().filter(|cell| !cell.trim().is_empty()).count();

    if !row.is_empty() && filled == row.len() {
        score += 2.0;
    } else if filled * 2 > row.len() {
        score += 1.0;
    }

    let mut cells: Vec<&str> = row.iter().map(|c| c.trim()).collect();
    cells.sort_unstable();
    cells.dedup();
    if cells.len() == row.len() {
        score += 2.0;
    }

    if let Some(next) = next {
        if next.len() == row.len() {
            score += 1.0;
        }
    }

    score += 0.5 * row.len() as f64;
    score -= 0.1 * index as f64;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Row {
        cells.iter().map(|c| Value::Text(c.to_string())).collect()
    }

    #[test]
    fn test_all_integers() {
        let rows = vec![text_row(&["1", "2"]), text_row(&["30", "40"])];
        assert_eq!(
            infer_column_types(&rows, 2),
            vec![ColumnType::Integer, ColumnType::Integer]
        );
    }

    #[test]
    fn test_decimal_widens_to_real() {
        let rows = vec![text_row(&["1"]), text_row(&["2.5"])];
        assert_eq!(infer_column_types(&rows, 1), vec![ColumnType::Real]);
    }

    #[test]
    fn test_non_numeric_widens_to_text() {
        let rows = vec![text_row(&["1"]), text_row(&["2.5"]), text_row(&["abc"])];
        assert_eq!(infer_column_types(&rows, 1), vec![ColumnType::Text]);
    }

    #[test]
    fn test_nulls_and_blanks_are_ignored() {
        let rows = vec![
            vec![Value::Null],
            text_row(&[""]),
            text_row(&["  "]),
            text_row(&["7"]),
        ];
        assert_eq!(infer_column_types(&rows, 1), vec![ColumnType::Integer]);
    }

    #[test]
    fn test_empty_column_defaults_to_text() {
        let rows = vec![vec![Value::Null], vec![Value::Null]];
        assert_eq!(infer_column_types(&rows, 1), vec![ColumnType::Text]);
    }

    #[test]
    fn test_typed_values() {
        let rows = vec![
            vec![Value::Integer(1), Value::Real(0.5)],
            vec![Value::Integer(2), Value::Integer(3)],
        ];
        assert_eq!(
            infer_column_types(&rows, 2),
            vec![ColumnType::Integer, ColumnType::Real]
        );
    }

    #[test]
    fn test_short_sample_uses_all_rows() {
        let rows = vec![text_row(&["1"]), text_row(&["2"])];
        assert_eq!(sample_window(&rows).len(), 2);
    }

    #[test]
    fn test_long_sample_skips_early_rows() {
        let rows: Vec<Row> = (0..30).map(|i| text_row(&[&i.to_string()])).collect();
        let window = sample_window(&rows);
        assert_eq!(window.len(), 11);
        assert_eq!(window[0], vec![Value::Text("4".to_string())]);
    }

    fn string_rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_header_detection_picks_first_clean_row() {
        let rows = string_rows(&[
            &["name", "age", "city"],
            &["john", "25", "nyc"],
            &["jane", "30", "london"],
        ]);
        assert_eq!(detect_header_row(&rows), 0);
    }

    #[test]
    fn test_header_detection_skips_preamble() {
        let rows = string_rows(&[
            &["Quarterly export"],
            &[""],
            &["name", "age", "city"],
            &["john", "25", "nyc"],
        ]);
        assert_eq!(detect_header_row(&rows), 2);
    }

    #[test]
    fn test_header_detection_empty_input() {
        assert_eq!(detect_header_row(&[]), 0);
    }
}
