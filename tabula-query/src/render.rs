// Result rendering

use crate::engine::QueryResult;
use tabula_core::{CellValue, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned plain-text table.
    #[default]
    Table,
    Csv,
}

impl OutputFormat {
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name.map(|n| n.to_ascii_lowercase()).as_deref() {
            None | Some("table") | Some("text") => Ok(OutputFormat::Table),
            Some("csv") => Ok(OutputFormat::Csv),
            Some(other) => Err(Error::MalformedInput(format!("unknown output format \"{}\"", other))),
        }
    }
}

/// Turns a finished result into the text payload sent to clients.
#[derive(Debug, Clone)]
pub struct Renderer {
    pub row_limit: usize,
}

impl Renderer {
    pub fn new(row_limit: usize) -> Self {
        Self { row_limit }
    }

    pub fn render(&self, result: &QueryResult, format: OutputFormat) -> Result<String> {
        let shown = result.rows.len().min(self.row_limit);
        let mut out = match format {
            OutputFormat::Table => render_table(&result.columns, &result.rows[..shown]),
            OutputFormat::Csv => render_csv(&result.columns, &result.rows[..shown])?,
        };
        if shown < result.rows.len() {
            out.push_str(&format!(
                "(truncated: showing first {} of {} rows)\n",
                shown,
                result.rows.len()
            ));
        }
        Ok(out)
    }
}

fn cell_text(value: &Option<CellValue>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn render_table(columns: &[String], rows: &[Vec<Option<CellValue>>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |values: &[String]| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(widths.iter())
            .map(|(value, width)| format!("{:<width$}", value, width = *width))
            .collect();
        padded.join(" | ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&match rows.len() {
        1 => "(1 row)\n".to_string(),
        n => format!("({} rows)\n", n),
    });
    out
}

fn render_csv(columns: &[String], rows: &[Vec<Option<CellValue>>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(columns)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row.iter().map(cell_text))
            .map_err(|e| Error::Serialization(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![Some(CellValue::Integer(1)), Some(CellValue::Text("Smith, J".to_string()))],
                vec![Some(CellValue::Integer(20)), None],
            ],
        }
    }

    #[test]
    fn test_table() {
        let out = Renderer::new(100).render(&sample(), OutputFormat::Table).unwrap();
        assert_eq!(
            out,
            "id | name\n---+---------\n1  | Smith, J\n20 |\n(2 rows)\n"
        );
    }

    #[test]
    fn test_csv_quotes_fields() {
        let out = Renderer::new(100).render(&sample(), OutputFormat::Csv).unwrap();
        assert_eq!(out, "id,name\n1,\"Smith, J\"\n20,\n");
    }

    #[test]
    fn test_truncation_note() {
        let out = Renderer::new(1).render(&sample(), OutputFormat::Csv).unwrap();
        assert_eq!(out, "id,name\n1,\"Smith, J\"\n(truncated: showing first 1 of 2 rows)\n");
    }

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::parse(None).unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::parse(Some("CSV")).unwrap(), OutputFormat::Csv);
        assert!(OutputFormat::parse(Some("xlsx")).is_err());
    }

    proptest::proptest! {
        #[test]
        fn table_has_one_line_per_row(n in 0usize..50, limit in 1usize..60) {
            let result = QueryResult {
                columns: vec!["n".to_string()],
                rows: (0..n).map(|i| vec![Some(CellValue::Integer(i as i64))]).collect(),
            };
            let out = Renderer::new(limit).render(&result, OutputFormat::Table).unwrap();
            let shown = n.min(limit);
            let truncated = usize::from(shown < n);
            proptest::prop_assert_eq!(out.lines().count(), shown + 3 + truncated);
        }
    }
}
