use tabula_core::{Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A parsed delimited-text document: header plus raw string records.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvDocument {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl CsvDocument {
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Raw values of one column across all records.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .map(move |record| record.get(index).map(String::as_str).unwrap_or(""))
    }
}

pub(crate) fn strip_bom(contents: &[u8]) -> &[u8] {
    contents.strip_prefix(UTF8_BOM).unwrap_or(contents)
}

/// Parse comma-separated text with a header row.
///
/// Every record must have as many fields as the header; anything else is
/// reported as malformed input.
pub fn read_csv(contents: &[u8]) -> Result<CsvDocument> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(strip_bom(contents));

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Err(Error::MalformedInput("missing header row".to_string()));
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(CsvDocument { headers, records })
}

fn malformed(err: csv::Error) -> Error {
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => format!(
            "Row {} has {} fields, expected {}",
            pos.as_ref().map(|p| p.line()).unwrap_or(0),
            len,
            expected_len
        ),
        csv::ErrorKind::Utf8 { pos, .. } => format!(
            "Invalid UTF-8 on line {}",
            pos.as_ref().map(|p| p.line()).unwrap_or(0)
        ),
        _ => err.to_string(),
    };
    Error::MalformedInput(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let doc = read_csv(b"id,amount\n1,10.5\n2,20\n").unwrap();
        assert_eq!(doc.headers, vec!["id", "amount"]);
        assert_eq!(doc.row_count(), 2);
        assert_eq!(doc.column(1).collect::<Vec<_>>(), vec!["10.5", "20"]);
    }

    #[test]
    fn test_quoted_fields() {
        let doc = read_csv(b"name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(doc.records[0], vec!["Smith, J", "said \"hi\""]);
    }

    #[test]
    fn test_bom_is_stripped() {
        let doc = read_csv(b"\xEF\xBB\xBFid\n1\n").unwrap();
        assert_eq!(doc.headers, vec!["id"]);
    }

    #[test]
    fn test_header_only() {
        let doc = read_csv(b"id,name\n").unwrap();
        assert_eq!(doc.row_count(), 0);
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let err = read_csv(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(read_csv(b""), Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        assert!(matches!(read_csv(b"a\n\xff\xfe\n"), Err(Error::MalformedInput(_))));
    }
}
