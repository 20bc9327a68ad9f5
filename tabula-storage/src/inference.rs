// Column type inference for uploaded files

use crate::reader::CsvDocument;
use std::collections::HashSet;
use tabula_core::{CellValue, ColumnType};

/// Narrowest type consistent with every observed value.
///
/// Callers pass the distinct non-null values of one column. Checks run from
/// narrowest to widest and the first one every value satisfies wins; an
/// empty column is `Text`.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a CellValue>,
{
    let values: Vec<&CellValue> = values.into_iter().collect();
    if values.is_empty() {
        return ColumnType::Text;
    }

    let checks: [(fn(&CellValue) -> bool, ColumnType); 4] = [
        (CellValue::is_integer, ColumnType::Integer),
        (CellValue::is_numeric, ColumnType::Decimal),
        (CellValue::is_timestamp, ColumnType::Timestamp),
        (CellValue::is_date, ColumnType::Date),
    ];

    checks
        .iter()
        .find(|(predicate, _)| values.iter().all(|v| predicate(*v)))
        .map(|(_, column_type)| *column_type)
        .unwrap_or(ColumnType::Text)
}

/// Infer `(name, type)` for every column of a parsed document.
pub fn infer_columns(doc: &CsvDocument) -> Vec<(String, ColumnType)> {
    doc.headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let distinct: HashSet<&str> = doc.column(idx).filter(|raw| !raw.is_empty()).collect();
            let parsed: Vec<CellValue> = distinct.into_iter().filter_map(CellValue::parse).collect();
            (name.clone(), infer_column_type(&parsed))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_csv;
    use proptest::prelude::*;

    fn infer(raw: &[&str]) -> ColumnType {
        let parsed: Vec<CellValue> = raw.iter().filter_map(|r| CellValue::parse(r)).collect();
        infer_column_type(&parsed)
    }

    #[test]
    fn test_lattice() {
        assert_eq!(infer(&["1", "2", "3"]), ColumnType::Integer);
        assert_eq!(infer(&["1", "2.5"]), ColumnType::Decimal);
        assert_eq!(infer(&["1", "2.5", "n/a"]), ColumnType::Text);
        assert_eq!(infer(&["2023-01-01 10:00:00", "2023-01-02T11:30"]), ColumnType::Timestamp);
        assert_eq!(infer(&["2023-01-01", "2023/02/01"]), ColumnType::Date);
        assert_eq!(infer(&["hello"]), ColumnType::Text);
    }

    #[test]
    fn test_empty_column_is_text() {
        assert_eq!(infer(&[]), ColumnType::Text);
        assert_eq!(infer(&["", ""]), ColumnType::Text);
    }

    #[test]
    fn test_dates_mixed_with_timestamps_are_text() {
        assert_eq!(infer(&["2023-01-01", "2023-01-01 10:00:00"]), ColumnType::Text);
    }

    #[test]
    fn test_infer_columns_ignores_nulls() {
        let doc = read_csv(b"id,amount,signup_date,notes\n1,10.5,2023-01-01,\n2,20,2023-02-01,\n3,,,x\n").unwrap();
        let columns = infer_columns(&doc);
        assert_eq!(
            columns,
            vec![
                ("id".to_string(), ColumnType::Integer),
                ("amount".to_string(), ColumnType::Decimal),
                ("signup_date".to_string(), ColumnType::Date),
                ("notes".to_string(), ColumnType::Text),
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_integers_stay_integer(values in prop::collection::vec(any::<i64>(), 1..50)) {
            let raw: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
            prop_assert_eq!(infer(&refs), ColumnType::Integer);
        }

        #[test]
        fn prop_one_fraction_promotes_to_decimal(
            values in prop::collection::vec(any::<i32>(), 0..50),
            whole in 0u32..1000,
            frac in 1u32..1000,
        ) {
            let mut raw: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            raw.push(format!("{}.{}", whole, frac));
            let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
            prop_assert_eq!(infer(&refs), ColumnType::Decimal);
        }

        #[test]
        fn prop_one_word_demotes_to_text(
            values in prop::collection::vec(any::<i32>(), 0..50),
            word in "[a-zA-Z]{1,12}",
        ) {
            let mut raw: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            raw.push(word);
            let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
            prop_assert_eq!(infer(&refs), ColumnType::Text);
        }
    }
}
