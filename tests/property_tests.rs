use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use tabula_core::ColumnType;
use tabula_storage::{InMemoryStore, IngestionManager, StorageConnection, UploadFile, UploadService};

fn csv_of(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn manager() -> IngestionManager {
    IngestionManager::new(Arc::new(InMemoryStore::new()), "uploads")
}

proptest! {
    #[test]
    fn integer_columns_infer_bigint(values in prop::collection::vec(any::<i32>(), 1..40)) {
        let rows: Vec<Vec<String>> = values.iter().map(|v| vec![v.to_string()]).collect();
        let csv = csv_of(&["n"], &rows);
        let prepared = manager().prepare("ints", Some("text/csv"), Bytes::from(csv)).unwrap();
        prop_assert_eq!(prepared.columns[0].1, ColumnType::Integer);
        prop_assert_eq!(prepared.row_count, values.len());
    }

    #[test]
    fn one_word_makes_a_column_text(
        values in prop::collection::vec(-1000.0f64..1000.0, 1..20),
        word in "[a-z]{3,8}",
        at in any::<prop::sample::Index>(),
    ) {
        let mut cells: Vec<String> = values.iter().map(|v| format!("{:.2}", v)).collect();
        let at = at.index(cells.len());
        cells[at] = word;
        let rows: Vec<Vec<String>> = cells.into_iter().map(|c| vec![c]).collect();
        let prepared = manager()
            .prepare("mixed", Some("text/csv"), Bytes::from(csv_of(&["v"], &rows)))
            .unwrap();
        prop_assert_eq!(prepared.columns[0].1, ColumnType::Text);
    }

    #[test]
    fn blanks_do_not_widen(values in prop::collection::vec(prop::option::of(0u16..500), 1..30)) {
        prop_assume!(values.iter().any(Option::is_some));
        let rows: Vec<Vec<String>> = values
            .iter()
            .map(|v| vec![v.map(|n| n.to_string()).unwrap_or_default(), "x".to_string()])
            .collect();
        let prepared = manager()
            .prepare("gaps", Some("text/csv"), Bytes::from(csv_of(&["n", "label"], &rows)))
            .unwrap();
        prop_assert_eq!(prepared.columns[0].1, ColumnType::Integer);
        prop_assert_eq!(prepared.columns[1].1, ColumnType::Text);
    }

    #[test]
    fn loaded_row_count_matches_file(values in prop::collection::vec((any::<i64>(), "[a-z ]{0,12}"), 0..25)) {
        let rows: Vec<Vec<String>> = values
            .iter()
            .map(|(n, s)| vec![n.to_string(), format!("\"{}\"", s)])
            .collect();
        let csv = csv_of(&["id", "note"], &rows);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let loaded = runtime.block_on(async {
            let store = InMemoryStore::new();
            let service = UploadService::new(Arc::new(store.clone()), "uploads");
            service.create("notes", Some(UploadFile::csv(csv)), None).await.unwrap();
            let table = service.ingestion().table_ref("notes").unwrap();
            store.read_table(&table, None).await.unwrap().rows.len()
        });
        prop_assert_eq!(loaded, values.len());
    }
}
