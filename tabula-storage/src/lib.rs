//! Storage layer for Tabula: the storage collaborator traits, an in-process
//! transactional engine, and the CSV ingestion pipeline built on top.

pub mod store;
pub mod memory;
pub mod reader;
pub mod inference;
pub mod ingest;
pub mod uploads;

#[cfg(test)]
mod testing;

pub use store::{complete, StorageConnection, StorageTransaction, TableSnapshot};
pub use memory::InMemoryStore;
pub use reader::{read_csv, CsvDocument};
pub use inference::{infer_column_type, infer_columns};
pub use ingest::{is_csv_content_type, IngestionManager, PreparedIngest};
pub use uploads::{UploadFile, UploadService};
