pub mod types;
pub mod error;
pub mod row;
pub mod schema;
pub mod upload;
pub mod transaction;
pub mod config;

pub use error::{Error, IngestionFailure, Result};
pub use types::{ColumnType, UploadId};
pub use row::CellValue;
pub use schema::{
    AnsiQuoting, ColumnDef, CreateTable, IdentifierQuoting, QuotedIdent, SchemaBuilder, Statement,
    TableRef, TableSchema,
};
pub use upload::{NewUpload, Upload};
pub use transaction::{TransactionId, TransactionStatus};
pub use config::TabulaConfig;
