//! Query execution for Tabula: engines, the time-budgeted dispatcher and
//! the run registry behind continuation tokens.

pub mod request;
pub mod token;
pub mod engine;
pub mod registry;
pub mod render;
pub mod dispatcher;
pub mod uploads_engine;

pub use request::{QueryParams, QueryRequest};
pub use token::ContinuationToken;
pub use engine::{QueryEngine, QueryResult};
pub use registry::RunRegistry;
pub use render::{OutputFormat, Renderer};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use uploads_engine::{UploadsEngine, UPLOADS_DATA_SOURCE};
