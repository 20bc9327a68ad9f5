//! Client-side API for Tabula: wire types shared with the server, the HTTP
//! transport, and the poll loop that drives long-running queries.

pub mod rest;
pub mod transport;
pub mod http;
pub mod poll;
pub mod uploads;

pub use rest::{
    CancelResponse, ColumnInfo, ErrorResponse, HealthResponse, PreviewQuery, RunResponse,
    UploadResponse,
};
pub use transport::Transport;
pub use http::HttpClient;
pub use poll::{PollCorrelator, PollState};
pub use uploads::{FilePayload, USER_HEADER};
