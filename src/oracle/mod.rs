// file: src/oracle/mod.rs
// description: labeling oracle client exports

pub mod client;
pub mod retry;

pub use client::{
    MessagesClient, Oracle, OracleError, OracleRequest, OracleResponse, extract_json_payload,
};
pub use retry::{RetryPolicy, call_with_retry};
