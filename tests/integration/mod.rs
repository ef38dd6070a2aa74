//! Integration tests for eda-mcp
//!
//! Each module covers one surface: flow drivers, viewers, report reading and
//! the JSON-RPC protocol over the stdio transport.

pub mod mcp_protocol;
pub mod viewers;
