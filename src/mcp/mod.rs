pub mod constants;
pub mod eda_tools;
pub mod server;
pub mod tools;
pub mod types;

// Re-export commonly used constants and helpers
pub use constants::{JsonRpcEnvelopes, MCP_PROTOCOL_VERSION, SERVER_NAME};
