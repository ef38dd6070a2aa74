pub mod config;
pub mod error;
pub mod flows;
pub mod mcp;
pub mod process;
pub mod reports;
pub mod transport;
pub mod viewer;
pub mod workspace;
