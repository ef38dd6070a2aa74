use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use eda_mcp::{
    config::{Config, ToolCommands, DEFAULT_PREVIEW_CHARS},
    flows::FlowContext,
    mcp::server::McpServer,
    process::DEFAULT_MAX_OUTPUT_BYTES,
    transport::run_stdio,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "eda-mcp")]
#[command(about = "An MCP server driving Yosys, Icarus Verilog, OpenLane, GTKWave and KLayout")]
struct Args {
    /// Directory holding one subdirectory per project
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Timeout for the OpenLane flow in seconds
    #[arg(long, default_value = "600")]
    flow_timeout_secs: u64,

    /// Timeout for quick tools (synthesis, compile, simulation) in seconds
    #[arg(long, default_value = "120")]
    quick_timeout_secs: u64,

    /// Maximum captured bytes per output stream of a tool
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    max_output_bytes: usize,

    /// Maximum characters of log and file previews in responses
    #[arg(long, default_value_t = DEFAULT_PREVIEW_CHARS)]
    preview_chars: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily rotated logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Yosys executable
    #[arg(long, default_value = "yosys")]
    yosys: String,

    /// Icarus Verilog compiler executable
    #[arg(long, default_value = "iverilog")]
    iverilog: String,

    /// Icarus Verilog runtime executable
    #[arg(long, default_value = "vvp")]
    vvp: String,

    /// GTKWave executable
    #[arg(long, default_value = "gtkwave")]
    gtkwave: String,

    /// KLayout executable
    #[arg(long, default_value = "klayout")]
    klayout: String,

    /// Extra directory searched for tools before PATH (repeatable)
    #[arg(long = "extra-path")]
    extra_paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Stdout carries the protocol, so console logs go to stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());

    // Guard must outlive the server so buffered lines get flushed
    let _guard = match &args.log_dir {
        Some(logs_dir) => {
            std::fs::create_dir_all(logs_dir)?;
            let file_appender = tracing_appender::rolling::daily(logs_dir, "eda-mcp.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(console_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_filter(env_filter),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            None
        }
    };

    let defaults = Config::default();
    let mut extra_search_paths = args.extra_paths;
    extra_search_paths.extend(defaults.extra_search_paths);

    let config = Config {
        workspace_root: args.workspace_root.unwrap_or(defaults.workspace_root),
        flow_timeout: Duration::from_secs(args.flow_timeout_secs),
        quick_timeout: Duration::from_secs(args.quick_timeout_secs),
        max_output_bytes: args.max_output_bytes,
        preview_chars: args.preview_chars,
        tools: ToolCommands {
            yosys: args.yosys,
            iverilog: args.iverilog,
            vvp: args.vvp,
            gtkwave: args.gtkwave,
            klayout: args.klayout,
            ..ToolCommands::default()
        },
        extra_search_paths,
    };
    config.validate()?;

    info!("Starting EDA MCP Server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Workspace root: {}", config.workspace_root.display());
    info!(
        "Timeouts: flow {} s, quick tools {} s",
        config.flow_timeout.as_secs(),
        config.quick_timeout.as_secs()
    );

    std::fs::create_dir_all(&config.workspace_root)?;
    let server = Arc::new(McpServer::new(FlowContext::new(config)));
    run_stdio(server).await?;

    info!("EDA MCP Server stopped");
    Ok(())
}
