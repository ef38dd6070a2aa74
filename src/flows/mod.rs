//! Flow drivers: prepare a workspace, run the external tools, interpret what
//! they left behind and answer with an envelope.
//!
//! Drivers take an already validated request and always return an envelope
//! value. Parameter problems are caught earlier, when the request is built,
//! and surface as [`AppError::BadRequest`].

pub mod envelope;
pub mod physical;
pub mod report_read;
pub mod simulation;
pub mod synthesis;
pub mod viewers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::process::{ProcessInvocation, ProcessRunner};
use crate::viewer::{SystemLauncher, ViewerLauncher};
use crate::workspace::WorkspaceManager;

pub use physical::{run_physical_flow, PhysicalFlowRequest};
pub use report_read::{read_reports, ReportReadRequest};
pub use simulation::{simulate, SimulationRequest};
pub use synthesis::{synthesize, SynthesisRequest, SynthesisTarget};
pub use viewers::{view_layout, view_waveform, LayoutViewRequest, WaveformViewRequest};

/// Everything a driver needs, shared by all concurrent calls.
#[derive(Clone)]
pub struct FlowContext {
    pub config: Config,
    pub workspaces: Arc<WorkspaceManager>,
    pub runner: ProcessRunner,
    pub launcher: Arc<dyn ViewerLauncher>,
}

impl FlowContext {
    pub fn new(config: Config) -> Self {
        let launcher = Arc::new(SystemLauncher::new(config.clone()));
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: Config, launcher: Arc<dyn ViewerLauncher>) -> Self {
        Self {
            workspaces: Arc::new(WorkspaceManager::new(&config.workspace_root)),
            runner: ProcessRunner::new(config.max_output_bytes),
            launcher,
            config,
        }
    }

    /// Invocation of a flow tool inside `dir` with the augmented `PATH`.
    pub fn invocation(&self, command: &str, timeout: Duration, dir: &Path) -> ProcessInvocation {
        ProcessInvocation::new(command, timeout)
            .current_dir(dir)
            .env("PATH", self.config.augmented_path())
    }

    pub fn preview(&self, text: &str) -> String {
        truncate_preview(text, self.config.preview_chars)
    }

    pub fn tail(&self, text: &str) -> String {
        tail_preview(text, self.config.preview_chars)
    }
}

/// First `limit` characters of `text`, marked when cut.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!(
            "{}\n... (truncated, {} characters total)",
            &text[..cut],
            text.chars().count()
        ),
        None => text.to_string(),
    }
}

/// Last `limit` characters of `text`, marked when cut. Flow logs put the
/// interesting part at the end.
pub fn tail_preview(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    match text.char_indices().nth(total - limit) {
        Some((cut, _)) => format!(
            "... (truncated, {} characters total)\n{}",
            total,
            &text[cut..]
        ),
        None => text.to_string(),
    }
}

/// Name of the lexicographically last directory under `runs_dir`. OpenLane
/// prefixes run directories with a timestamp, which makes this the newest.
pub fn latest_run(runs_dir: &Path) -> Result<Option<String>> {
    let mut latest: Option<String> = None;
    for entry in std::fs::read_dir(runs_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if latest.as_ref().map_or(true, |current| name > *current) {
            latest = Some(name);
        }
    }
    Ok(latest)
}

/// Sorted names of files in `dir` with the given extension. A missing
/// directory lists as empty.
pub fn files_with_extension(dir: &Path, extension: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}

/// Reject names that would be spliced into scripts or file names unless they
/// are plain identifiers.
pub fn validate_identifier(value: &str, param: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Parameter '{}' must be a Verilog identifier, got '{}'",
            param, value
        )))
    }
}

/// Quote a value for a single-quoted POSIX shell context.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Display form of a path relative to `base`, falling back to the full path.
pub fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
