use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::process::{DEFAULT_FLOW_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_QUICK_TIMEOUT};

pub const DEFAULT_PREVIEW_CHARS: usize = 2500;

/// Executables the flow drivers invoke. Plain names are resolved on the
/// augmented search path; values containing a separator are used as given.
#[derive(Debug, Clone)]
pub struct ToolCommands {
    pub yosys: String,
    pub iverilog: String,
    pub vvp: String,
    pub shell: String,
    pub python_candidates: Vec<String>,
    pub gtkwave: String,
    pub klayout: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            yosys: "yosys".to_string(),
            iverilog: "iverilog".to_string(),
            vvp: "vvp".to_string(),
            shell: "sh".to_string(),
            python_candidates: ["python3.12", "python3.11", "python3.10", "python3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            gtkwave: "gtkwave".to_string(),
            klayout: "klayout".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub flow_timeout: Duration,
    pub quick_timeout: Duration,
    pub max_output_bytes: usize,
    pub preview_chars: usize,
    pub tools: ToolCommands,
    pub extra_search_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            flow_timeout: DEFAULT_FLOW_TIMEOUT,
            quick_timeout: DEFAULT_QUICK_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            tools: ToolCommands::default(),
            extra_search_paths: default_search_paths(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.flow_timeout.is_zero() {
            return Err(AppError::Validation(
                "Flow timeout must be greater than zero".to_string(),
            ));
        }
        if self.quick_timeout.is_zero() {
            return Err(AppError::Validation(
                "Quick tool timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(AppError::Validation(
                "Output capture limit must be greater than zero".to_string(),
            ));
        }
        if self.preview_chars == 0 {
            return Err(AppError::Validation(
                "Preview size must be greater than zero".to_string(),
            ));
        }
        if self.tools.python_candidates.is_empty() {
            return Err(AppError::Validation(
                "At least one Python interpreter candidate is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Fallback directories first, then the inherited `PATH`.
    pub fn search_path(&self) -> Vec<PathBuf> {
        let mut dirs = self.extra_search_paths.clone();
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        dirs
    }

    /// `PATH` value handed to flow-tool invocations.
    pub fn augmented_path(&self) -> String {
        let joined = std::env::join_paths(self.search_path())
            .unwrap_or_else(|_| std::env::var_os("PATH").unwrap_or_else(OsString::new));
        joined.to_string_lossy().into_owned()
    }

    pub fn resolve_executable(&self, command: &str) -> Option<PathBuf> {
        if command.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(command);
            return is_executable(&path).then_some(path);
        }
        self.search_path()
            .into_iter()
            .map(|dir| dir.join(command))
            .find(|candidate| is_executable(candidate))
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("eda-mcp-workspaces")
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local").join("bin"));
    }
    paths.push(PathBuf::from("/usr/local/bin"));
    paths.push(PathBuf::from("/opt/homebrew/bin"));
    paths
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
