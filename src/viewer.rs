//! Best-effort GUI viewer launches.
//!
//! Drivers depend on [`ViewerLauncher`] only, so tests can substitute a fake
//! that never opens a display.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    GtkWave,
    KLayout,
}

impl Viewer {
    /// Identifier reported back to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Viewer::GtkWave => "gtkwave",
            Viewer::KLayout => "klayout",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Viewer::GtkWave => "GTKWave",
            Viewer::KLayout => "KLayout",
        }
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    NotAvailable(String),
    Failed(String),
}

impl LaunchOutcome {
    /// Soft status string used where a launch is optional.
    pub fn status(&self) -> String {
        match self {
            LaunchOutcome::Launched => "launched".to_string(),
            LaunchOutcome::NotAvailable(reason) => format!("not available: {}", reason),
            LaunchOutcome::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

pub trait ViewerLauncher: Send + Sync {
    fn locate(&self, viewer: Viewer) -> Option<PathBuf>;

    /// Start the viewer on `file` without waiting for it to exit.
    fn launch(&self, viewer: Viewer, file: &Path) -> LaunchOutcome;
}

/// Launches real viewer binaries found on the augmented search path.
pub struct SystemLauncher {
    config: Config,
}

impl SystemLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn command_for(&self, viewer: Viewer) -> &str {
        match viewer {
            Viewer::GtkWave => &self.config.tools.gtkwave,
            Viewer::KLayout => &self.config.tools.klayout,
        }
    }
}

impl ViewerLauncher for SystemLauncher {
    fn locate(&self, viewer: Viewer) -> Option<PathBuf> {
        self.config.resolve_executable(self.command_for(viewer))
    }

    fn launch(&self, viewer: Viewer, file: &Path) -> LaunchOutcome {
        let Some(binary) = self.locate(viewer) else {
            return LaunchOutcome::NotAvailable(format!(
                "{} executable '{}' not found",
                viewer,
                self.command_for(viewer)
            ));
        };

        let spawned = Command::new(&binary)
            .arg(file)
            .env("PATH", self.config.augmented_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                info!(
                    "Launched {} (PID {:?}) on {}",
                    viewer,
                    child.id(),
                    file.display()
                );
                // Reap the viewer whenever the user closes it
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => debug!("{} exited with {}", viewer, status),
                        Err(e) => warn!("Failed to wait for {}: {}", viewer, e),
                    }
                });
                LaunchOutcome::Launched
            }
            Err(e) => {
                warn!("Failed to launch {}: {}", binary.display(), e);
                LaunchOutcome::Failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallInstructions {
    pub linux: &'static str,
    pub macos: &'static str,
    pub windows: &'static str,
}

pub fn install_instructions(viewer: Viewer) -> InstallInstructions {
    match viewer {
        Viewer::GtkWave => InstallInstructions {
            linux: "sudo apt install gtkwave (Debian/Ubuntu) or sudo dnf install gtkwave (Fedora)",
            macos: "brew install --cask gtkwave",
            windows: "Download a build from https://gtkwave.sourceforge.net and add it to PATH",
        },
        Viewer::KLayout => InstallInstructions {
            linux: "sudo apt install klayout (Debian/Ubuntu) or download a package from https://www.klayout.de/build.html",
            macos: "brew install --cask klayout",
            windows: "Download the installer from https://www.klayout.de/build.html",
        },
    }
}
