//! OpenLane physical-design flow.
//!
//! The flow runs through a generated wrapper script so it never waits on a
//! terminal: the environment is forced non-interactive and stdin is closed.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{envelope, latest_run, shell_quote, validate_identifier, FlowContext};
use crate::error::{AppError, Result};
use crate::process::ProcessError;
use crate::viewer::Viewer;
use crate::workspace::WorkspaceKind;

const CONFIG_FILE: &str = "config.json";
const WRAPPER_FILE: &str = "run_flow.sh";
const NO_LAYOUT_STATUS: &str = "skipped: no layout generated";

#[derive(Debug, Clone)]
pub struct PhysicalFlowRequest {
    pub verilog_code: String,
    pub design_name: String,
    pub clock_port: String,
    pub clock_period: f64,
    pub open_in_klayout: bool,
}

impl PhysicalFlowRequest {
    pub fn new(
        verilog_code: String,
        design_name: String,
        clock_port: Option<String>,
        clock_period: Option<f64>,
        open_in_klayout: Option<bool>,
    ) -> Result<Self> {
        validate_identifier(&design_name, "design_name")?;
        let clock_port = clock_port.unwrap_or_else(|| "clk".to_string());
        validate_identifier(&clock_port, "clock_port")?;
        let clock_period = clock_period.unwrap_or(10.0);
        if !clock_period.is_finite() || clock_period <= 0.0 {
            return Err(AppError::BadRequest(format!(
                "Parameter 'clock_period' must be a positive number of nanoseconds, got {}",
                clock_period
            )));
        }
        Ok(Self {
            verilog_code,
            design_name,
            clock_port,
            clock_period,
            open_in_klayout: open_in_klayout.unwrap_or(false),
        })
    }

    fn source_file(&self) -> String {
        format!("{}.v", self.design_name)
    }

    /// OpenLane configuration. The overrides keep the flow running to the
    /// end so every report gets written even for a failing design.
    pub fn flow_config(&self) -> Value {
        json!({
            "DESIGN_NAME": self.design_name,
            "VERILOG_FILES": [format!("dir::{}", self.source_file())],
            "CLOCK_PORT": self.clock_port,
            "CLOCK_PERIOD": self.clock_period,
            "QUIT_ON_TIMING_VIOLATIONS": false,
            "QUIT_ON_MAGIC_DRC": false,
            "QUIT_ON_LVS_ERROR": false,
            "QUIT_ON_SLEW_VIOLATIONS": false,
            "QUIT_ON_ILLEGAL_OVERLAPS": false,
            "RUN_KLAYOUT_XOR": false,
            "RUN_KLAYOUT_DRC": false,
            "FP_CORE_UTIL": 40,
            "PL_TARGET_DENSITY_PCT": 50,
        })
    }
}

pub fn wrapper_script(python: &Path) -> String {
    format!(
        "#!/bin/sh\n\
         export TERM=dumb\n\
         export CI=1\n\
         export PYTHONUNBUFFERED=1\n\
         export DEBIAN_FRONTEND=noninteractive\n\
         exec {} -m openlane {} </dev/null\n",
        shell_quote(&python.to_string_lossy()),
        CONFIG_FILE
    )
}

/// Layout produced by `run` for `design_name`, if the flow got that far.
pub fn layout_path(runs_dir: &Path, run: &str, design_name: &str) -> PathBuf {
    runs_dir
        .join(run)
        .join("final")
        .join("gds")
        .join(format!("{}.gds", design_name))
}

fn find_interpreter(ctx: &FlowContext) -> Option<PathBuf> {
    ctx.config
        .tools
        .python_candidates
        .iter()
        .find_map(|candidate| ctx.config.resolve_executable(candidate))
}

pub async fn run_physical_flow(ctx: &FlowContext, request: PhysicalFlowRequest) -> Value {
    let record = match ctx.workspaces.create(WorkspaceKind::PhysicalFlow).await {
        Ok(record) => record,
        Err(e) => return envelope::failure(format!("Failed to create project: {}", e)),
    };
    let project_id = record.id.clone();
    info!(
        "Running OpenLane for '{}' in project {}",
        request.design_name, project_id
    );

    let Some(python) = find_interpreter(ctx) else {
        return envelope::failure_with(
            format!(
                "No Python interpreter found (tried: {})",
                ctx.config.tools.python_candidates.join(", ")
            ),
            json!({ "project_id": project_id }),
        );
    };

    let prepared = async {
        let config = serde_json::to_string_pretty(&request.flow_config())?;
        ctx.workspaces
            .write_artifact(&project_id, &request.source_file(), &request.verilog_code)
            .await?;
        ctx.workspaces
            .write_artifact(&project_id, CONFIG_FILE, &config)
            .await?;
        ctx.workspaces
            .write_artifact(&project_id, WRAPPER_FILE, &wrapper_script(&python))
            .await
    };
    if let Err(e) = prepared.await {
        return envelope::failure_with(
            format!("Failed to prepare flow inputs: {}", e),
            json!({ "project_id": project_id }),
        );
    }

    let invocation = ctx
        .invocation(
            &ctx.config.tools.shell,
            ctx.config.flow_timeout,
            &record.directory,
        )
        .arg(WRAPPER_FILE);

    let output = match ctx.runner.run(&invocation).await {
        Ok(output) => output,
        Err(ProcessError::NonZeroExit {
            exit_code,
            stdout,
            stderr,
            ..
        }) => {
            warn!(
                "OpenLane exited with status {} in project {}",
                exit_code, project_id
            );
            let detail = if stderr.trim().is_empty() {
                ctx.tail(&stdout)
            } else {
                ctx.tail(&stderr)
            };
            return envelope::failure_with(
                format!("OpenLane flow failed (exit status {}): {}", exit_code, detail),
                json!({ "project_id": project_id, "log": ctx.tail(&stdout) }),
            );
        }
        Err(e) => {
            return envelope::failure_with(
                format!("OpenLane flow failed: {}", e),
                json!({ "project_id": project_id }),
            )
        }
    };

    let runs_dir = record.directory.join("runs");
    let run_id = match latest_run(&runs_dir) {
        Ok(run) => run,
        Err(e) => {
            warn!("No runs found after flow in project {}: {}", project_id, e);
            None
        }
    };
    let gds_file = run_id
        .as_deref()
        .map(|run| layout_path(&runs_dir, run, &request.design_name))
        .filter(|path| path.is_file());

    let mut fields = json!({
        "project_id": project_id,
        "design_name": request.design_name,
        "run_id": run_id,
        "gds_file": gds_file.as_ref().map(|p| p.to_string_lossy().into_owned()),
        "log": ctx.tail(&output.stdout),
    });

    if request.open_in_klayout {
        let status = match &gds_file {
            Some(path) => ctx.launcher.launch(Viewer::KLayout, path).status(),
            None => NO_LAYOUT_STATUS.to_string(),
        };
        fields["klayout_status"] = Value::String(status);
    }

    envelope::success(fields)
}
