use std::path::Path;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{envelope, validate_identifier, FlowContext};
use crate::error::Result;
use crate::process::ProcessError;
use crate::reports::extract_cell_count;
use crate::workspace::WorkspaceKind;

const DESIGN_FILE: &str = "design.v";
const SCRIPT_FILE: &str = "synth.ys";
const NETLIST_FILE: &str = "synthesized.v";
const NOT_GENERATED: &str = "not generated";

/// Technology mapping selected by the `target` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisTarget {
    Generic,
    Ice40,
    Xilinx,
}

impl SynthesisTarget {
    /// Case-insensitive lookup. Anything unrecognized maps to the generic flow.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ice40" => SynthesisTarget::Ice40,
            "xilinx" => SynthesisTarget::Xilinx,
            _ => SynthesisTarget::Generic,
        }
    }

    fn synth_command(&self) -> &'static str {
        match self {
            SynthesisTarget::Generic => "synth",
            SynthesisTarget::Ice40 => "synth_ice40",
            SynthesisTarget::Xilinx => "synth_xilinx",
        }
    }

    pub fn script(&self, top_module: &str) -> String {
        format!(
            "read_verilog {}\n{} -top {}\nstat\nwrite_verilog -noattr {}\n",
            DESIGN_FILE,
            self.synth_command(),
            top_module,
            NETLIST_FILE
        )
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub verilog_code: String,
    pub top_module: String,
    pub target: String,
}

impl SynthesisRequest {
    pub fn new(verilog_code: String, top_module: String, target: Option<String>) -> Result<Self> {
        validate_identifier(&top_module, "top_module")?;
        Ok(Self {
            verilog_code,
            top_module,
            target: target.unwrap_or_else(|| "generic".to_string()),
        })
    }
}

pub async fn synthesize(ctx: &FlowContext, request: SynthesisRequest) -> Value {
    let record = match ctx.workspaces.create(WorkspaceKind::Synthesis).await {
        Ok(record) => record,
        Err(e) => return envelope::failure(format!("Failed to create project: {}", e)),
    };
    let project_id = record.id.clone();
    let target = SynthesisTarget::from_name(&request.target);
    info!(
        "Synthesizing '{}' for {:?} in project {}",
        request.top_module, target, project_id
    );

    let prepared = async {
        ctx.workspaces
            .write_artifact(&project_id, DESIGN_FILE, &request.verilog_code)
            .await?;
        ctx.workspaces
            .write_artifact(&project_id, SCRIPT_FILE, &target.script(&request.top_module))
            .await
    };
    if let Err(e) = prepared.await {
        return envelope::failure_with(
            format!("Failed to prepare synthesis inputs: {}", e),
            json!({ "project_id": project_id }),
        );
    }

    let invocation = ctx
        .invocation(
            &ctx.config.tools.yosys,
            ctx.config.quick_timeout,
            &record.directory,
        )
        .args(["-s", SCRIPT_FILE]);

    let output = match ctx.runner.run(&invocation).await {
        Ok(output) => output,
        Err(ProcessError::NonZeroExit {
            exit_code,
            stdout,
            stderr,
            ..
        }) => {
            warn!("Yosys exited with status {} in project {}", exit_code, project_id);
            // Yosys reports most errors on stdout
            let detail = if stderr.trim().is_empty() {
                ctx.tail(&stdout)
            } else {
                ctx.tail(&stderr)
            };
            let fields =
                result_fields(ctx, &project_id, &request, &record.directory, &stdout).await;
            return envelope::failure_with(
                format!("Synthesis failed (exit status {}): {}", exit_code, detail),
                fields,
            );
        }
        Err(e) => {
            let fields = result_fields(ctx, &project_id, &request, &record.directory, "").await;
            return envelope::failure_with(format!("Synthesis failed: {}", e), fields);
        }
    };

    envelope::success(
        result_fields(ctx, &project_id, &request, &record.directory, &output.stdout).await,
    )
}

/// Fields reported whether or not yosys succeeded. A script error can still
/// leave a partial log, and the netlist is reported as not generated.
async fn result_fields(
    ctx: &FlowContext,
    project_id: &str,
    request: &SynthesisRequest,
    directory: &Path,
    log: &str,
) -> Value {
    let synthesized = match tokio::fs::read_to_string(directory.join(NETLIST_FILE)).await {
        Ok(netlist) => ctx.preview(&netlist),
        Err(_) => NOT_GENERATED.to_string(),
    };

    json!({
        "project_id": project_id,
        "technology": request.target,
        "top_module": request.top_module,
        "synthesized_verilog": synthesized,
        "cell_count": extract_cell_count(log),
        "log": ctx.preview(log),
    })
}
