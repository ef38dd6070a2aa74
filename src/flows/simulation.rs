use serde_json::{json, Value};
use tracing::{info, warn};

use super::{envelope, files_with_extension, validate_identifier, FlowContext};
use crate::error::Result;
use crate::process::ProcessError;
use crate::workspace::WorkspaceKind;

const DESIGN_FILE: &str = "design.v";
const TESTBENCH_FILE: &str = "testbench.v";
const COMPILED_FILE: &str = "sim.vvp";

#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub verilog_code: String,
    pub testbench_code: String,
    pub top_module: Option<String>,
}

impl SimulationRequest {
    pub fn new(
        verilog_code: String,
        testbench_code: String,
        top_module: Option<String>,
    ) -> Result<Self> {
        if let Some(top) = &top_module {
            validate_identifier(top, "top_module")?;
        }
        Ok(Self {
            verilog_code,
            testbench_code,
            top_module,
        })
    }

    fn compile_args(&self) -> Vec<String> {
        let mut args = vec!["-g2012".to_string()];
        if let Some(top) = &self.top_module {
            args.push("-s".to_string());
            args.push(top.clone());
        }
        args.extend(
            ["-o", COMPILED_FILE, DESIGN_FILE, TESTBENCH_FILE]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

pub async fn simulate(ctx: &FlowContext, request: SimulationRequest) -> Value {
    let record = match ctx.workspaces.create(WorkspaceKind::Simulation).await {
        Ok(record) => record,
        Err(e) => return envelope::failure(format!("Failed to create project: {}", e)),
    };
    let project_id = record.id.clone();
    info!("Simulating in project {}", project_id);

    let prepared = async {
        ctx.workspaces
            .write_artifact(&project_id, DESIGN_FILE, &request.verilog_code)
            .await?;
        ctx.workspaces
            .write_artifact(&project_id, TESTBENCH_FILE, &request.testbench_code)
            .await
    };
    if let Err(e) = prepared.await {
        return envelope::failure_with(
            format!("Failed to prepare simulation inputs: {}", e),
            json!({ "project_id": project_id }),
        );
    }

    let compile = ctx
        .invocation(
            &ctx.config.tools.iverilog,
            ctx.config.quick_timeout,
            &record.directory,
        )
        .args(request.compile_args());

    if let Err(e) = ctx.runner.run(&compile).await {
        let detail = match e {
            ProcessError::NonZeroExit { stderr, .. } => ctx.preview(&stderr),
            other => other.to_string(),
        };
        warn!("Compilation failed in project {}", project_id);
        return envelope::failure_with(
            format!("Compilation failed: {}", detail),
            json!({ "project_id": project_id }),
        );
    }

    let run = ctx
        .invocation(
            &ctx.config.tools.vvp,
            ctx.config.quick_timeout,
            &record.directory,
        )
        .arg(COMPILED_FILE);

    match ctx.runner.run(&run).await {
        Ok(output) => envelope::success(json!({
            "project_id": project_id,
            "output": ctx.preview(&output.stdout),
            "vcd_files": files_with_extension(&record.directory, "vcd"),
        })),
        Err(ProcessError::NonZeroExit {
            exit_code,
            stdout,
            stderr,
            ..
        }) => envelope::failure_with(
            format!(
                "Simulation failed (exit status {}): {}",
                exit_code,
                ctx.preview(&stderr)
            ),
            json!({
                "project_id": project_id,
                "output": ctx.preview(&stdout),
                "vcd_files": files_with_extension(&record.directory, "vcd"),
            }),
        ),
        Err(e) => envelope::failure_with(
            format!("Simulation failed: {}", e),
            json!({ "project_id": project_id }),
        ),
    }
}
