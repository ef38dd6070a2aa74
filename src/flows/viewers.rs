use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::info;

use super::{envelope, files_with_extension, latest_run, relative_display, FlowContext};
use crate::viewer::{install_instructions, LaunchOutcome, Viewer};
use crate::workspace::WorkspaceRecord;

const DEFAULT_VCD_FILE: &str = "dump.vcd";

#[derive(Debug, Clone)]
pub struct WaveformViewRequest {
    pub project_id: String,
    pub vcd_file: String,
}

impl WaveformViewRequest {
    pub fn new(project_id: String, vcd_file: Option<String>) -> Self {
        Self {
            project_id,
            vcd_file: vcd_file.unwrap_or_else(|| DEFAULT_VCD_FILE.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutViewRequest {
    pub project_id: String,
    pub gds_file: Option<String>,
}

pub async fn view_waveform(ctx: &FlowContext, request: WaveformViewRequest) -> Value {
    let project_id = request.project_id;
    let _guard = match ctx.workspaces.lock(&project_id).await {
        Ok(guard) => guard,
        Err(e) => return envelope::failure(e.to_string()),
    };

    let record = match ctx.workspaces.get(&project_id) {
        Ok(record) => record,
        Err(e) => return envelope::failure(e.to_string()),
    };
    let path = match ctx.workspaces.resolve_artifact(&project_id, &request.vcd_file) {
        Ok(path) => path,
        Err(e) => {
            return envelope::failure_with(e.to_string(), json!({ "project_id": project_id }))
        }
    };

    if !path.is_file() {
        return envelope::failure_with(
            format!(
                "VCD file '{}' not found in project {}",
                request.vcd_file, project_id
            ),
            json!({
                "project_id": project_id,
                "available_vcd_files": files_with_extension(&record.directory, "vcd"),
            }),
        );
    }

    match open_viewer(ctx, Viewer::GtkWave, &path) {
        Ok(()) => envelope::success(json!({
            "project_id": project_id,
            "vcd_file": request.vcd_file,
            "viewer": Viewer::GtkWave.as_str(),
        })),
        Err(failure) => with_project(failure, &project_id),
    }
}

pub async fn view_layout(ctx: &FlowContext, request: LayoutViewRequest) -> Value {
    let project_id = request.project_id;
    let _guard = match ctx.workspaces.lock(&project_id).await {
        Ok(guard) => guard,
        Err(e) => return envelope::failure(e.to_string()),
    };
    let record = match ctx.workspaces.get(&project_id) {
        Ok(record) => record,
        Err(e) => return envelope::failure(e.to_string()),
    };

    let layout_dir = latest_layout_dir(&record);
    let available = layout_dir
        .as_ref()
        .map(|dir| files_with_extension(dir, "gds"))
        .unwrap_or_default();

    let path = match &request.gds_file {
        Some(name) => {
            let in_project = match ctx.workspaces.resolve_artifact(&project_id, name) {
                Ok(path) => path,
                Err(e) => {
                    return envelope::failure_with(
                        e.to_string(),
                        json!({ "project_id": project_id }),
                    )
                }
            };
            // Bare file names refer to the latest run's layouts
            let in_run = layout_dir
                .as_ref()
                .map(|dir| dir.join(name))
                .filter(|p| p.is_file());
            if in_project.is_file() {
                Some(in_project)
            } else {
                in_run
            }
        }
        None => layout_dir
            .as_ref()
            .zip(available.first())
            .map(|(dir, name)| dir.join(name)),
    };

    let Some(path) = path else {
        let error = match &request.gds_file {
            Some(name) => format!("GDS file '{}' not found in project {}", name, project_id),
            None => format!("No GDS file generated yet for project {}", project_id),
        };
        return envelope::failure_with(
            error,
            json!({
                "project_id": project_id,
                "available_gds_files": available,
            }),
        );
    };

    match open_viewer(ctx, Viewer::KLayout, &path) {
        Ok(()) => envelope::success(json!({
            "project_id": project_id,
            "gds_file": relative_display(&path, &record.directory),
            "viewer": Viewer::KLayout.as_str(),
        })),
        Err(failure) => with_project(failure, &project_id),
    }
}

/// `final/gds` of the newest run, when there is one.
fn latest_layout_dir(record: &WorkspaceRecord) -> Option<PathBuf> {
    let runs_dir = record.directory.join("runs");
    let run = latest_run(&runs_dir).ok().flatten()?;
    Some(runs_dir.join(run).join("final").join("gds"))
}

/// Launch a viewer, or build the failure envelope explaining why not.
fn open_viewer(ctx: &FlowContext, viewer: Viewer, file: &Path) -> Result<(), Value> {
    let not_available = |reason: String| {
        envelope::failure_with(
            format!("{} is not available: {}", viewer, reason),
            json!({ "install_instructions": install_instructions(viewer) }),
        )
    };

    if ctx.launcher.locate(viewer).is_none() {
        return Err(not_available(format!(
            "no {} executable found on the search path",
            viewer.as_str()
        )));
    }

    match ctx.launcher.launch(viewer, file) {
        LaunchOutcome::Launched => {
            info!("Opened {} in {}", file.display(), viewer);
            Ok(())
        }
        LaunchOutcome::NotAvailable(reason) => Err(not_available(reason)),
        LaunchOutcome::Failed(reason) => Err(envelope::failure(format!(
            "Failed to launch {}: {}",
            viewer, reason
        ))),
    }
}

fn with_project(mut failure: Value, project_id: &str) -> Value {
    failure["project_id"] = Value::String(project_id.to_string());
    failure
}
