use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{envelope, latest_run, relative_display, FlowContext};
use crate::error::{AppError, Result};
use crate::reports::{read_report, ReportCategory, ReportSummary};
use crate::workspace::WorkspaceKind;

#[derive(Debug, Clone)]
pub struct ReportReadRequest {
    pub project_id: String,
    pub categories: Vec<ReportCategory>,
}

impl ReportReadRequest {
    pub fn new(project_id: String, report_type: Option<String>) -> Result<Self> {
        let categories =
            ReportCategory::parse_selection(report_type.as_deref()).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Parameter 'report_type' must be one of all, synthesis, placement, routing, timing, power; got '{}'",
                    report_type.unwrap_or_default()
                ))
            })?;
        Ok(Self {
            project_id,
            categories,
        })
    }
}

pub async fn read_reports(ctx: &FlowContext, request: ReportReadRequest) -> Value {
    let project_id = request.project_id.clone();
    let _guard = match ctx.workspaces.lock(&project_id).await {
        Ok(guard) => guard,
        Err(e) => return envelope::failure(e.to_string()),
    };

    // Report scanning is blocking filesystem work
    let scan_ctx = ctx.clone();
    let scanned = tokio::task::spawn_blocking(move || collect(&scan_ctx, &request))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Report scan task failed: {}", e)))
        .and_then(|result| result);

    match scanned {
        Ok(envelope) => envelope,
        Err(e) => envelope::failure_with(e.to_string(), json!({ "project_id": project_id })),
    }
}

fn collect(ctx: &FlowContext, request: &ReportReadRequest) -> Result<Value> {
    let project_id = &request.project_id;
    let record = ctx.workspaces.get(project_id)?;
    if record.kind != WorkspaceKind::PhysicalFlow {
        return Err(AppError::Validation(format!(
            "Project {} is a {} project; reports exist only for {} projects",
            project_id,
            record.kind,
            WorkspaceKind::PhysicalFlow
        )));
    }

    let runs_dir = record.directory.join("runs");
    if !runs_dir.is_dir() {
        return Ok(envelope::failure_with(
            format!(
                "No runs directory found for project {}. Run the OpenLane flow first.",
                project_id
            ),
            json!({ "project_id": project_id }),
        ));
    }
    let Some(run_id) = latest_run(&runs_dir)? else {
        return Ok(envelope::failure_with(
            format!("No runs found in runs directory for project {}", project_id),
            json!({ "project_id": project_id }),
        ));
    };

    let run_dir = runs_dir.join(&run_id);
    debug!("Reading reports from {}", run_dir.display());
    let summary = ReportSummary::from_run_dir(&run_dir);

    let mut reports = Map::new();
    for category in &request.categories {
        reports.insert(
            category.as_str().to_string(),
            Value::Array(report_previews(ctx, &run_dir, *category)),
        );
    }

    Ok(envelope::success(json!({
        "project_id": project_id,
        "run_id": run_id,
        "summary": summary,
        "reports": reports,
    })))
}

/// Previews of one category. A file that cannot be read is left out.
fn report_previews(ctx: &FlowContext, run_dir: &Path, category: ReportCategory) -> Vec<Value> {
    category
        .files(run_dir)
        .into_iter()
        .filter_map(|path| {
            let content = read_report(&path)?;
            Some(json!({
                "file": relative_display(&path, run_dir),
                "content": ctx.preview(&content),
            }))
        })
        .collect()
}
