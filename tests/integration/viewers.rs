//! Waveform and layout viewers through the recording launcher.

use eda_mcp::flows::{
    run_physical_flow, simulate, view_layout, view_waveform, LayoutViewRequest,
    PhysicalFlowRequest, SimulationRequest, WaveformViewRequest,
};
use eda_mcp::viewer::Viewer;
use serde_json::json;

use crate::common::*;

async fn simulation_project(env: &TestEnv) -> String {
    let request =
        SimulationRequest::new(COUNTER_V.to_string(), COUNTER_TB.to_string(), None).unwrap();
    let envelope = simulate(&env.ctx, request).await;
    assert_eq!(envelope["success"], true, "{}", envelope);
    project_id(&envelope)
}

fn simulation_env() -> TestEnvBuilder {
    TestEnv::builder()
        .iverilog(FAKE_IVERILOG_OK)
        .vvp(FAKE_VVP)
}

#[tokio::test]
async fn test_missing_vcd_lists_available_files() {
    let env = simulation_env().build();
    let id = simulation_project(&env).await;

    let request = WaveformViewRequest::new(id.clone(), Some("missing.vcd".to_string()));
    let envelope = view_waveform(&env.ctx, request).await;

    assert_eq!(envelope["success"], false);
    assert!(error_text(&envelope).contains("missing.vcd"));
    assert_eq!(
        envelope["available_vcd_files"],
        json!(["dump.vcd", "extra.vcd"])
    );
    assert!(env.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_default_vcd_opens_in_gtkwave() {
    let env = simulation_env().build();
    let id = simulation_project(&env).await;

    let envelope = view_waveform(&env.ctx, WaveformViewRequest::new(id.clone(), None)).await;

    assert_eq!(
        envelope,
        json!({
            "success": true,
            "project_id": id,
            "vcd_file": "dump.vcd",
            "viewer": "gtkwave",
        })
    );
    let launches = env.launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].0, Viewer::GtkWave);
    assert_eq!(launches[0].1, env.project_dir(&id).join("dump.vcd"));
}

#[tokio::test]
async fn test_missing_gtkwave_returns_install_instructions() {
    let env = simulation_env().viewers_missing().build();
    let id = simulation_project(&env).await;

    let envelope = view_waveform(&env.ctx, WaveformViewRequest::new(id.clone(), None)).await;

    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["project_id"], id.as_str());
    for platform in ["linux", "macos", "windows"] {
        assert!(envelope["install_instructions"][platform].is_string());
    }
}

#[tokio::test]
async fn test_waveform_path_cannot_escape_project() {
    let env = simulation_env().build();
    let id = simulation_project(&env).await;

    let request = WaveformViewRequest::new(id, Some("../other/dump.vcd".to_string()));
    let envelope = view_waveform(&env.ctx, request).await;

    assert_eq!(envelope["success"], false);
    assert!(env.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_unknown_project_touches_nothing() {
    let env = TestEnv::builder().build();

    let envelope =
        view_waveform(&env.ctx, WaveformViewRequest::new("ghost".to_string(), None)).await;

    assert_eq!(envelope["success"], false);
    assert!(error_text(&envelope).contains("ghost"));
    assert!(envelope.get("available_vcd_files").is_none());
}

#[tokio::test]
async fn test_layout_defaults_to_latest_run() {
    let env = TestEnv::builder().python(FAKE_OPENLANE_PYTHON).build();
    let request = PhysicalFlowRequest::new(
        COUNTER_V.to_string(),
        "counter".to_string(),
        None,
        None,
        None,
    )
    .unwrap();
    let id = project_id(&run_physical_flow(&env.ctx, request).await);

    let envelope = view_layout(
        &env.ctx,
        LayoutViewRequest {
            project_id: id.clone(),
            gds_file: None,
        },
    )
    .await;

    assert_eq!(envelope["success"], true, "{}", envelope);
    assert_eq!(envelope["viewer"], "klayout");
    assert_eq!(
        envelope["gds_file"],
        "runs/RUN_2024-05-01_12-00-00/final/gds/counter.gds"
    );

    let missing = view_layout(
        &env.ctx,
        LayoutViewRequest {
            project_id: id,
            gds_file: Some("other.gds".to_string()),
        },
    )
    .await;
    assert_eq!(missing["success"], false);
    assert_eq!(missing["available_gds_files"], json!(["counter.gds"]));
}

#[tokio::test]
async fn test_layout_without_runs() {
    let env = TestEnv::builder().python(FAKE_OPENLANE_NO_RUNS).build();
    let request = PhysicalFlowRequest::new(
        COUNTER_V.to_string(),
        "counter".to_string(),
        None,
        None,
        None,
    )
    .unwrap();
    let id = project_id(&run_physical_flow(&env.ctx, request).await);

    let envelope = view_layout(
        &env.ctx,
        LayoutViewRequest {
            project_id: id,
            gds_file: None,
        },
    )
    .await;

    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["available_gds_files"], json!([]));
}
