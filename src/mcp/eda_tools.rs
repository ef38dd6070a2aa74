use async_trait::async_trait;
use serde_json::{json, Value};

use super::tools::{create_envelope_response, extract_optional_param, extract_param, ToolHandler};
use super::types::{CallToolResponse, Tool};
use crate::error::Result;
use crate::flows::{
    read_reports, run_physical_flow, simulate, synthesize, view_layout, view_waveform,
    FlowContext, LayoutViewRequest, PhysicalFlowRequest, ReportReadRequest, SimulationRequest,
    SynthesisRequest, WaveformViewRequest,
};

pub struct SynthesizeVerilogTool;

#[async_trait]
impl ToolHandler for SynthesizeVerilogTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = SynthesisRequest::new(
            extract_param(&arguments, "verilog_code")?,
            extract_param(&arguments, "top_module")?,
            extract_optional_param(&arguments, "target")?,
        )?;
        create_envelope_response(&synthesize(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "synthesize_verilog".to_string(),
            description: "Synthesize Verilog with Yosys for a generic, iCE40 or Xilinx target and report the netlist and cell count".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "verilog_code": {
                        "type": "string",
                        "description": "Verilog source of the design"
                    },
                    "top_module": {
                        "type": "string",
                        "description": "Name of the top-level module"
                    },
                    "target": {
                        "type": "string",
                        "description": "Technology target: generic, ice40 or xilinx (default: generic)"
                    }
                },
                "required": ["verilog_code", "top_module"]
            }),
        }
    }
}

pub struct SimulateVerilogTool;

#[async_trait]
impl ToolHandler for SimulateVerilogTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = SimulationRequest::new(
            extract_param(&arguments, "verilog_code")?,
            extract_param(&arguments, "testbench_code")?,
            extract_optional_param(&arguments, "top_module")?,
        )?;
        create_envelope_response(&simulate(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "simulate_verilog".to_string(),
            description: "Compile a design and testbench with Icarus Verilog, run the simulation and list generated VCD files".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "verilog_code": {
                        "type": "string",
                        "description": "Verilog source of the design under test"
                    },
                    "testbench_code": {
                        "type": "string",
                        "description": "Verilog testbench; use $dumpfile(\"dump.vcd\") to record waveforms"
                    },
                    "top_module": {
                        "type": "string",
                        "description": "Top-level module to elaborate (optional)"
                    }
                },
                "required": ["verilog_code", "testbench_code"]
            }),
        }
    }
}

pub struct RunOpenlaneTool;

#[async_trait]
impl ToolHandler for RunOpenlaneTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = PhysicalFlowRequest::new(
            extract_param(&arguments, "verilog_code")?,
            extract_param(&arguments, "design_name")?,
            extract_optional_param(&arguments, "clock_port")?,
            extract_optional_param(&arguments, "clock_period")?,
            extract_optional_param(&arguments, "open_in_klayout")?,
        )?;
        create_envelope_response(&run_physical_flow(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "run_openlane".to_string(),
            description: "Run the OpenLane RTL-to-GDSII flow on a design and optionally open the layout in KLayout".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "verilog_code": {
                        "type": "string",
                        "description": "Verilog source of the design"
                    },
                    "design_name": {
                        "type": "string",
                        "description": "Top-level module name, also used for the generated files"
                    },
                    "clock_port": {
                        "type": "string",
                        "description": "Clock port name (default: clk)"
                    },
                    "clock_period": {
                        "type": "number",
                        "description": "Clock period in nanoseconds (default: 10.0)"
                    },
                    "open_in_klayout": {
                        "type": "boolean",
                        "description": "Open the resulting GDS in KLayout (default: false)"
                    }
                },
                "required": ["verilog_code", "design_name"]
            }),
        }
    }
}

pub struct ViewWaveformTool;

#[async_trait]
impl ToolHandler for ViewWaveformTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = WaveformViewRequest::new(
            extract_param(&arguments, "project_id")?,
            extract_optional_param(&arguments, "vcd_file")?,
        );
        create_envelope_response(&view_waveform(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "view_waveform".to_string(),
            description: "Open a VCD waveform from a simulation project in GTKWave".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Project id returned by simulate_verilog"
                    },
                    "vcd_file": {
                        "type": "string",
                        "description": "VCD file name inside the project (default: dump.vcd)"
                    }
                },
                "required": ["project_id"]
            }),
        }
    }
}

pub struct ViewGdsTool;

#[async_trait]
impl ToolHandler for ViewGdsTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = LayoutViewRequest {
            project_id: extract_param(&arguments, "project_id")?,
            gds_file: extract_optional_param(&arguments, "gds_file")?,
        };
        create_envelope_response(&view_layout(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "view_gds".to_string(),
            description: "Open a GDS layout from an OpenLane project in KLayout".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Project id returned by run_openlane"
                    },
                    "gds_file": {
                        "type": "string",
                        "description": "GDS file inside the project or the latest run (default: the latest run's layout)"
                    }
                },
                "required": ["project_id"]
            }),
        }
    }
}

pub struct ReadOpenlaneReportsTool;

#[async_trait]
impl ToolHandler for ReadOpenlaneReportsTool {
    async fn call(&self, ctx: &FlowContext, arguments: Option<Value>) -> Result<CallToolResponse> {
        let request = ReportReadRequest::new(
            extract_param(&arguments, "project_id")?,
            extract_optional_param(&arguments, "report_type")?,
        )?;
        create_envelope_response(&read_reports(ctx, request).await)
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "read_openlane_reports".to_string(),
            description: "Summarize area, timing, power and routing results of the latest OpenLane run".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Project id returned by run_openlane"
                    },
                    "report_type": {
                        "type": "string",
                        "enum": ["all", "synthesis", "placement", "routing", "timing", "power"],
                        "description": "Which report files to include (default: all)"
                    }
                },
                "required": ["project_id"]
            }),
        }
    }
}
