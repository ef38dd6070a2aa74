//! Shared fixtures for integration tests.
//!
//! External EDA tools are replaced with small `sh` scripts and GUI viewers
//! with a recording launcher, so the suite runs without any EDA install.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eda_mcp::config::Config;
use eda_mcp::flows::FlowContext;
use eda_mcp::viewer::{LaunchOutcome, Viewer, ViewerLauncher};
use serde_json::Value;
use tempfile::TempDir;

pub const COUNTER_V: &str = "\
module counter(input clk, output reg [3:0] q);
  always @(posedge clk) q <= q + 1;
endmodule
";

pub const COUNTER_TB: &str = "\
module tb;
  reg clk = 0;
  wire [3:0] q;
  counter dut(.clk(clk), .q(q));
  initial begin
    $dumpfile(\"dump.vcd\");
    $dumpvars(0, tb);
    #20 $finish;
  end
  always #1 clk = ~clk;
endmodule
";

/// Yosys stand-in: prints a stat block and writes a netlist.
pub const FAKE_YOSYS: &str = r#"#!/bin/sh
[ "$1" = "-s" ] || { echo "expected -s" >&2; exit 2; }
echo "-- Executing script file \`$2' --"
grep -E '^synth' "$2"
echo "   Number of cells:                 42"
printf 'module counter(clk, q);\nendmodule\n' > synthesized.v
"#;

/// Yosys stand-in that succeeds without producing a netlist.
pub const FAKE_YOSYS_NO_NETLIST: &str = r#"#!/bin/sh
echo "   Number of cells:                  7"
"#;

/// Yosys stand-in that rejects the design the way a script error does.
pub const FAKE_YOSYS_SYNTAX_ERROR: &str = r#"#!/bin/sh
echo "-- Parsing \`design.v' using frontend \`verilog' --"
echo "ERROR: syntax error, unexpected TOK_ENDMODULE"
exit 1
"#;

pub const FAKE_IVERILOG_OK: &str = r#"#!/bin/sh
: > sim.vvp
"#;

pub const FAKE_IVERILOG_PORT_MISMATCH: &str = r#"#!/bin/sh
echo "testbench.v:4: error: port width mismatch for port q of counter" >&2
exit 1
"#;

pub const FAKE_VVP: &str = r#"#!/bin/sh
: > vvp.ran
echo "VCD info: dumpfile dump.vcd opened for output."
echo '$date today $end' > dump.vcd
echo '$date today $end' > extra.vcd
echo "PASS"
"#;

/// OpenLane stand-in invoked as `<python> -m openlane config.json`. Lays out
/// one run with reports and a layout for the configured design.
pub const FAKE_OPENLANE_PYTHON: &str = r#"#!/bin/sh
[ "$1" = "-m" ] && [ "$2" = "openlane" ] || { echo "bad args: $*" >&2; exit 2; }
[ "$CI" = "1" ] && [ "$TERM" = "dumb" ] || { echo "interactive environment" >&2; exit 3; }
design=$(sed -n 's/.*"DESIGN_NAME": *"\([^"]*\)".*/\1/p' "$3")
run=runs/RUN_2024-05-01_12-00-00
mkdir -p $run/final/gds $run/reports/synthesis $run/reports/routing $run/reports/signoff
mkdir -p runs/RUN_2024-04-30_08-00-00
echo "GDS" > $run/final/gds/$design.gds
echo "{}" > $run/final/metrics.json
echo "   Number of cells:                128" > $run/reports/synthesis/1-synthesis.stat.rpt
echo "wns -0.25" > $run/reports/routing/grt.rpt
echo "worst slack 0.80" > $run/reports/signoff/sta-max.rpt
cat > $run/reports/signoff/power.rpt <<EOT
Group                  Internal  Switching    Leakage      Total
----------------------------------------------------------------
Total                  1.00e-03   5.00e-04   1.00e-08   1.50e-03 100.0%
EOT
echo "Flow complete for $design"
"#;

/// OpenLane stand-in that finishes without producing any run.
pub const FAKE_OPENLANE_NO_RUNS: &str = r#"#!/bin/sh
echo "nothing to do"
"#;

pub const FAKE_OPENLANE_FAILING: &str = r#"#!/bin/sh
echo "[STEP 1] Synthesis"
echo "ERROR: design has no top module" >&2
exit 1
"#;

pub const SLOW_TOOL: &str = r#"#!/bin/sh
sleep 30
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Viewer capability that records launches instead of opening windows.
pub struct FakeLauncher {
    available: bool,
    launches: Mutex<Vec<(Viewer, PathBuf)>>,
}

impl FakeLauncher {
    pub fn available() -> Self {
        Self {
            available: true,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<(Viewer, PathBuf)> {
        self.launches.lock().unwrap().clone()
    }
}

impl ViewerLauncher for FakeLauncher {
    fn locate(&self, viewer: Viewer) -> Option<PathBuf> {
        self.available
            .then(|| PathBuf::from(format!("/opt/fake/bin/{}", viewer.as_str())))
    }

    fn launch(&self, viewer: Viewer, file: &Path) -> LaunchOutcome {
        if !self.available {
            return LaunchOutcome::NotAvailable(format!("{} not installed", viewer));
        }
        self.launches
            .lock()
            .unwrap()
            .push((viewer, file.to_path_buf()));
        LaunchOutcome::Launched
    }
}

/// A flow context rooted in temporary directories with fake tools installed.
pub struct TestEnv {
    pub root: TempDir,
    pub tools: TempDir,
    pub ctx: FlowContext,
    pub launcher: Arc<FakeLauncher>,
}

pub struct TestEnvBuilder {
    tools: TempDir,
    config: Config,
    launcher: FakeLauncher,
}

impl TestEnvBuilder {
    pub fn yosys(mut self, body: &str) -> Self {
        self.config.tools.yosys = self.script("yosys", body);
        self
    }

    pub fn iverilog(mut self, body: &str) -> Self {
        self.config.tools.iverilog = self.script("iverilog", body);
        self
    }

    pub fn vvp(mut self, body: &str) -> Self {
        self.config.tools.vvp = self.script("vvp", body);
        self
    }

    /// Install an OpenLane interpreter stand-in behind a missing candidate,
    /// so probing has to skip the first entry.
    pub fn python(mut self, body: &str) -> Self {
        let python = self.script("python3-openlane", body);
        self.config.tools.python_candidates = vec!["eda-mcp-test-no-python".to_string(), python];
        self
    }

    pub fn no_python(mut self) -> Self {
        self.config.tools.python_candidates = vec![
            "eda-mcp-test-no-python3.12".to_string(),
            "eda-mcp-test-no-python3".to_string(),
        ];
        self
    }

    pub fn quick_timeout(mut self, timeout: Duration) -> Self {
        self.config.quick_timeout = timeout;
        self
    }

    pub fn viewers_missing(mut self) -> Self {
        self.launcher = FakeLauncher::missing();
        self
    }

    pub fn build(self) -> TestEnv {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            workspace_root: root.path().to_path_buf(),
            ..self.config
        };
        let launcher = Arc::new(self.launcher);
        let ctx = FlowContext::with_launcher(config, launcher.clone());
        TestEnv {
            root,
            tools: self.tools,
            ctx,
            launcher,
        }
    }

    fn script(&self, name: &str, body: &str) -> String {
        write_script(self.tools.path(), name, body)
            .to_string_lossy()
            .into_owned()
    }
}

impl TestEnv {
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder {
            tools: tempfile::tempdir().unwrap(),
            config: Config {
                extra_search_paths: Vec::new(),
                ..Config::default()
            },
            launcher: FakeLauncher::available(),
        }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.ctx.workspaces.get(project_id).unwrap().directory
    }
}

pub fn project_id(envelope: &Value) -> String {
    envelope["project_id"]
        .as_str()
        .unwrap_or_else(|| panic!("no project_id in {}", envelope))
        .to_string()
}

pub fn error_text(envelope: &Value) -> &str {
    envelope["error"]
        .as_str()
        .unwrap_or_else(|| panic!("no error in {}", envelope))
}
