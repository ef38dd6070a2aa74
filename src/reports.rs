//! Metrics extraction from physical-design flow reports.
//!
//! The extractors are pure text functions so they can be checked against
//! literal report fixtures. [`ReportSummary::from_run_dir`] is the only part
//! that touches the filesystem, and every report location it reads is
//! optional: a missing or unreadable file leaves the corresponding metric
//! unset and is logged, but never fails the summary.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

// Allow expect here as the patterns are fixed at compile time
#[allow(clippy::expect_used)]
static CELL_COUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Number of cells:\s+(\d+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static SLACK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:wns|worst negative slack|worst slack)\b[\s:=]*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)",
    )
    .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static TOTAL_POWER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let number = r"[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?";
    Regex::new(&format!(
        r"(?m)^\s*Total\s+{n}\s+{n}\s+{n}\s+({n})",
        n = number
    ))
    .expect("constant regex pattern is valid")
});

/// Cell count from a yosys `stat` report. Yosys prints the top module last,
/// so the last occurrence wins.
pub fn extract_cell_count(text: &str) -> Option<u64> {
    CELL_COUNT_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .last()
}

/// Worst slack in nanoseconds across every slack line in `text`.
pub fn extract_worst_slack(text: &str) -> Option<f64> {
    SLACK_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .fold(None, |worst: Option<f64>, value| {
            Some(worst.map_or(value, |w| w.min(value)))
        })
}

/// Total power in watts from an OpenSTA `report_power` table.
pub fn extract_total_power(text: &str) -> Option<f64> {
    TOTAL_POWER_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .last()
}

/// Report subsets that can be requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Synthesis,
    Placement,
    Routing,
    Timing,
    Power,
}

impl ReportCategory {
    pub const ALL: [ReportCategory; 5] = [
        ReportCategory::Synthesis,
        ReportCategory::Placement,
        ReportCategory::Routing,
        ReportCategory::Timing,
        ReportCategory::Power,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Synthesis => "synthesis",
            ReportCategory::Placement => "placement",
            ReportCategory::Routing => "routing",
            ReportCategory::Timing => "timing",
            ReportCategory::Power => "power",
        }
    }

    /// Resolve a `report_type` parameter. `all` (and nothing) selects every
    /// category; unknown names yield `None`.
    pub fn parse_selection(report_type: Option<&str>) -> Option<Vec<ReportCategory>> {
        let Some(name) = report_type else {
            return Some(Self::ALL.to_vec());
        };
        let name = name.trim().to_ascii_lowercase();
        if name == "all" {
            return Some(Self::ALL.to_vec());
        }
        Self::ALL
            .iter()
            .find(|c| c.as_str() == name)
            .map(|c| vec![*c])
    }

    /// Directory under the run's `reports/` and an optional file-name filter.
    fn location(&self) -> (&'static str, Option<&'static str>) {
        match self {
            ReportCategory::Synthesis => ("synthesis", None),
            ReportCategory::Placement => ("placement", None),
            ReportCategory::Routing => ("routing", None),
            ReportCategory::Timing => ("signoff", Some("sta")),
            ReportCategory::Power => ("signoff", Some("power")),
        }
    }

    /// Report files for this category in sorted order.
    pub fn files(&self, run_dir: &Path) -> Vec<PathBuf> {
        let (subdir, filter) = self.location();
        let files = sorted_files(&run_dir.join("reports").join(subdir));
        match filter {
            Some(needle) => files
                .into_iter()
                .filter(|p| file_name_contains(p, needle))
                .collect(),
            None => files,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMetrics {
    pub cell_count: Option<u64>,
    pub worst_negative_slack_ns: Option<f64>,
    pub power_estimate_w: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportStatus {
    pub synthesis_complete: bool,
    pub timing_clean: bool,
    pub routing_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Success,
    IssuesFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub metrics: ReportMetrics,
    pub status: ReportStatus,
    pub issues: Vec<String>,
    pub overall_status: OverallStatus,
}

impl ReportSummary {
    /// Fold extracted metrics into flags, issues and an overall status.
    pub fn from_metrics(metrics: ReportMetrics, routing_complete: bool) -> Self {
        let status = ReportStatus {
            synthesis_complete: metrics.cell_count.is_some(),
            timing_clean: metrics
                .worst_negative_slack_ns
                .is_some_and(|slack| slack >= 0.0),
            routing_complete,
        };

        let mut issues = Vec::new();
        if !status.synthesis_complete {
            issues.push("Synthesis report not found or cell count missing".to_string());
        }
        if !status.timing_clean {
            match metrics.worst_negative_slack_ns {
                Some(slack) => issues.push(format!(
                    "Timing violations detected (worst negative slack {} ns)",
                    slack
                )),
                None => issues.push("Timing results not found".to_string()),
            }
        }
        if !status.routing_complete {
            issues.push("Routing did not complete (no final metrics found)".to_string());
        }

        let overall_status = if issues.is_empty() {
            OverallStatus::Success
        } else {
            OverallStatus::IssuesFound
        };

        Self {
            metrics,
            status,
            issues,
            overall_status,
        }
    }

    /// Scan a run directory. Recomputed on every call; nothing is cached.
    pub fn from_run_dir(run_dir: &Path) -> Self {
        let reports = run_dir.join("reports");

        let mut cell_count = None;
        for path in sorted_files(&reports.join("synthesis")) {
            if !file_name_contains(&path, "stat") {
                continue;
            }
            if let Some(count) = read_report(&path).as_deref().and_then(extract_cell_count) {
                cell_count = Some(count);
            }
        }

        let mut slack: Option<f64> = None;
        for dir in ["routing", "signoff"] {
            for path in sorted_files(&reports.join(dir)) {
                if let Some(value) = read_report(&path).as_deref().and_then(extract_worst_slack) {
                    slack = Some(slack.map_or(value, |s| s.min(value)));
                }
            }
        }

        let mut power = None;
        for path in sorted_files(&reports.join("signoff")) {
            if !file_name_contains(&path, "power") {
                continue;
            }
            if let Some(total) = read_report(&path).as_deref().and_then(extract_total_power) {
                power = Some(total);
            }
        }

        let routing_complete = run_dir.join("final").join("metrics.json").is_file()
            || reports.join("metrics.csv").is_file();

        debug!(
            "Report scan of {}: cells={:?} slack={:?} power={:?} routed={}",
            run_dir.display(),
            cell_count,
            slack,
            power,
            routing_complete
        );

        Self::from_metrics(
            ReportMetrics {
                cell_count,
                worst_negative_slack_ns: slack,
                power_estimate_w: power,
            },
            routing_complete,
        )
    }
}

/// Regular files directly inside `dir`, sorted by name. A missing directory
/// is an empty listing; an unreadable one is logged and also treated as empty.
pub fn sorted_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Skipping report location {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    files.sort();
    files
}

fn file_name_contains(path: &Path, needle: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().contains(needle))
}

/// Read a report as text, replacing invalid UTF-8. A file that vanished
/// between listing and reading counts as absent; any other failure is
/// logged and also counts as absent.
pub fn read_report(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Skipping report {}: {}", path.display(), e);
            None
        }
    }
}
