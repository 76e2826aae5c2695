use bsp_bridge::bsp::{ConnectionConfig, DaemonState, ReconcileOutcome};
use bsp_bridge::daemon::DaemonInfo;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fmt::Write;

use crate::cli::args::OutputFormat;

/// What `status` reports.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub address: String,
    pub state: DaemonState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon: Option<DaemonInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport<'a> {
    address: String,
    bsp_socket: &'a std::path::Path,
    version: &'a str,
    jvm_options: &'a [String],
    java_home: Option<&'a std::path::Path>,
    retry_period_ms: u128,
    connect_timeout_ms: u128,
}

pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        let color = format == OutputFormat::Human
            && supports_color::on(supports_color::Stream::Stdout).is_some();
        Self::with_color(format, color)
    }

    pub const fn with_color(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    fn paint_state(&self, state: DaemonState) -> String {
        let label = match state {
            DaemonState::Running => "running",
            DaemonState::NotRunning => "not running",
            DaemonState::Unknown => "unknown",
        };
        if !self.color {
            return label.to_string();
        }
        match state {
            DaemonState::Running => label.green().bold().to_string(),
            DaemonState::NotRunning => label.red().bold().to_string(),
            DaemonState::Unknown => label.yellow().to_string(),
        }
    }

    pub fn format_status(&self, report: &StatusReport) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
        }

        let mut output = format!("Build server: {}\n", self.paint_state(report.state));
        let _ = writeln!(output, "Address: {}", report.address);
        if let Some(info) = &report.daemon {
            let _ = writeln!(output, "Version: {}", info.version);
            if let Some(pid) = info.pid {
                let _ = writeln!(output, "Pid: {pid}");
            }
            if !info.jvm_options.is_empty() {
                let _ = writeln!(output, "JVM options: {}", info.jvm_options.join(" "));
            }
        }
        output.trim_end().to_string()
    }

    pub fn format_config(&self, config: &ConnectionConfig) -> String {
        let report = ConfigReport {
            address: config.address.to_string(),
            bsp_socket: &config.bsp_socket,
            version: &config.version,
            jvm_options: &config.jvm_options,
            java_home: config.java_home.as_deref(),
            retry_period_ms: config.period.as_millis(),
            connect_timeout_ms: config.timeout.as_millis(),
        };

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Human => {
                let mut output = String::new();
                let _ = writeln!(output, "Address: {}", report.address);
                let _ = writeln!(output, "BSP socket: {}", report.bsp_socket.display());
                let _ = writeln!(output, "Version: {}", report.version);
                let _ = writeln!(output, "JVM options: {}", report.jvm_options.join(" "));
                if let Some(home) = report.java_home {
                    let _ = writeln!(output, "Java home: {}", home.display());
                }
                let _ = write!(
                    output,
                    "Retry: every {}ms for {}ms",
                    report.retry_period_ms, report.connect_timeout_ms
                );
                output
            }
        }
    }

    pub fn format_reconcile(&self, outcome: ReconcileOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({ "outcome": outcome }).to_string(),
            OutputFormat::Human => match outcome {
                ReconcileOutcome::Unchanged => "No restart needed".to_string(),
                ReconcileOutcome::Declined => "Restart skipped".to_string(),
                ReconcileOutcome::Reconnected => "Build server restarted".to_string(),
            },
        }
    }
}
