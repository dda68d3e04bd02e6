//! Text and JSON rendering of run results.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tfpipe_core::TaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub label: String,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Outcome of every task of one action.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub action: String,
    pub passed: usize,
    pub failed: usize,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskSummary>,
}

impl RunSummary {
    /// Build from results; tasks are sorted by label for stable output.
    pub fn from_results(action: &str, results: &[TaskResult]) -> Self {
        let mut tasks: Vec<TaskSummary> = results
            .iter()
            .map(|r| TaskSummary {
                label: r.label.clone(),
                success: r.is_success(),
                output: r.output.clone(),
                error: r.error.as_ref().map(|e| e.to_string()),
                cancelled: r.error.as_ref().is_some_and(|e| e.is_cancelled()),
                duration_ms: r.duration.as_millis() as u64,
            })
            .collect();
        tasks.sort_by(|a, b| a.label.cmp(&b.label));

        let passed = tasks.iter().filter(|t| t.success).count();
        Self {
            action: action.to_string(),
            passed,
            failed: tasks.len() - passed,
            finished_at: Utc::now(),
            tasks,
        }
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn any_cancelled(&self) -> bool {
        self.tasks.iter().any(|t| t.cancelled)
    }

    pub fn render_text(&self, verbose: bool) -> String {
        let mut out = String::new();
        for task in &self.tasks {
            let mark = if task.success { "✅" } else { "❌" };
            out.push_str(&format!("{} {} ({}ms)\n", mark, task.label, task.duration_ms));
            if let Some(error) = &task.error {
                out.push_str(&format!("   {}\n", error));
            }
            if verbose && !task.output.trim().is_empty() {
                for line in task.output.trim_end().lines() {
                    out.push_str(&format!("   | {}\n", line));
                }
            }
        }
        out.push_str(&format!(
            "\n{}: {}/{} passed\n",
            self.action,
            self.passed,
            self.total()
        ));
        out
    }
}

/// Output of a single-command action.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub action: String,
    pub output: String,
}

pub fn print_summary(summary: &RunSummary, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", summary.render_text(verbose)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
    }
    Ok(())
}

pub fn print_output(action: &str, output: &str, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", output);
            if !output.ends_with('\n') {
                println!();
            }
        }
        OutputFormat::Json => {
            let value = CommandOutput {
                action: action.to_string(),
                output: output.to_string(),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tfpipe_core::{EnvironmentError, TaskError};

    fn results() -> Vec<TaskResult> {
        vec![
            TaskResult::success("1.12.0.validate", "Success!\n", Duration::from_millis(20)),
            TaskResult::failure(
                "1.12.0.fmt-check",
                TaskError::from_environment(
                    "1.12.0.fmt-check",
                    EnvironmentError::Command {
                        command: tfpipe_core::CommandLine::terraform(["fmt", "-check"]),
                        exit_code: Some(3),
                        message: "main.tf".into(),
                    },
                ),
                Duration::from_millis(5),
            ),
            TaskResult::failure(
                "1.12.0.init",
                TaskError::from_environment("1.12.0.init", EnvironmentError::Cancelled),
                Duration::from_millis(1),
            ),
        ]
    }

    #[test]
    fn test_summary_counts_and_order() {
        let summary = RunSummary::from_results("static-check", &results());
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.any_cancelled());
        let labels: Vec<&str> = summary.tasks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["1.12.0.fmt-check", "1.12.0.init", "1.12.0.validate"]);
    }

    #[test]
    fn test_text_rendering() {
        let text = RunSummary::from_results("static-check", &results()).render_text(true);
        assert!(text.contains("❌ 1.12.0.fmt-check"));
        assert!(text.contains("   | Success!"));
        assert!(text.ends_with("static-check: 1/3 passed\n"));
    }

    #[test]
    fn test_json_rendering() {
        let summary = RunSummary::from_results("compat", &results());
        let value: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["action"], "compat");
        assert_eq!(value["tasks"].as_array().unwrap().len(), 3);
        assert!(value["tasks"][2].get("error").is_none());
        assert_eq!(value["tasks"][1]["cancelled"], true);
    }
}
