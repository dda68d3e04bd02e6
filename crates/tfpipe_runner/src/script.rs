//! Shell script assembly for multi-command container runs.
//!
//! All setup steps and task commands of one run execute in a single container
//! through `/bin/sh -c`. Before each step the script echoes a marker line to
//! both streams, which is how the last command's stdout and the failing step
//! are recovered afterwards.
//!
//! The marker never appears literally in the script text: the echo splits it
//! into two adjacent shell words. A runtime that echoes the script back (a dry
//! run, an error message quoting the command) therefore produces no markers.

use once_cell::sync::Lazy;
use regex::Regex;
use tfpipe_core::CommandLine;

use crate::config::SetupStep;

/// Prefix of the line written before each step.
pub const STEP_MARKER: &str = "##tfpipe-step";

static MARKER_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(&format!(r"{} (\d+)\n?", STEP_MARKER)).ok());

/// Shell line printing the marker of step `index` to stdout and stderr.
fn marker_echo(index: usize) -> String {
    let (head, tail) = STEP_MARKER.split_at(2);
    let word = format!("'{}''{} {}'", head, tail, index);
    format!("echo {word}; echo {word} >&2\n", word = word)
}

/// Whether `script` was produced by [`Script::render`].
pub fn is_rendered_script(script: &str) -> bool {
    script.lines().any(|line| line.starts_with(marker_echo_prefix().as_str()))
}

fn marker_echo_prefix() -> String {
    let (head, tail) = STEP_MARKER.split_at(2);
    format!("echo '{}''{} ", head, tail)
}

/// Whether a step prepares the environment or belongs to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Setup,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub kind: StepKind,
    pub name: String,
    pub command: CommandLine,
}

/// Where a failed script stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure<'a> {
    pub step: &'a ScriptStep,
    /// Stderr written by the failing step.
    pub stderr: String,
}

/// Ordered setup steps followed by task commands.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    pub fn new(setup: &[SetupStep], commands: &[CommandLine]) -> Self {
        let setup = setup.iter().map(|step| ScriptStep {
            kind: StepKind::Setup,
            name: step.name.clone(),
            command: step.command.clone(),
        });
        let commands = commands.iter().map(|command| ScriptStep {
            kind: StepKind::Command,
            name: command.to_string(),
            command: command.clone(),
        });

        Self {
            steps: setup.chain(commands).collect(),
        }
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the script passed to `/bin/sh -c`.
    pub fn render(&self) -> String {
        let mut script = String::from("set -e\n");
        for (index, step) in self.steps.iter().enumerate() {
            script.push_str(&marker_echo(index));
            script.push_str(&step.command.to_shell());
            script.push('\n');
        }
        script
    }

    /// Stdout written by the last step.
    ///
    /// Falls back to the whole stream when no marker is present, as in a dry
    /// run that only echoes the container command.
    pub fn final_output(&self, stdout: &str) -> String {
        match find_markers(stdout).last() {
            Some(marker) => stdout[marker.end..].to_string(),
            None => strip_markers(stdout),
        }
    }

    /// The step that was running when the script stopped, according to the
    /// markers in `stderr`.
    pub fn failed_step(&self, stderr: &str) -> Option<StepFailure<'_>> {
        let marker = find_markers(stderr).pop()?;
        let step = self.steps.get(marker.index)?;
        Some(StepFailure {
            step,
            stderr: stderr[marker.end..].trim().to_string(),
        })
    }
}

/// Remove every step marker from `text`.
pub fn strip_markers(text: &str) -> String {
    match MARKER_PATTERN.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Shell text of each step in a rendered script.
pub fn rendered_steps(script: &str) -> Vec<String> {
    let prefix = marker_echo_prefix();
    let mut steps: Vec<Vec<&str>> = Vec::new();
    for line in script.lines() {
        if line.starts_with(prefix.as_str()) {
            steps.push(Vec::new());
        } else if let Some(current) = steps.last_mut() {
            current.push(line);
        }
    }
    steps.into_iter().map(|lines| lines.join("\n")).collect()
}

struct Marker {
    index: usize,
    end: usize,
}

fn find_markers(text: &str) -> Vec<Marker> {
    let Some(re) = MARKER_PATTERN.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let index = caps.get(1)?.as_str().parse().ok()?;
            Some(Marker {
                index,
                end: whole.end(),
            })
        })
        .collect()
}
