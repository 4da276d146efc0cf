//! CLI output formatting

use crate::{
    core::{ExecutionStatus, PipelineState, PlannedStep, StepState},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner shown while a readiness wait is outstanding
pub fn create_wait_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// A horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width)
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Waiting { condition, .. } => {
            style(format!("WAITING ({})", condition)).yellow().to_string()
        }
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Stopped => style("STOPPED").yellow().to_string(),
        ExecutionStatus::Aborted => style("ABORTED").red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting {} ({}) with {} steps",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted { index, name } => {
            format!("{} [{}] {}", SPINNER, index + 1, style(name).cyan())
        }
        ExecutionEvent::WaitStarted {
            step,
            description,
            target,
            timeout,
        } => format!(
            "{} {} waiting for {} ({}, up to {})",
            INFO,
            style(step).dim(),
            description,
            target,
            format_duration(*timeout)
        ),
        ExecutionEvent::WaitFinished { step, report } => format!(
            "{} {} ready after {} ({} probes)",
            INFO,
            style(step).dim(),
            format_duration(report.elapsed),
            report.probes
        ),
        ExecutionEvent::StepCompleted { name, .. } => {
            format!("{} {}", CHECK, style(name).green())
        }
        ExecutionEvent::StepFailed { index, name, error } => format!(
            "{} [{}] {}: {}",
            CROSS,
            index + 1,
            style(name).red(),
            style(error).dim()
        ),
        ExecutionEvent::PipelineStopped { step, reason, .. } => format!(
            "{} Stopped at {}: {}",
            WARN,
            style(step).yellow(),
            reason
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Renders runner events to the terminal, with a spinner during waits
#[derive(Default)]
pub struct ProgressRenderer {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        let line = format_execution_event(event);
        let Ok(mut spinner) = self.spinner.lock() else {
            println!("{}", line);
            return;
        };

        match event {
            ExecutionEvent::WaitStarted { description, .. } => {
                println!("{}", line);
                *spinner = Some(create_wait_spinner(description.clone()));
            }
            ExecutionEvent::WaitFinished { .. }
            | ExecutionEvent::StepFailed { .. }
            | ExecutionEvent::PipelineCompleted { .. } => {
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
                println!("{}", line);
            }
            _ => println!("{}", line),
        }
    }
}

/// Format the steps a run would execute
pub fn format_plan(pipeline_name: &str, plan: &[PlannedStep]) -> String {
    let mut out = format!(
        "{} Plan for {} ({} steps)\n",
        INFO,
        style(pipeline_name).bold(),
        plan.len()
    );
    for step in plan {
        out.push_str(&format!(
            "  {:>2}. {}",
            step.index,
            style(&step.name).cyan()
        ));
        if let Some(wait) = &step.readiness {
            out.push_str(&format!(
                "  {}",
                style(format!(
                    "[wait: {} {}, every {}s, up to {}s]",
                    wait.description, wait.target, wait.poll_interval_secs, wait.timeout_secs
                ))
                .dim()
            ));
        }
        out.push('\n');
    }
    out
}

/// One-line summary of a finished run
pub fn format_summary(state: &PipelineState) -> String {
    let elapsed = match (state.started_at, state.completed_at) {
        (Some(start), Some(end)) => (end - start).to_std().ok(),
        _ => None,
    };
    format!(
        "{}/{} steps completed ({:.0}%) - {}{}",
        state.completed_steps(),
        state.steps.len(),
        state.progress() * 100.0,
        format_status(state.status),
        elapsed
            .map(|d| format!(" in {}", format_duration(d)))
            .unwrap_or_default()
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
