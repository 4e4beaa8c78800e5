//! Plain-text rendering of tasks, logs and view snapshots.

use std::fmt::Write as _;

use wf_api_types::{ExecutionLog, LogLevel, RoadmapFramework, Task};
use wf_core::concept::ConceptAggregate;
use wf_core::time_constraint::parse_time_constraint;
use wf_core::view_state::{ConnectionState, TaskViewState};

pub fn task_summary(task: &Task) -> String {
    let mut out = String::new();
    let title = task.title.as_deref().unwrap_or("(untitled)");
    let _ = writeln!(out, "task {}  {title}", task.task_id);
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "Status:       {}", task.status);
    let _ = writeln!(
        out,
        "Step:         {}",
        task.current_step.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "Roadmap:      {}",
        task.roadmap_id.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "Updated:      {}",
        task.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(err) = &task.error_message {
        let _ = writeln!(out, "Error:        {err}");
    }
    let failed = task.failed_concept_count();
    if failed > 0 {
        let _ = writeln!(out, "Failed:       {failed} concepts");
    }
    out
}

/// Completed / total concepts of a roadmap tree.
pub fn roadmap_progress(roadmap: &RoadmapFramework) -> String {
    let total = roadmap.concepts().count();
    let done = roadmap
        .concepts()
        .filter(|c| {
            [c.content_status, c.resources_status, c.quiz_status]
                .iter()
                .all(|s| *s == wf_api_types::ContentStatus::Completed)
        })
        .count();
    format!(
        "{}  {} stages, {done}/{total} concepts ready",
        roadmap.title,
        roadmap.stages.len()
    )
}

pub fn log_line(entry: &ExecutionLog) -> String {
    let marker = match entry.level {
        LogLevel::Debug => ' ',
        LogLevel::Info => '-',
        LogLevel::Success => '+',
        LogLevel::Warning => '!',
        LogLevel::Error => 'x',
    };
    let step = entry.step.as_deref().unwrap_or("general");
    format!(
        "{} {marker} [{step}] {}",
        entry.created_at.format("%H:%M:%S"),
        entry.message
    )
}

/// One-line status of a live view.
pub fn view_status(view: &TaskViewState) -> String {
    let status = view
        .status()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "loading".to_string());
    let step = view.current_step().unwrap_or("-");
    let channel = match (view.connection, view.polling) {
        (_, true) => "polling",
        (ConnectionState::Connected, _) => "live",
        (ConnectionState::Connecting, _) => "connecting",
        (ConnectionState::Disconnected, _) => "offline",
    };
    let mut line = format!("{status} | step {step} | {channel}");
    if !view.concepts.is_empty() {
        let done = view
            .concepts
            .values()
            .filter(|c| c.aggregate() == ConceptAggregate::Completed)
            .count();
        let _ = write!(line, " | {done}/{} concepts", view.concepts.len());
    }
    if let Some(batch) = view.batch {
        let _ = write!(
            line,
            " | batch {}/{}",
            batch.batch_index + 1,
            batch.total_batches
        );
    }
    line
}

/// Closing report once a watched task is finished.
pub fn final_report(view: &TaskViewState) -> String {
    let mut out = String::new();
    if let Some(task) = &view.task {
        out.push_str(&task_summary(task));
    }
    if let Some(roadmap) = &view.roadmap {
        let _ = writeln!(out, "Roadmap:      {}", roadmap_progress(roadmap));
    }
    let failed = view.failed_concept_ids();
    if !failed.is_empty() {
        let _ = writeln!(out, "Needs retry:  {}", failed.join(", "));
    }
    out
}

pub fn time_plan(text: &str) -> String {
    let plan = parse_time_constraint(text);
    format!(
        "{} weeks, {} hours per week ({} hours total)",
        plan.weeks,
        plan.hours_per_week,
        plan.weeks * plan.hours_per_week
    )
}

#[cfg(test)]
mod tests {
    use wf_api_types::{ContentKind, ContentStatus, TaskStatus};
    use wf_core::concept::ConceptStatusPatch;

    use super::*;

    #[test]
    fn view_status_line() {
        let mut view = TaskViewState::for_task("t-1", 10);
        assert_eq!(view_status(&view), "loading | step - | offline");

        let mut task = Task::new("t-1", TaskStatus::Processing);
        task.current_step = Some("content_generation".into());
        view.set_task_info(task);
        view.connection = ConnectionState::Connected;
        for kind in [ContentKind::Tutorial, ContentKind::Resources, ContentKind::Quiz] {
            view.set_concept_status("c-1", ConceptStatusPatch::single(kind, ContentStatus::Completed));
        }
        view.set_concept_status(
            "c-2",
            ConceptStatusPatch::single(ContentKind::Quiz, ContentStatus::Generating),
        );
        assert_eq!(
            view_status(&view),
            "processing | step content_generation | live | 1/2 concepts"
        );

        view.polling = true;
        assert!(view_status(&view).contains("| polling"));
    }

    #[test]
    fn summary_mentions_failures() {
        let mut task = Task::new("t-9", TaskStatus::PartialFailure);
        task.failed_concepts = Some(wf_api_types::FailedConcepts {
            count: 3,
            concept_ids: vec![],
        });
        let text = task_summary(&task);
        assert!(text.contains("partial_failure"));
        assert!(text.contains("Failed:       3 concepts"));
    }

    #[test]
    fn time_plan_text() {
        assert_eq!(
            time_plan("每周 10 小时，建议 8-10 个月完成转型"),
            "36 weeks, 10 hours per week (360 hours total)"
        );
    }
}
