//! Ready-made wire values.

use chrono::{Duration, TimeZone, Utc};
use wf_api_types::{
    CompletedPayload, Concept, ConceptPayload, ContentKind, ContentStatus, ExecutionLog,
    GenerationEvent, LogLevel, Module, RoadmapFramework, Stage, StatusPayload, Task, TaskStatus,
};

pub fn task(task_id: &str, status: TaskStatus, step: Option<&str>) -> Task {
    let mut task = Task::new(task_id, status);
    task.current_step = step.map(str::to_string);
    task
}

pub fn task_with_roadmap(
    task_id: &str,
    status: TaskStatus,
    step: Option<&str>,
    roadmap_id: &str,
) -> Task {
    let mut task = task(task_id, status, step);
    task.roadmap_id = Some(roadmap_id.to_string());
    task
}

/// A one-stage, one-module roadmap whose concepts all carry `status`.
pub fn roadmap(roadmap_id: &str, concept_ids: &[&str], status: ContentStatus) -> RoadmapFramework {
    RoadmapFramework {
        roadmap_id: roadmap_id.to_string(),
        title: "Learning path".into(),
        stages: vec![Stage {
            stage_id: "stage-1".into(),
            name: "Foundations".into(),
            modules: vec![Module {
                module_id: "module-1".into(),
                name: "Core".into(),
                concepts: concept_ids
                    .iter()
                    .map(|id| Concept {
                        concept_id: (*id).to_string(),
                        name: format!("Concept {id}"),
                        description: String::new(),
                        estimated_hours: 2.0,
                        content_status: status,
                        resources_status: status,
                        quiz_status: status,
                    })
                    .collect(),
            }],
        }],
    }
}

/// Server-side log entry `secs` seconds after a fixed epoch.
pub fn log_entry(id: &str, step: Option<&str>, secs: i64) -> ExecutionLog {
    ExecutionLog {
        id: id.to_string(),
        task_id: "task-1".into(),
        level: LogLevel::Info,
        category: "workflow".into(),
        step: step.map(str::to_string),
        agent_name: None,
        message: format!("log {id}"),
        details: serde_json::Value::Null,
        duration_ms: None,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs),
    }
}

pub fn status_event(status: TaskStatus, step: Option<&str>, roadmap_id: Option<&str>) -> GenerationEvent {
    GenerationEvent::Status(StatusPayload {
        status,
        current_step: step.map(str::to_string),
        roadmap_id: roadmap_id.map(str::to_string),
        error_message: None,
    })
}

pub fn concept_start(concept_id: &str, kind: ContentKind) -> GenerationEvent {
    GenerationEvent::ConceptStart(concept_payload(concept_id, kind))
}

pub fn concept_complete(concept_id: &str, kind: ContentKind) -> GenerationEvent {
    GenerationEvent::ConceptComplete(concept_payload(concept_id, kind))
}

pub fn completed(roadmap_id: &str) -> GenerationEvent {
    GenerationEvent::Completed(CompletedPayload {
        roadmap_id: Some(roadmap_id.to_string()),
        ..CompletedPayload::default()
    })
}

fn concept_payload(concept_id: &str, kind: ContentKind) -> ConceptPayload {
    ConceptPayload {
        concept_id: concept_id.to_string(),
        concept_name: format!("Concept {concept_id}"),
        content_type: kind,
    }
}
