//! Applying generation events to the view.

use wf_api_types::{
    CompletedPayload, ContentStatus, FailedPayload, GenerationEvent, HumanReviewPayload,
    LogLevel, ProgressPayload, StatusPayload, TaskStatus,
};
use wf_core::concept::ConceptStatusPatch;
use wf_core::view_state::{BatchProgress, ReviewRequest, TaskPatch};

use super::{Channel, FinalSource, Reconciler};

/// Steps that change the shape of the roadmap tree.
const STRUCTURAL_STEPS: &[&str] = &["curriculum_design", "roadmap_edit"];

impl Reconciler {
    pub(super) fn apply_event(&mut self, event: GenerationEvent, channel: Channel) {
        tracing::debug!(event = event.kind(), ?channel, "event");
        match event {
            GenerationEvent::Connected { message, .. } => {
                tracing::debug!(?message, "server acknowledged subscription");
            }
            GenerationEvent::Status(payload) => self.on_status(payload, channel),
            GenerationEvent::Progress(payload) => self.on_progress(payload, channel),
            GenerationEvent::ConceptStart(p) => {
                self.store.update(|s| {
                    s.set_concept_status(
                        &p.concept_id,
                        ConceptStatusPatch::single(p.content_type, ContentStatus::Generating),
                    )
                });
            }
            GenerationEvent::ConceptComplete(p) => {
                self.store.update(|s| {
                    s.set_concept_status(
                        &p.concept_id,
                        ConceptStatusPatch::single(p.content_type, ContentStatus::Completed),
                    )
                });
                self.request_roadmap();
            }
            GenerationEvent::ConceptFailed(p) => {
                self.store.update(|s| {
                    s.set_concept_status(
                        &p.concept_id,
                        ConceptStatusPatch::single(p.content_type, ContentStatus::Failed),
                    )
                });
                self.note(
                    LogLevel::Error,
                    "concept",
                    None,
                    format!(
                        "{} {} failed: {}",
                        display_name(&p.concept_name, &p.concept_id),
                        p.content_type,
                        p.error
                    ),
                );
                self.request_roadmap();
            }
            GenerationEvent::BatchStart(p) => {
                self.store.update(|s| {
                    s.batch = Some(BatchProgress {
                        batch_index: p.batch_index,
                        total_batches: p.total_batches,
                        completed: 0,
                        failed: 0,
                    })
                });
            }
            GenerationEvent::BatchComplete(p) => {
                self.store.update(|s| {
                    s.batch = Some(BatchProgress {
                        batch_index: p.batch_index,
                        total_batches: p.total_batches,
                        completed: p.completed,
                        failed: p.failed,
                    })
                });
            }
            GenerationEvent::HumanReview(payload) => {
                if channel == Channel::Primary {
                    self.on_human_review(payload);
                }
            }
            GenerationEvent::Completed(payload) => self.on_completed(payload, channel),
            GenerationEvent::Failed(payload) => self.on_failed(payload, channel),
            GenerationEvent::Error { message } => {
                // Reported by the socket server; the task itself is unaffected.
                tracing::warn!(error = %message, "event channel reported an error");
                self.note(
                    LogLevel::Warning,
                    "connection",
                    None,
                    format!("event channel error: {message}"),
                );
            }
            GenerationEvent::Closing { reason } => {
                tracing::info!(?reason, "server is closing the event channel");
            }
            GenerationEvent::Unknown => {}
        }
    }

    fn on_status(&mut self, payload: StatusPayload, channel: Channel) {
        if channel == Channel::Retry {
            if payload.status.is_terminal() {
                self.finish_retry();
            }
            return;
        }

        let terminal = payload.status.is_terminal();
        if terminal && self.finalized {
            tracing::debug!(status = %payload.status, "terminal status after finalization ignored");
            return;
        }
        let step = payload.current_step.clone();
        self.store.update(|s| {
            s.patch_task_info(TaskPatch {
                status: Some(payload.status),
                current_step: payload.current_step,
                roadmap_id: payload.roadmap_id,
                error_message: payload.error_message,
            })
        });

        if terminal {
            self.finalize(FinalSource::Event);
            return;
        }
        let step = step.or_else(|| self.store.read(|s| s.current_step().map(str::to_string)));
        if let Some(step) = step {
            self.structural_refresh(&step);
        }
    }

    fn on_progress(&mut self, payload: ProgressPayload, channel: Channel) {
        let message = payload
            .message
            .clone()
            .unwrap_or_else(|| format!("{}: {}", payload.step, payload.status));
        self.note(LogLevel::Info, "workflow", Some(&payload.step), message);

        if channel == Channel::Retry {
            return;
        }
        self.store.update(|s| {
            s.patch_task_info(TaskPatch {
                current_step: Some(payload.step.clone()),
                roadmap_id: payload.roadmap_id.clone(),
                ..TaskPatch::default()
            })
        });
        if payload.is_step_completed() {
            self.structural_refresh(&payload.step);
        }
    }

    fn on_human_review(&mut self, payload: HumanReviewPayload) {
        tracing::info!(roadmap_id = ?payload.roadmap_id, "roadmap awaiting review");
        self.store.update(|s| {
            s.review = Some(ReviewRequest {
                roadmap_id: payload.roadmap_id.clone(),
                message: payload.message.clone(),
            });
            s.patch_task_info(TaskPatch {
                status: Some(TaskStatus::HumanReviewPending),
                roadmap_id: payload.roadmap_id.clone(),
                ..TaskPatch::default()
            });
        });
        self.request_roadmap();
    }

    fn on_completed(&mut self, payload: CompletedPayload, channel: Channel) {
        if channel == Channel::Retry {
            self.finish_retry();
            return;
        }
        if self.finalized {
            tracing::debug!("duplicate completion ignored");
            return;
        }
        let status = payload.final_status();
        self.store.update(|s| {
            s.patch_task_info(TaskPatch {
                status: Some(status),
                roadmap_id: payload.roadmap_id,
                ..TaskPatch::default()
            });
            if let (Some(task), Some(failed)) = (s.task.as_mut(), payload.failed_concepts) {
                task.failed_concepts = Some(failed);
            }
            s.review = None;
        });
        self.finalize(FinalSource::Event);
    }

    fn on_failed(&mut self, payload: FailedPayload, channel: Channel) {
        if channel == Channel::Retry {
            self.finish_retry();
            return;
        }
        if self.finalized {
            tracing::debug!("duplicate failure ignored");
            return;
        }
        let error = (!payload.error.is_empty()).then(|| payload.error.clone());
        self.store.update(|s| {
            s.patch_task_info(TaskPatch {
                status: Some(TaskStatus::Failed),
                current_step: payload.step.clone(),
                error_message: error.clone(),
                ..TaskPatch::default()
            })
        });
        self.note(
            LogLevel::Error,
            "workflow",
            payload.step.as_deref(),
            format!("generation failed: {}", error.as_deref().unwrap_or("unknown error")),
        );
        self.finalize(FinalSource::Event);
    }

    /// Re-read the tree once per (roadmap, structural step) transition.
    fn structural_refresh(&mut self, step: &str) {
        if !STRUCTURAL_STEPS.contains(&step) {
            return;
        }
        let Some(roadmap_id) = self.roadmap_id() else {
            return;
        };
        if self
            .structural_seen
            .insert((roadmap_id.clone(), step.to_string()))
        {
            tracing::debug!(%roadmap_id, step, "roadmap structure changed");
            self.request_roadmap();
        }
    }
}

fn display_name<'a>(name: &'a str, id: &'a str) -> &'a str {
    if name.is_empty() {
        id
    } else {
        name
    }
}
