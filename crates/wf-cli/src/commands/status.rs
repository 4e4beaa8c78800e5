use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;
use crate::render;

/// Run the `status` subcommand: print the task header and, when the task
/// has produced one, a roadmap summary.
pub async fn run(api: &HttpTaskApi, task_id: &str) -> anyhow::Result<()> {
    let task = api.get_task(task_id).await.map_err(friendly_error)?;
    print!("{}", render::task_summary(&task));

    if let Some(roadmap_id) = task.roadmap_id.as_deref() {
        match api.get_roadmap(roadmap_id).await {
            Ok(roadmap) => println!("Progress:     {}", render::roadmap_progress(&roadmap)),
            Err(e) => tracing::warn!(error = %e, roadmap_id, "roadmap unavailable"),
        }
    }

    Ok(())
}
