use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;

/// Run the `cancel` subcommand.
pub async fn run(api: &HttpTaskApi, task_id: &str) -> anyhow::Result<()> {
    let ack = api.cancel_task(task_id).await.map_err(friendly_error)?;
    match ack.message {
        Some(message) => println!("task {task_id}: {message}"),
        None => println!("task {task_id}: cancellation requested"),
    }
    Ok(())
}
