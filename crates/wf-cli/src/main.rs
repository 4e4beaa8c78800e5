mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wf_core::config::Config;
use wf_telemetry::logging::{self, LogFormat};

/// wayfinder CLI -- follow learning-roadmap generation tasks.
#[derive(Parser)]
#[command(name = "wf", version, about)]
struct Cli {
    /// Backend base URL (overrides the config file and WF_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Config file to use instead of ~/.wayfinder/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a task live until it finishes.
    Watch {
        #[arg(required_unless_present = "url")]
        task_id: Option<String>,
        /// Roadmap id, when already known.
        #[arg(long)]
        roadmap_id: Option<String>,
        /// Resume from a page URL carrying `task_id` / `generating`.
        #[arg(long, conflicts_with = "task_id")]
        url: Option<url::Url>,
    },

    /// Print the current state of a task.
    Status { task_id: String },

    /// Print the execution log of a task.
    Logs {
        task_id: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Start a new roadmap generation.
    Generate {
        /// The learning request as a JSON object.
        #[arg(long)]
        request: String,
        /// Requesting user (defaults to `api.user_id`).
        #[arg(long)]
        user_id: Option<String>,
        /// Follow the new task once it is accepted.
        #[arg(long)]
        watch: bool,
    },

    /// Cancel a running task.
    Cancel { task_id: String },

    /// Approve (or send back) a roadmap awaiting review.
    Approve {
        task_id: String,
        /// Reject instead of approving.
        #[arg(long)]
        reject: bool,
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Regenerate the failed concepts of a roadmap.
    Retry {
        roadmap_id: String,
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Show how a time-constraint phrase is interpreted.
    ParseTime { text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::from_config(&config.general.log_format)
    };
    logging::init(format, "wf", &config.general.log_level);

    match cli.command {
        Commands::Watch {
            task_id,
            roadmap_id,
            url,
        } => {
            let target = match (url, task_id) {
                (Some(url), _) => commands::watch::Target::Url(url),
                (None, Some(task_id)) => commands::watch::Target::Task {
                    task_id,
                    roadmap_id,
                },
                (None, None) => anyhow::bail!("a task id or --url is required"),
            };
            commands::watch::run(&config, target).await?;
        }
        Commands::Status { task_id } => {
            let api = commands::api_client(&config)?;
            commands::status::run(&api, &task_id).await?;
        }
        Commands::Logs {
            task_id,
            category,
            limit,
        } => {
            let api = commands::api_client(&config)?;
            commands::logs::run(&api, &task_id, category, limit).await?;
        }
        Commands::Generate {
            request,
            user_id,
            watch,
        } => {
            let api = commands::api_client(&config)?;
            let user_id = commands::user_id(&config, user_id)?;
            let task_id = commands::generate::run(&api, &user_id, &request).await?;
            if watch {
                let target = commands::watch::Target::Task {
                    task_id,
                    roadmap_id: None,
                };
                commands::watch::run(&config, target).await?;
            }
        }
        Commands::Cancel { task_id } => {
            let api = commands::api_client(&config)?;
            commands::cancel::run(&api, &task_id).await?;
        }
        Commands::Approve {
            task_id,
            reject,
            feedback,
        } => {
            let api = commands::api_client(&config)?;
            commands::approve::run(&api, &task_id, !reject, feedback).await?;
        }
        Commands::Retry {
            roadmap_id,
            user_id,
        } => {
            let api = commands::api_client(&config)?;
            let user_id = commands::user_id(&config, user_id)?;
            commands::retry::run(&api, &roadmap_id, &user_id).await?;
        }
        Commands::ParseTime { text } => {
            println!("{}", render::time_plan(&text));
        }
    }

    Ok(())
}
