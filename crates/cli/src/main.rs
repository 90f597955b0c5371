use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use pipeline::{
    catalog::JsonCatalog,
    is_action_enabled,
    session::{Notice, NoticeLevel, ProjectView},
    Action, CommandService, FileId, MediaKind, PipelineConfig, PipelineError, ProjectId,
    SelectionMode, Session,
};

const DEFAULT_CONFIG_PATH: &str = "/etc/mediaflow/config.json";

/// Drive media projects through the processing pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state directory from the configuration
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List projects with their stage and available actions
    Projects,
    /// Create a new project
    NewProject {
        name: String,
        #[arg(long, default_value = "#4a90d9")]
        color: String,
    },
    /// Register a file, optionally assigning it to a project
    AddFile {
        name: String,
        url: String,
        /// video, audio, transcript or text
        #[arg(long)]
        kind: MediaKind,
        #[arg(long)]
        project: Option<String>,
    },
    /// Show a project's files and the latest file per kind
    Files { project: String },
    /// Run a pipeline action (compress, merge, trim, generate-subtitles, add-subtitles)
    Run { project: String, action: Action },
    /// Merge an audio file into a video file, across projects
    Sync { video: FileId, audio: FileId },
    /// Move files to another project
    Reassign {
        project: String,
        #[arg(required = true)]
        files: Vec<FileId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let default_config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let config_path = if let Some(ref path) = args.config {
        Some(path.as_path())
    } else if default_config_path.exists() {
        Some(default_config_path.as_path())
    } else {
        None
    };

    let mut cfg = PipelineConfig::load_config(config_path)
        .context("Failed to load configuration")?;
    if let Some(dir) = args.state_dir {
        cfg.state_dir = dir;
    }
    debug!("Configuration: {:?}", cfg);

    let catalog = Arc::new(
        JsonCatalog::open(&cfg.state_dir)
            .with_context(|| format!("Failed to open state directory: {}", cfg.state_dir.display()))?,
    );
    let service = Arc::new(CommandService::from_config(&cfg));
    let session = Session::new(&cfg, catalog.clone(), service);

    match args.command {
        Command::Projects => {
            session.load_projects().await?;
            let views = session.projects();
            if views.is_empty() {
                println!("No projects found");
            }
            for view in views {
                print_project(&view);
            }
        }
        Command::NewProject { name, color } => {
            let project = catalog.create_project(&name, &color)?;
            println!("{}", project.id);
        }
        Command::AddFile { name, url, kind, project } => {
            let project = project.map(ProjectId);
            let file = catalog.add_file(&name, &url, kind, project.clone())?;
            if let Some(id) = project {
                session.notify_files_changed(&id).await?;
            }
            println!("{}", file.id);
        }
        Command::Files { project } => {
            let view = session.load_project(&ProjectId(project)).await?;
            print_project(&view);
            for file in &view.files {
                println!(
                    "  #{:<6} {:<10} {}  {}",
                    file.id,
                    file.kind,
                    file.created_at.format("%Y-%m-%d %H:%M"),
                    file.name
                );
            }
            for kind in MediaKind::ALL {
                if let Some(file) = view.latest.get(kind) {
                    println!("  latest {}: #{} {}", kind, file.id, file.name);
                }
            }
        }
        Command::Run { project, action } => {
            let id = ProjectId(project);
            session.load_project(&id).await?;
            info!("Running {} on project {}", action, id);
            let result = session.perform_action(&id, action).await;
            report(result.as_ref().map(|o| o.notice()).map_err(PipelineError::notice))?;
        }
        Command::Sync { video, audio } => {
            session.enter_mode(SelectionMode::Sync);
            session.toggle_file(video).await?;
            session.toggle_file(audio).await?;
            let result = session.perform_sync().await;
            session.exit_mode();
            report(
                result
                    .as_ref()
                    .map(|t| Notice::success(format!("Sync scheduled (job {})", t.id)))
                    .map_err(PipelineError::notice),
            )?;
        }
        Command::Reassign { project, files } => {
            let target = ProjectId(project);
            session.enter_mode(SelectionMode::BulkReassign);
            for file in files {
                session.toggle_file(file).await?;
            }
            let result = session.perform_bulk_reassign(&target).await;
            session.exit_mode();
            report(
                result
                    .as_ref()
                    .map(|n| Notice::success(format!("Moved {} file(s) to {}", n, target)))
                    .map_err(PipelineError::notice),
            )?;
        }
    }

    Ok(())
}

fn print_project(view: &ProjectView) {
    let project = &view.project;
    let actions: Vec<String> = Action::ALL
        .iter()
        .map(|a| {
            if is_action_enabled(project.stage, *a) {
                a.to_string()
            } else {
                format!("({})", a)
            }
        })
        .collect();
    let stage = if project.stage.is_terminal() {
        format!("{} (done)", project.stage)
    } else {
        project.stage.to_string()
    };
    println!(
        "{}  {:<24} {:<20} {} file(s)  [{}]",
        project.id,
        project.name,
        stage,
        view.files.len(),
        actions.join(" ")
    );
}

/// Print a notice and turn failures into a non-zero exit
fn report(result: Result<Notice, Notice>) -> Result<()> {
    match result {
        Ok(notice) => {
            println!("{}", notice);
            Ok(())
        }
        Err(notice) => {
            let prefix = match notice.level {
                NoticeLevel::Warning => "warning",
                _ => "error",
            };
            anyhow::bail!("{}: {}", prefix, notice)
        }
    }
}
