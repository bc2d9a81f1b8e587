//! OpenTube command line
//!
//! Drives the media services directly against the configured database and
//! artifact store. Configuration comes from the environment (see `.env`).

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use opentube_core::constants::MAX_UPLOAD_BYTES;
use opentube_core::models::{VideoEdit, VideoUpload, Visibility};
use opentube_core::{AppError, Config, ErrorResponse};
use opentube_services::{
    init_telemetry, log_error, setup_services, ThumbnailUpload, VideoSource,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "opentube", about = "OpenTube media pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending catalog migrations
    Migrate,
    /// Transcode a video into a DASH package and publish it
    Upload {
        /// Path to the source video
        file: PathBuf,
        #[arg(long)]
        owner: Uuid,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "public")]
        visibility: Visibility,
        /// Image to use instead of a frame from the middle of the video
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Store a standalone image
    Image {
        file: PathBuf,
        #[arg(long)]
        owner: Uuid,
        #[arg(long, default_value = "public")]
        visibility: Visibility,
    },
    /// Fetch a manifest or segment of a video
    Segment {
        video_id: String,
        filename: String,
        /// Identity to read as; anonymous when absent
        #[arg(long)]
        caller: Option<Uuid>,
        /// Write the bytes here instead of printing a summary
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show a video's metadata
    Show {
        video_id: String,
        #[arg(long)]
        caller: Option<Uuid>,
    },
    /// List visible videos, newest first
    List {
        #[arg(long)]
        owner: Option<Uuid>,
        #[arg(long)]
        caller: Option<Uuid>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "20")]
        page_size: i64,
    },
    /// Edit a video you own
    Edit {
        video_id: String,
        #[arg(long)]
        owner: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        visibility: Option<Visibility>,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Delete a video you own
    Delete {
        video_id: String,
        #[arg(long)]
        owner: Uuid,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn read_thumbnail(path: Option<PathBuf>) -> anyhow::Result<Option<ThumbnailUpload>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read thumbnail {}", path.display()))?;
    Ok(Some(ThumbnailUpload::new(data, file_name(&path))))
}

fn check_upload_size(size: u64) -> Result<(), AppError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "Upload is {} bytes; the limit is {} bytes",
            size, MAX_UPLOAD_BYTES
        )));
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, canceling");
            token.cancel();
        }
    });
}

/// Conventional exit status for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Turn a command failure into the JSON body printed on stderr.
fn error_report(err: &anyhow::Error, production: bool) -> ErrorResponse {
    match err.downcast_ref::<AppError>() {
        Some(app) => app.to_response(production),
        None => ErrorResponse::new(format!("{:#}", err), "CLI_ERROR"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_telemetry(config.log_format) {
        eprintln!("Failed to initialize tracing: {}", e);
        return ExitCode::FAILURE;
    }

    let Err(err) = run(cli.command, &config).await else {
        return ExitCode::SUCCESS;
    };

    let app_error = err.downcast_ref::<AppError>();
    if let Some(app) = app_error {
        log_error(app, "Command failed");
    }
    match serde_json::to_string_pretty(&error_report(&err, config.is_production())) {
        Ok(body) => eprintln!("{}", body),
        Err(_) => eprintln!("{:#}", err),
    }

    if app_error.is_some_and(AppError::is_canceled) {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    if let Commands::Migrate = command {
        let pool = opentube_db::connect(config).await?;
        opentube_db::run_migrations(&pool).await?;
        print_json(&serde_json::json!({ "success": true, "message": "Migrations applied" }))?;
        return Ok(());
    }

    let services = setup_services(config).await?;

    match command {
        Commands::Migrate => {}
        Commands::Upload {
            file,
            owner,
            title,
            description,
            visibility,
            thumbnail,
        } => {
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let size = reader
                .metadata()
                .await
                .with_context(|| format!("Failed to stat {}", file.display()))?
                .len();
            check_upload_size(size)?;
            let thumbnail = read_thumbnail(thumbnail).await?;

            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let response = services
                .uploads
                .upload(
                    owner,
                    VideoUpload {
                        title,
                        description,
                        visibility,
                    },
                    VideoSource::new(reader, file_name(&file)),
                    thumbnail,
                    &cancel,
                )
                .await?;
            print_json(&response)?;
        }
        Commands::Image {
            file,
            owner,
            visibility,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let stored = services
                .images
                .store_image(owner, Bytes::from(data), &file_name(&file), visibility)
                .await?;
            print_json(&stored)?;
        }
        Commands::Segment {
            video_id,
            filename,
            caller,
            out,
        } => {
            let content = services
                .cdn
                .get_video_segment(&video_id, &filename, caller)
                .await?;
            if let Some(out) = out {
                tokio::fs::write(&out, &content.data)
                    .await
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            print_json(&serde_json::json!({
                "content_type": content.content_type,
                "size_bytes": content.data.len(),
            }))?;
        }
        Commands::Show { video_id, caller } => {
            let video = services.cdn.get_video(&video_id, caller).await?;
            print_json(&video)?;
        }
        Commands::List {
            owner,
            caller,
            page,
            page_size,
        } => {
            let page = services
                .cdn
                .list_videos(owner, caller, page, page_size)
                .await?;
            print_json(&page)?;
        }
        Commands::Edit {
            video_id,
            owner,
            title,
            description,
            visibility,
            thumbnail,
        } => {
            let thumbnail = read_thumbnail(thumbnail).await?;
            let video = services
                .videos
                .edit(
                    &video_id,
                    owner,
                    VideoEdit {
                        title,
                        description,
                        visibility,
                    },
                    thumbnail,
                )
                .await?;
            print_json(&video)?;
        }
        Commands::Delete { video_id, owner } => {
            services.videos.delete(&video_id, owner).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("Video {} deleted", video_id) }),
            )?;
        }
    }

    Ok(())
}
