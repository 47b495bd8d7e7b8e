use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedream_edit::gate::{format_remaining, MAX_ATTEMPTS};
use seedream_edit::machine::parse_result;
use seedream_edit::{
    ClientConfig, FileGateStore, GateOutcome, ImageResolution, ImageSize, JobApi, JobClient,
    Phase, PinGate, RemoteState, SubmissionRequest, TaskController,
};

#[derive(Parser, Debug)]
#[command(
    name = "seedream-edit",
    version,
    about = "Edit images with Seedream V4 through the kie.ai job API"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an edit and wait for the result.
    Generate(GenerateArgs),
    /// Query a task once and print its record.
    Status(StatusArgs),
    /// Clear the stored gate session.
    Logout,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Edit instruction.
    #[arg(long)]
    prompt: String,

    /// Public URL of the reference image.
    #[arg(long, conflicts_with = "image_file", required_unless_present = "image_file")]
    image_url: Option<String>,

    /// Local JPG, PNG, or WEBP file, uploaded before submission.
    #[arg(long)]
    image_file: Option<PathBuf>,

    #[arg(long, default_value_t = ImageSize::default())]
    size: ImageSize,

    #[arg(long, default_value_t = ImageResolution::default())]
    resolution: ImageResolution,

    /// Number of images, 1 to 6.
    #[arg(long, default_value_t = 1)]
    count: u8,

    /// Seed; anything without a leading integer means random.
    #[arg(long)]
    seed: Option<String>,

    /// Directory to download results into.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Gate PIN, when SEEDREAM_PIN is configured.
    #[arg(long)]
    pin: Option<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    task_id: String,

    #[arg(long)]
    pin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seedream_edit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    match cli.command {
        Command::Generate(args) => {
            check_gate(&config, args.pin.as_deref())?;
            generate(&config, args).await
        }
        Command::Status(args) => {
            check_gate(&config, args.pin.as_deref())?;
            status(&config, &args.task_id).await
        }
        Command::Logout => {
            PinGate::new(FileGateStore::default_location(), "").logout()?;
            println!("Logged out.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check_gate(config: &ClientConfig, pin: Option<&str>) -> anyhow::Result<()> {
    let Some(expected) = config.gate_pin.as_deref() else {
        return Ok(());
    };
    let gate = PinGate::new(FileGateStore::default_location(), expected);
    if gate.is_authenticated()? {
        return Ok(());
    }

    let Some(pin) = pin else {
        bail!("A passcode is required. Pass it with --pin.");
    };
    match gate.enter(pin, Utc::now())? {
        GateOutcome::Granted => Ok(()),
        GateOutcome::Rejected { remaining_attempts } => bail!(
            "Incorrect passcode. {} of {} attempts remaining.",
            remaining_attempts,
            MAX_ATTEMPTS
        ),
        GateOutcome::LockedOut { remaining } | GateOutcome::Locked { remaining } => bail!(
            "Too many failed attempts. Try again in {}.",
            format_remaining(remaining)
        ),
        GateOutcome::Incomplete => bail!("The passcode must be 4 digits."),
    }
}

async fn generate(config: &ClientConfig, args: GenerateArgs) -> anyhow::Result<ExitCode> {
    let client = JobClient::from_config(config);
    let controller = TaskController::from_config(client.clone(), config);

    let image_url = match (args.image_url, args.image_file) {
        (Some(url), _) => url,
        (None, Some(path)) => match upload(config, &path).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Upload failed");
                controller.report_upload_error(e.to_string());
                String::new()
            }
        },
        (None, None) => String::new(),
    };

    let mut request = SubmissionRequest::new(args.prompt, image_url)
        .size(args.size)
        .resolution(args.resolution)
        .max_images(args.count);
    if let Some(seed) = args.seed.as_deref() {
        request = request.seed_text(seed);
    }

    let mut updates = controller.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let message = updates.borrow_and_update().message.clone();
            if !message.is_empty() && message != last {
                tracing::info!("{}", message);
            }
            last = message;
        }
    });

    let submitted = controller.submit(request).await;
    let done = if submitted.phase == Phase::Waiting {
        tokio::select! {
            done = controller.wait_for_terminal() => done,
            _ = tokio::signal::ctrl_c() => {
                controller.dispose();
                watcher.abort();
                tracing::warn!("Interrupted; polling stopped");
                return Ok(ExitCode::from(130));
            }
        }
    } else {
        submitted
    };
    controller.dispose();
    watcher.abort();

    match done.phase {
        Phase::Success => {
            if done.images.is_empty() {
                println!("Task finished without images.");
            }
            for url in &done.images {
                println!("{}", url);
            }
            if let Some(dir) = args.out.as_deref() {
                download_all(&client, &done.images, dir).await?;
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            let message = done
                .failure
                .map(|f| f.message)
                .unwrap_or_else(|| "Task did not complete.".into());
            eprintln!("Error: {}", message);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn upload(config: &ClientConfig, path: &Path) -> anyhow::Result<String> {
    let Some(key) = config.upload_api_key.as_deref() else {
        bail!("IMGBB_API_KEY is not set; local files cannot be uploaded.");
    };
    let url = seedream_edit::ImgbbUploader::new(key)
        .upload_file(path)
        .await?;
    tracing::info!(url = %url, "Reference image uploaded");
    Ok(url)
}

async fn download_all(client: &JobClient, urls: &[String], dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Cannot create {}", dir.display()))?;
    for (index, url) in urls.iter().enumerate() {
        let bytes = client.download(url).await?;
        let path = dir.join(format!("generated-image-{}.png", index + 1));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Cannot write {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn status(config: &ClientConfig, task_id: &str) -> anyhow::Result<ExitCode> {
    let client = JobClient::from_config(config);
    let record = client.task_status(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    match record.state {
        RemoteState::Success => match parse_result(record.result_json.as_deref()) {
            Ok(urls) => {
                for url in urls {
                    println!("{}", url);
                }
            }
            Err(e) => tracing::warn!(task_id, error = %e, "Result data is not valid JSON"),
        },
        RemoteState::Fail => return Ok(ExitCode::FAILURE),
        _ => {}
    }
    Ok(ExitCode::SUCCESS)
}
