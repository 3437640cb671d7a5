// ABOUTME: Command-line entry point for generating tracks and tracking Suno jobs
// ABOUTME: Wires settings, the remote client, the tracker and the persona store together

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use suno_task_tracker::config::Settings;
use suno_task_tracker::persona::{Persona, PersonaStore};
use suno_task_tracker::remote::{Artifact, GenerateRequest, SunoClient};
use suno_task_tracker::tracker::{
    await_completion_with, await_notification, start_listener, JobHandle, JobResult,
    JobStatus, TrackerConfig,
};

/// Sent when polling; the API insists on a callback URL even if nobody listens.
const PLACEHOLDER_CALLBACK_URL: &str = "https://example.invalid/callback";
const LAST_TASK_FILE: &str = "last_task_id.txt";
const LAST_GENERATION_FILE: &str = "last_generation.json";

#[derive(Parser)]
#[command(name = "suno-task-tracker", version, about = "Generate music with the Suno API and track jobs to completion", long_about = None)]
struct Cli {
    /// TOML settings file (defaults to ./suno.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a generation request and wait for the tracks
    Generate(GenerateArgs),
    /// Poll an already submitted task until it finishes
    Wait {
        task_id: String,
        #[command(flatten)]
        timing: TimingArgs,
        /// Directory to download tracks into
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        no_download: bool,
    },
    /// Wait for a single callback notification on a local port
    Listen {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        max_wait: Option<u64>,
    },
    /// Show the current status of a task once
    Status { task_id: String },
    /// Manage saved style presets
    #[command(subcommand)]
    Persona(PersonaCommand),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Poll,
    Callback,
}

#[derive(Args)]
struct TimingArgs {
    /// Seconds between status checks
    #[arg(long)]
    poll_interval: Option<u64>,
    /// Give up after this many seconds
    #[arg(long)]
    max_wait: Option<u64>,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    title: String,
    /// Style description; required unless --persona is given
    #[arg(long)]
    style: Option<String>,
    /// Use a saved persona for style and model
    #[arg(long)]
    persona: Option<String>,
    /// Lyrics or description
    #[arg(long, conflicts_with = "prompt_file")]
    prompt: Option<String>,
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    instrumental: bool,
    #[arg(long)]
    negative_tags: Option<String>,
    #[arg(long, value_enum, default_value = "poll")]
    mode: Mode,
    /// Public URL the service should call back (callback mode derives one if omitted)
    #[arg(long)]
    callback_url: Option<String>,
    /// Listener port for callback mode
    #[arg(long)]
    port: Option<u16>,
    #[command(flatten)]
    timing: TimingArgs,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    no_download: bool,
}

#[derive(Subcommand)]
enum PersonaCommand {
    /// List saved personas
    List,
    /// Show one persona and its style string
    Show { name: String },
    /// Create or replace a persona
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        style: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        bpm: Option<u32>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        vocals: Option<String>,
        /// Repeat for each instrumental element
        #[arg(long = "instrument")]
        instruments: Vec<String>,
        #[arg(long)]
        mixing: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a persona
    Remove { name: String },
    /// Write a persona to its own JSON file
    Export { name: String, path: PathBuf },
    /// Load a persona from a JSON file
    Import { path: PathBuf },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        eprintln!("Log system initialization failed: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Generate(args) => generate(&settings, args).await,
        Command::Wait {
            task_id,
            timing,
            output_dir,
            no_download,
        } => {
            let client = client(&settings)?;
            let handle = JobHandle::new(task_id);
            let config = tracker_config(&settings, &timing);
            let result = poll_with_spinner(&client, &handle, &config).await?;
            let output_dir = output_dir.unwrap_or_else(|| settings.output_dir.clone());
            finish(&client, result, &output_dir, no_download).await
        }
        Command::Listen { port, max_wait } => {
            let listener = start_listener(port.or(settings.tracker.listen_port).unwrap_or(0)).await?;
            println!("Callback URL: {}", listener.callback_url(&settings.callback_host));
            let outcome =
                await_notification(&listener, max_wait.unwrap_or(settings.tracker.max_wait_secs))
                    .await;
            listener.shutdown().await;
            let result = outcome?;
            persist_result(&result, Path::new(LAST_GENERATION_FILE))?;
            let artifacts = result.into_artifacts()?;
            println!("{}", serde_json::to_string_pretty(&artifacts)?);
            Ok(())
        }
        Command::Status { task_id } => {
            let client = client(&settings)?;
            let record = client.get_task_status(&JobHandle::new(task_id.clone())).await?;
            let status = JobStatus::from_remote(record.status.as_deref());
            println!("Task {}: {} ({})", task_id, status, record.status.as_deref().unwrap_or("-"));
            if let Some(err) = &record.error_message {
                println!("Error: {}", err);
            }
            for artifact in record.artifacts() {
                println!("  {} {}", artifact.title.as_deref().unwrap_or("-"), artifact.audio_url);
            }
            Ok(())
        }
        Command::Persona(cmd) => persona(&settings, cmd),
    }
}

fn client(settings: &Settings) -> Result<SunoClient> {
    SunoClient::new(
        settings.base_url.clone(),
        settings.require_api_key()?.to_string(),
    )
}

fn tracker_config(settings: &Settings, timing: &TimingArgs) -> TrackerConfig {
    let mut config = settings.tracker;
    if let Some(interval) = timing.poll_interval {
        config.poll_interval_secs = interval;
    }
    if let Some(max_wait) = timing.max_wait {
        config.max_wait_secs = max_wait;
    }
    config
}

async fn generate(settings: &Settings, args: GenerateArgs) -> Result<()> {
    let client = client(settings)?;

    let mut store = match &args.persona {
        Some(_) => Some(PersonaStore::open(&settings.persona_store)?),
        None => None,
    };
    let persona = match (&store, &args.persona) {
        (Some(store), Some(name)) => Some(
            store
                .get(name)
                .cloned()
                .with_context(|| format!("Persona '{}' not found", name))?,
        ),
        _ => None,
    };

    let style = match (&args.style, &persona) {
        (Some(style), _) => style.clone(),
        (None, Some(p)) => p.style_string(),
        (None, None) => anyhow::bail!("Either --style or --persona is required"),
    };
    let model = args
        .model
        .clone()
        .or_else(|| persona.as_ref().map(|p| p.model.clone()))
        .unwrap_or_else(|| "V4_5PLUS".to_string());
    let prompt = match &args.prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
        None => args.prompt.clone().unwrap_or_default(),
    };

    let mut config = tracker_config(settings, &args.timing);
    if let Some(port) = args.port {
        config.listen_port = Some(port);
    }
    config.validate()?;

    let mut request = GenerateRequest {
        title: args.title.clone(),
        style,
        model,
        custom_mode: true,
        instrumental: args.instrumental,
        negative_tags: args.negative_tags.clone(),
        prompt,
        call_back_url: PLACEHOLDER_CALLBACK_URL.to_string(),
    };

    let result = match args.mode {
        Mode::Poll => {
            if let Some(url) = &args.callback_url {
                request.call_back_url = url.clone();
            }
            let handle = client.submit_job(&request).await?;
            record_submission(&handle, store.as_mut(), args.persona.as_deref())?;
            poll_with_spinner(&client, &handle, &config).await?
        }
        Mode::Callback => {
            // Listen before submitting so an early notification is not lost.
            let listener = start_listener(config.listen_port.unwrap_or(0)).await?;
            request.call_back_url = args
                .callback_url
                .clone()
                .unwrap_or_else(|| listener.callback_url(&settings.callback_host));
            info!("Callback URL: {}", request.call_back_url);

            let handle = client.submit_job(&request).await?;
            record_submission(&handle, store.as_mut(), args.persona.as_deref())?;

            let spinner = spinner(format!("Waiting for callback for task {}", handle));
            let outcome = await_notification(&listener, config.max_wait_secs).await;
            spinner.finish_and_clear();
            listener.shutdown().await;
            outcome?
        }
    };

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| settings.output_dir.clone());
    finish(&client, result, &output_dir, args.no_download).await
}

fn record_submission(
    handle: &JobHandle,
    store: Option<&mut PersonaStore>,
    persona: Option<&str>,
) -> Result<()> {
    std::fs::write(LAST_TASK_FILE, handle.as_str())
        .with_context(|| format!("Failed to write {}", LAST_TASK_FILE))?;
    info!("Task id saved to {}", LAST_TASK_FILE);

    if let (Some(store), Some(name)) = (store, persona) {
        store.update(name, |p| p.add_track(handle.as_str()))?;
    }
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn poll_with_spinner(
    client: &SunoClient,
    handle: &JobHandle,
    config: &TrackerConfig,
) -> Result<JobResult> {
    let bar = spinner(format!("Waiting for task {}", handle));
    let outcome = await_completion_with(client, handle, config, |progress| {
        bar.set_message(format!(
            "[{}s] {} (check {})",
            progress.elapsed.as_secs(),
            progress.status,
            progress.attempt
        ));
    })
    .await;
    bar.finish_and_clear();
    Ok(outcome?)
}

/// Writes the terminal result before anything else happens to it. Failures are kept too.
fn persist_result(result: &JobResult, path: &Path) -> Result<()> {
    let value = match result {
        JobResult::Succeeded(artifacts) => serde_json::to_value(artifacts)?,
        JobResult::Failed(msg) => serde_json::json!({"status": "FAILED", "error": msg}),
    };
    std::fs::write(path, serde_json::to_string_pretty(&value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn finish(
    client: &SunoClient,
    result: JobResult,
    output_dir: &Path,
    no_download: bool,
) -> Result<()> {
    persist_result(&result, Path::new(LAST_GENERATION_FILE))?;
    let artifacts: Vec<Artifact> = result.into_artifacts()?;
    info!(
        "Generated {} track variant(s), response saved to {}",
        artifacts.len(),
        LAST_GENERATION_FILE
    );

    if no_download {
        for artifact in &artifacts {
            println!("{}", artifact.audio_url);
        }
        return Ok(());
    }

    let downloaded = client.download_artifacts(&artifacts, output_dir).await?;
    println!("Downloaded {} track(s):", downloaded.len());
    for path in downloaded {
        println!("  {}", path.display());
    }
    Ok(())
}

fn persona(settings: &Settings, cmd: PersonaCommand) -> Result<()> {
    let mut store = PersonaStore::open(&settings.persona_store)?;
    match cmd {
        PersonaCommand::List => {
            println!("Personas in {}:", store.path().display());
            for name in store.list() {
                if let Some(p) = store.get(name) {
                    println!("{} ({}) - {} track(s)", p.name, p.model, p.track_ids.len());
                }
            }
        }
        PersonaCommand::Show { name } => {
            let p = store
                .get(&name)
                .with_context(|| format!("Persona '{}' not found", name))?;
            println!("{}", serde_json::to_string_pretty(p)?);
            println!("\nStyle string:\n{}", p.style_string());
        }
        PersonaCommand::Add {
            name,
            style,
            model,
            bpm,
            key,
            vocals,
            instruments,
            mixing,
            tags,
            description,
        } => {
            let mut p = Persona::new(name, style);
            if let Some(model) = model {
                p.model = model;
            }
            p.bpm = bpm;
            p.key = key;
            p.vocal_characteristics = vocals;
            p.instrumental_elements = instruments;
            p.mixing_notes = mixing;
            p.tags = tags;
            p.description = description;
            println!("Style string: {}", p.style_string());
            store.add(p)?;
        }
        PersonaCommand::Remove { name } => {
            store.remove(&name)?;
            println!("Removed '{}'", name);
        }
        PersonaCommand::Export { name, path } => {
            store.export(&name, &path)?;
            println!("Exported '{}' to {}", name, path.display());
        }
        PersonaCommand::Import { path } => {
            let name = store.import(&path)?;
            println!("Imported '{}'", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_failed_result_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_generation.json");

        persist_result(&JobResult::Failed("Sensitive word detected".to_string()), &path).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["status"], "FAILED");
        assert_eq!(saved["error"], "Sensitive word detected");
    }

    #[test]
    fn test_successful_result_is_persisted_as_track_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_generation.json");
        let result = JobResult::Succeeded(vec![Artifact::new("http://x/a.mp3")]);

        persist_result(&result, &path).unwrap();

        let saved: Vec<Artifact> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved[0].audio_url, "http://x/a.mp3");
    }

    #[test]
    fn test_cli_parses_callback_generate() {
        let cli = Cli::try_parse_from([
            "suno-task-tracker",
            "generate",
            "--title",
            "Hard Trap Moscow",
            "--style",
            "hard trap",
            "--mode",
            "callback",
            "--port",
            "9000",
            "--max-wait",
            "120",
        ])
        .unwrap();
        match cli.command {
            Command::Generate(args) => {
                assert!(args.mode == Mode::Callback);
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.timing.max_wait, Some(120));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_timing_flags_override_settings() {
        let settings =
            Settings::from_sources(suno_task_tracker::config::FileConfig::default(), |_| None);
        let timing = TimingArgs {
            poll_interval: Some(3),
            max_wait: None,
        };
        let config = tracker_config(&settings, &timing);
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.max_wait_secs, settings.tracker.max_wait_secs);
    }

    #[test]
    fn test_prompt_and_prompt_file_conflict() {
        let parsed = Cli::try_parse_from([
            "suno-task-tracker",
            "generate",
            "--title",
            "t",
            "--style",
            "s",
            "--prompt",
            "p",
            "--prompt-file",
            "lyrics.txt",
        ]);
        assert!(parsed.is_err());
    }
}
