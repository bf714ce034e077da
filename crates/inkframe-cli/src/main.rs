//! Command-line front end for the inkframe client core.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use inkframe_client_core::api::JobState;
use inkframe_client_core::{CoreConfig, InboundMessage, Session};

#[derive(Parser)]
#[command(name = "inkframe")]
#[command(about = "Client for the inkframe image generation and e-ink display service")]
struct InkframeCli {
    /// API base URL (overrides INKFRAME_API_BASE_URL)
    #[arg(long)]
    api_base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or edit the generation prompt
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },
    /// Start a generation job and follow it to completion
    Generate,
    /// One-shot job status fetch
    Status,
    /// Server scheduler configuration
    Scheduler,
    /// Server health probe
    Health,
    /// List generated images
    Images {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Push an existing image to the e-ink panel and follow the job
    Display { filename: String },
    /// Hold the realtime connection open and log inbound events
    Watch,
}

#[derive(Subcommand)]
enum PromptCommands {
    /// Print the current prompt
    Get,
    /// Save a new prompt
    Set { text: String },
    /// Print recent prompt history, newest first
    History {
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = InkframeCli::parse();
    let config = match cli.api_base_url {
        Some(base_url) => CoreConfig::new(base_url)?,
        None => CoreConfig::from_env()?,
    };
    let session = Session::new(config)?;

    match cli.command {
        Commands::Prompt { command } => run_prompt(&session, command).await,
        Commands::Generate => run_generate(&session).await,
        Commands::Status => run_status(&session).await,
        Commands::Scheduler => run_scheduler(&session).await,
        Commands::Health => run_health(&session).await,
        Commands::Images { limit } => run_images(&session, limit).await,
        Commands::Display { filename } => run_display(&session, &filename).await,
        Commands::Watch => run_watch(&session).await,
    }
}

async fn run_prompt(session: &Session, command: PromptCommands) -> Result<()> {
    match command {
        PromptCommands::Get => {
            session.prompts().load_current().await;
            if let Some(error) = session.prompts().last_error() {
                bail!(error);
            }
            println!("{}", session.prompts().prompt());
            Ok(())
        }
        PromptCommands::Set { text } => {
            session.prompts().set_prompt(text);
            let outcome = session.prompts().save().await;
            if !outcome.success {
                bail!(outcome.message);
            }
            println!("{}", outcome.message);
            Ok(())
        }
        PromptCommands::History { limit } => {
            session.prompts().load_history(Some(limit)).await;
            for entry in session.prompts().history() {
                println!("{}  {}", entry.timestamp, entry.prompt);
            }
            Ok(())
        }
    }
}

async fn run_generate(session: &Session) -> Result<()> {
    let outcome = session.tracker().start_job().await;
    if !outcome.success {
        bail!(outcome.message);
    }
    println!("{}", outcome.message);
    follow_job(session).await
}

async fn run_status(session: &Session) -> Result<()> {
    let status = session.api().job_status().await?;
    print_status(&status);
    Ok(())
}

async fn run_scheduler(session: &Session) -> Result<()> {
    let scheduler = session.api().scheduler_status().await?;
    println!(
        "enabled: {}  schedule: {} ({})",
        scheduler.enabled, scheduler.schedule_time, scheduler.timezone
    );
    if let Some(next_run) = scheduler.next_run {
        println!("next run: {next_run}");
    }
    Ok(())
}

async fn run_health(session: &Session) -> Result<()> {
    let health = session.api().health().await?;
    println!("{} (version {})", health.status, health.version);
    Ok(())
}

async fn run_images(session: &Session, limit: usize) -> Result<()> {
    session.images().load_images(Some(limit)).await;
    if let Some(error) = session.images().last_error() {
        bail!(error);
    }
    for image in session.images().images() {
        println!(
            "{}  {:>8} bytes  {}",
            image.created_at, image.size_bytes, image.filename
        );
    }
    Ok(())
}

async fn run_display(session: &Session, filename: &str) -> Result<()> {
    let outcome = session.images().display_on_epaper(filename).await;
    if !outcome.success {
        bail!(outcome.message);
    }
    println!("{}", outcome.message);
    follow_job(session).await
}

async fn run_watch(session: &Session) -> Result<()> {
    let handle = session
        .router()
        .register(Arc::new(|message: &InboundMessage| {
            println!(
                "{}  {}",
                Utc::now().format("%H:%M:%S"),
                summarize(message)
            );
        }));

    session.connect();
    println!("watching realtime events, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    session.router().unregister(handle);
    session.shutdown().await;
    Ok(())
}

/// Mirror the tracker's own poll cadence and print status changes until the
/// job reaches a terminal state.
async fn follow_job(session: &Session) -> Result<()> {
    let period = session.config().poll_interval;
    let mut last_message = String::new();
    loop {
        tokio::time::sleep(period.max(Duration::from_millis(250))).await;
        let status = session.tracker().status();
        if status.message != last_message {
            print_status(&status);
            last_message = status.message.clone();
        }
        match status.status {
            JobState::Running => {}
            JobState::Error => {
                session.tracker().stop_polling();
                bail!(status.error.unwrap_or(status.message));
            }
            JobState::Idle | JobState::Complete => {
                session.tracker().stop_polling();
                return Ok(());
            }
        }
    }
}

fn print_status(status: &inkframe_client_core::api::JobStatus) {
    let state = match status.status {
        JobState::Idle => "idle",
        JobState::Running => "running",
        JobState::Complete => "complete",
        JobState::Error => "error",
    };
    println!("[{state}] {}", status.message);
    if let Some(image_path) = &status.image_path {
        println!("image: {image_path}");
    }
}

fn summarize(message: &InboundMessage) -> String {
    match (&message.prompt, &message.data) {
        (Some(prompt), _) => format!("{}: {prompt}", message.kind),
        (None, Some(data)) => format!("{}: {data}", message.kind),
        (None, None) => message.kind.clone(),
    }
}
