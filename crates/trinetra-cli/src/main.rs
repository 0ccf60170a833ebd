mod app;

use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trinetra_contracts::events::EventLog;
use trinetra_contracts::views::{View, CHAT_PROFILE};
use trinetra_engine::artifacts::write_artifact_to;
use trinetra_engine::encoder::encode_file;
use trinetra_engine::{BackendKind, CancelToken, EngineConfig, GenAiClient, CHAT_FALLBACK_REPLY};

use crate::app::{spawn_stdin_reader, App, EDIT_FAILED, GENERATION_FAILED};

#[derive(Debug, Parser)]
#[command(name = "trinetra", version, about = "Trinetra Ai terminal client")]
struct Cli {
    /// Generative backend: `gemini` or `dryrun` (overrides TRINETRA_BACKEND).
    #[arg(long, global = true)]
    backend: Option<BackendKind>,
    /// Append structured events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive four-view application.
    App(AppArgs),
    /// Send one chat message and print the reply.
    Ask(AskArgs),
    /// Generate one image from a prompt.
    Imagine(ImagineArgs),
    /// Edit an image with a text instruction.
    Edit(EditArgs),
}

#[derive(Debug, Parser)]
struct AppArgs {
    #[arg(long, default_value = "trinetra-out")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(long, default_value = "chat")]
    key: String,
    #[arg(long)]
    instruction: Option<String>,
    #[arg(long)]
    attach: Option<PathBuf>,
    message: String,
}

#[derive(Debug, Parser)]
struct ImagineArgs {
    #[arg(long)]
    out: PathBuf,
    prompt: String,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    instruction: String,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("trinetra error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn run() -> Result<i32> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            tracing::warn!(error = %err, "failed to load .env");
        }
    }
    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(backend) = cli.backend {
        config = config.with_backend(backend);
    }
    let run_id = uuid::Uuid::new_v4().to_string();
    let events = match cli.events.as_ref() {
        Some(path) => EventLog::new(path, run_id),
        None => EventLog::disabled(run_id),
    };
    let client = GenAiClient::from_config(&config, events)?;

    match cli.command {
        Command::App(args) => {
            run_app(client, args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(&client, args),
        Command::Imagine(args) => run_imagine(&client, args),
        Command::Edit(args) => run_edit(&client, args),
    }
}

fn run_app(client: GenAiClient, args: AppArgs) -> Result<()> {
    if let Some(path) = client.events().path() {
        eprintln!("Events: {}", path.display());
    }
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone());
    App::new(client, &args.out, io::stdout(), tx).run(&rx)
}

fn run_ask(client: &GenAiClient, args: AskArgs) -> Result<i32> {
    let profile = View::parse(&args.key)
        .and_then(|view| view.chat_profile())
        .unwrap_or(&CHAT_PROFILE);
    let instruction = args
        .instruction
        .as_deref()
        .unwrap_or(profile.system_instruction);
    let attachment = match args.attach.as_ref() {
        Some(path) => Some(encode_file(path)?),
        None => None,
    };

    let session = client.session_store().get_or_create(&args.key, instruction);
    match client.send(
        &session,
        &args.message,
        attachment.as_ref(),
        &CancelToken::new(),
    ) {
        Ok(reply) => {
            println!("{reply}");
            Ok(0)
        }
        Err(_) => {
            println!("{CHAT_FALLBACK_REPLY}");
            Ok(1)
        }
    }
}

fn run_imagine(client: &GenAiClient, args: ImagineArgs) -> Result<i32> {
    match client.synthesize(&args.prompt, &CancelToken::new()) {
        Ok(artifact) => {
            write_artifact_to(&args.out, &artifact)?;
            println!("{}", args.out.display());
            Ok(0)
        }
        Err(_) => {
            eprintln!("{GENERATION_FAILED}");
            Ok(1)
        }
    }
}

fn run_edit(client: &GenAiClient, args: EditArgs) -> Result<i32> {
    let source = encode_file(&args.image)
        .with_context(|| format!("failed loading source image {}", args.image.display()))?;
    match client.transform(&args.instruction, &source, &CancelToken::new()) {
        Ok(artifact) => {
            write_artifact_to(&args.out, &artifact)?;
            println!("{}", args.out.display());
            Ok(0)
        }
        Err(_) => {
            eprintln!("{EDIT_FAILED}");
            Ok(1)
        }
    }
}
