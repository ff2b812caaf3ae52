//! Colloquy - Terminal Chat Front End
//!
//! A line-oriented front end for a colloquy session. Each line typed is sent
//! as a message; replies stream to stdout as they arrive. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Chat with the default model
//! GEMINI_API_KEY=... colloquy
//!
//! # Start from a built-in preset
//! colloquy --preset travel-tips
//!
//! # Attach a file to the first message, no streaming
//! colloquy --attach photo.jpg --no-stream
//!
//! # Verbose logging
//! RUST_LOG=debug colloquy
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): stop the response in progress, or exit when idle

mod commands;
mod render;

use std::io::Write;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colloquy_core::{
    builtin_presets, find_preset, load_config, load_config_from_path, Attachment, ConfigOverrides,
    GeminiBackend, GenerativeBackend, LoadingState, SessionController, SessionError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use commands::Command;

type Controller = SessionController<GeminiBackend>;

/// Colloquy - streaming chat with a generative model
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "COLLOQUY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model name
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// System instruction
    #[arg(short = 's', long, value_name = "TEXT")]
    system: Option<String>,

    /// Start from a built-in preset (see --list-presets)
    #[arg(short = 'p', long, value_name = "NAME")]
    preset: Option<String>,

    /// List built-in presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Attach a file to the first message (repeatable)
    #[arg(short = 'a', long = "attach", value_name = "PATH")]
    attach: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COLLOQUY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(ref system) = self.system {
            overrides = overrides.with_system_instruction(system.clone());
        }
        if self.no_stream {
            overrides = overrides.with_streaming(false);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("colloquy={level},colloquy_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    if args.list_presets {
        for preset in builtin_presets() {
            println!("{:<20} {}", preset.name, preset.description);
        }
        return Ok(());
    }

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        model = %config.session.model,
        source = %config.source(),
        "Configuration loaded"
    );
    if config.backend.api_key.is_none() {
        warn!("No credential configured; set GEMINI_API_KEY, or COLLOQUY_API_KEY to an access token for Vertex AI");
    }

    let backend =
        Arc::new(GeminiBackend::from_settings(&config.backend).context("Failed to create backend")?);
    check_backend(Arc::clone(&backend));

    let controller = match args.preset {
        Some(ref name) => {
            let preset = find_preset(name)
                .with_context(|| format!("Unknown preset '{name}', try --list-presets"))?;
            SessionController::with_preset(backend, config.session, &preset)
        }
        None => SessionController::new(backend, config.session),
    };

    for path in &args.attach {
        attach(&controller, path).await;
    }

    run(&controller).await
}

/// Check the backend in the background so a slow network never delays the prompt
fn check_backend(backend: Arc<GeminiBackend>) {
    tokio::spawn(async move {
        if backend.health_check().await {
            info!(backend = backend.name(), url = backend.base_url(), "Backend reachable");
        } else {
            warn!(
                backend = backend.name(),
                url = backend.base_url(),
                "Backend health check failed; requests may fail"
            );
        }
    });
}

/// Read lines and render updates until the user quits
async fn run(controller: &Controller) -> Result<()> {
    let mut stdout = std::io::stdout();
    greet(&mut stdout, controller)?;

    let mut updates = controller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                if handle_line(controller, &line, &mut stdout).await?.is_break() {
                    break;
                }
            }
            update = updates.recv() => match update {
                Ok(update) => render::update(&mut stdout, &update)?,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Renderer fell behind, showing history");
                    render::history(&mut stdout, &controller.messages())?;
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                if controller.is_in_progress() {
                    controller.stop();
                } else {
                    break;
                }
            }
        }
    }

    controller.stop();
    Ok(())
}

fn greet(out: &mut impl Write, controller: &Controller) -> Result<()> {
    let title = controller.title();
    if title.is_empty() {
        writeln!(out, "colloquy ({}) - /help for commands", controller.config().model)?;
    } else {
        writeln!(out, "{title} ({}) - /help for commands", controller.config().model)?;
    }
    let messages = controller.messages();
    if !messages.is_empty() {
        render::history(out, &messages)?;
    }
    let pending = controller.pending_attachments();
    if !pending.is_empty() {
        writeln!(out, "Queued for your first message:")?;
        render::attachments(out, &pending)?;
    }
    let prompt = controller.initial_prompt();
    if !prompt.is_empty() {
        writeln!(out, "Suggested prompt (press Enter to send): {prompt}")?;
    }
    Ok(())
}

async fn handle_line(
    controller: &Controller,
    line: &str,
    out: &mut impl Write,
) -> Result<ControlFlow<()>> {
    match commands::parse(line) {
        Command::Send(text) => send(controller, text, out)?,
        Command::Empty => {
            let prompt = controller.initial_prompt();
            if !prompt.is_empty() {
                writeln!(out, "you: {prompt}")?;
                send(controller, prompt, out)?;
            }
        }
        Command::Attach(path) => attach(controller, &path).await,
        Command::Detach(key) => {
            let found = controller
                .pending_attachments()
                .into_iter()
                .find(|a| a.id.0.starts_with(&key) || a.display_name == key);
            match found.and_then(|a| controller.remove_attachment(&a.id)) {
                Some(removed) => writeln!(out, "Removed {}", removed.display_name)?,
                None => writeln!(out, "No queued attachment matches '{key}'")?,
            }
        }
        Command::Attachments => render::attachments(out, &controller.pending_attachments())?,
        Command::Stop => controller.stop(),
        Command::New => controller.start_new_chat(),
        Command::History => render::history(out, &controller.messages())?,
        Command::Help => writeln!(out, "{}", commands::HELP)?,
        Command::Quit => return Ok(ControlFlow::Break(())),
        Command::Invalid(reason) => writeln!(out, "{reason}")?,
    }
    out.flush()?;
    Ok(ControlFlow::Continue(()))
}

fn send(controller: &Controller, text: String, out: &mut impl Write) -> Result<()> {
    match controller.send_message(text, controller.default_mode()) {
        // Progress arrives through the update stream
        Ok(_handle) => {}
        Err(SessionError::Validation(reason)) => writeln!(out, "Not sent: {reason}")?,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn attach(controller: &Controller, path: &std::path::Path) {
    let attachment = Attachment::from_path(path).await;
    if let LoadingState::Failed(ref reason) = attachment.loading_state {
        warn!(path = %path.display(), reason = %reason, "Could not attach file");
        eprintln!("Could not attach {}: {reason}", path.display());
        return;
    }
    controller.add_attachment(attachment);
}
