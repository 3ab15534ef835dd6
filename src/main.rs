use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colloquy::cli::{Cli, Commands, ConfigAction, DebateArgs, TranscriptAction};
use colloquy::config::Config;
use colloquy::demux::{
    CancelToken, DemuxConfig, Outcome, SessionReport, StreamDriver, cancel_pair,
};
use colloquy::ipc::client::open_session;
use colloquy::output::{PrettySink, render_wire_event};
use colloquy::request::{DebateRequest, Panelist};
use colloquy::sink::{
    DirectoryStore, EventSink, TranscriptSink, TranscriptStore, WireRelaySink,
};
use colloquy::upstream::{FragmentSource, ReaderSource, SseSource};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Completions and config paths need no logging or config file.
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "colloquy",
                &mut std::io::stdout(),
            );
            return Ok(());
        }
        Commands::Config { action } => {
            return handle_config_command(action, cli.config.as_deref());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    colloquy::logging::init(cli.verbose, cli.quiet, &config.logging.level);
    tracing::debug!(version = %colloquy::version_string(), "Starting");

    match cli.command {
        Commands::Demux {
            input,
            sse,
            same_speaker,
            pretty,
            transcript,
        } => {
            let mut demux = config.demux_config();
            if let Some(policy) = same_speaker {
                demux.same_speaker = policy;
            }
            let report =
                run_demux(input.as_deref(), sse, demux, pretty, transcript.as_deref()).await?;
            exit_on_failure(&report);
        }
        #[cfg(feature = "http")]
        Commands::Generate { debate, pretty } => {
            let request = build_request(&debate)?;
            let report = run_generate(&config, request, pretty).await?;
            exit_on_failure(&report);
        }
        #[cfg(feature = "http")]
        Commands::Serve {
            socket,
            transcript_dir,
        } => {
            run_serve(&config, socket, transcript_dir).await?;
        }
        Commands::Send {
            debate,
            socket,
            json,
        } => {
            let request = build_request(&debate)?;
            let socket = socket.unwrap_or_else(|| config.server.socket_path());
            run_send(&socket, &request, json).await?;
        }
        Commands::Transcripts { action, dir } => {
            let Some(dir) = dir.or_else(|| config.server.transcript_dir.clone()) else {
                anyhow::bail!("No transcript directory: pass --dir or set server.transcript_dir");
            };
            run_transcripts(&DirectoryStore::new(dir), &action).await?;
        }
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/colloquy/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Handle configuration commands.
fn handle_config_command(action: &ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Dump => {
            print!("{}", Config::default().to_toml()?);
        }
    }
    Ok(())
}

fn build_request(args: &DebateArgs) -> Result<DebateRequest> {
    let panelists = args
        .panelists
        .iter()
        .map(|spec| Panelist::parse_spec(spec))
        .collect::<colloquy::Result<Vec<_>>>()?;
    let request = DebateRequest::new(args.topic.clone(), panelists);
    request.validate()?;
    Ok(request)
}

/// Exit non-zero when a session did not complete normally.
fn exit_on_failure(report: &SessionReport) {
    match &report.outcome {
        Outcome::Completed => {}
        Outcome::UpstreamFailed(message) => {
            eprintln!("colloquy: upstream failed: {message}");
            std::process::exit(1);
        }
        Outcome::Cancelled => {
            eprintln!("colloquy: cancelled");
            std::process::exit(130);
        }
    }
}

/// Cancel the session on Ctrl-C.
fn ctrl_c_token() -> CancelToken {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            handle.cancel();
        }
    });
    token
}

/// Drive one session to stdout (JSON lines or pretty) plus an optional transcript.
async fn drive_to_stdout<S>(
    source: &mut S,
    demux: DemuxConfig,
    pretty: bool,
    request: Option<&DebateRequest>,
    transcript_path: Option<&Path>,
) -> Result<SessionReport>
where
    S: FragmentSource + ?Sized,
{
    let driver = StreamDriver::new(demux);
    let started_at = chrono::Utc::now();
    let mut transcript = TranscriptSink::new();

    let mut relay = WireRelaySink::new(tokio::io::stdout());
    let mut pretty_sink = PrettySink::new(std::io::stdout(), std::io::stdout().is_terminal());
    let output: &mut dyn EventSink = if pretty { &mut pretty_sink } else { &mut relay };

    let report = if transcript_path.is_some() {
        driver
            .run(source, &mut [output, &mut transcript], ctrl_c_token())
            .await?
    } else {
        driver.run(source, &mut [output], ctrl_c_token()).await?
    };

    if let Some(path) = transcript_path {
        let fallback = DebateRequest::default();
        let document = transcript.to_transcript(
            &uuid::Uuid::new_v4().to_string(),
            request.unwrap_or(&fallback),
            started_at,
        );
        let json = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Transcript written");
    }

    Ok(report)
}

async fn run_demux(
    input: Option<&Path>,
    sse: bool,
    demux: DemuxConfig,
    pretty: bool,
    transcript: Option<&Path>,
) -> Result<SessionReport> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut source: Box<dyn FragmentSource> = if sse {
        Box::new(SseSource::new(BufReader::new(reader)))
    } else {
        Box::new(ReaderSource::new(reader))
    };

    drive_to_stdout(source.as_mut(), demux, pretty, None, transcript).await
}

#[cfg(feature = "http")]
async fn run_generate(
    config: &Config,
    request: DebateRequest,
    pretty: bool,
) -> Result<SessionReport> {
    use colloquy::request::build_debate_prompt;
    use colloquy::upstream::anthropic::MessagesClient;

    let client = MessagesClient::from_env(config.upstream.clone())?;
    let mut source = client.open(&build_debate_prompt(&request)).await?;
    drive_to_stdout(&mut source, config.demux_config(), pretty, Some(&request), None).await
}

#[cfg(feature = "http")]
async fn run_serve(
    config: &Config,
    socket: Option<PathBuf>,
    transcript_dir: Option<PathBuf>,
) -> Result<()> {
    use colloquy::ipc::server::SessionServer;
    use colloquy::upstream::anthropic::{MessagesClient, MessagesSourceFactory};
    use std::sync::Arc;

    let client = MessagesClient::from_env(config.upstream.clone())?;
    let socket = socket.unwrap_or_else(|| config.server.socket_path());

    let mut server = SessionServer::new(socket, Arc::new(MessagesSourceFactory::new(client)))
        .with_demux(config.demux_config());
    if let Some(dir) = transcript_dir.or_else(|| config.server.transcript_dir.clone()) {
        let store: Arc<dyn TranscriptStore> = Arc::new(DirectoryStore::new(dir));
        server = server.with_store(store);
    }

    let server = Arc::new(server);
    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            if let Err(e) = stopper.stop().await {
                tracing::warn!(error = %e, "Failed to clean up socket");
            }
        }
    });

    server.start().await?;
    Ok(())
}

async fn run_transcripts(store: &dyn TranscriptStore, action: &TranscriptAction) -> Result<()> {
    match action {
        TranscriptAction::List => {
            for summary in store.list().await? {
                println!(
                    "{}  {}  {:?}  {} messages  {}",
                    summary.id,
                    summary.started_at.format("%Y-%m-%d %H:%M"),
                    summary.status,
                    summary.message_count,
                    summary.topic
                );
            }
        }
        TranscriptAction::Show { id } => {
            let transcript = store
                .load(id)
                .await
                .with_context(|| format!("Failed to load transcript {id}"))?;
            println!("{}", serde_json::to_string_pretty(&transcript)?);
        }
    }
    Ok(())
}

async fn run_send(socket: &Path, request: &DebateRequest, json: bool) -> Result<()> {
    let mut events = open_session(socket, request).await?;
    let color = std::io::stdout().is_terminal();
    let mut failed = None;

    while let Some(event) = events.next_event().await? {
        if json {
            println!("{}", event.to_json()?);
        } else if let Some(text) = render_wire_event(&event, color) {
            println!("{text}");
        }
        if let colloquy::ipc::WireEvent::Error { error } = &event {
            failed = Some(error.clone());
        }
    }

    if let Some(error) = failed {
        anyhow::bail!("session failed: {error}");
    }
    Ok(())
}
