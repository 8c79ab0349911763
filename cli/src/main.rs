mod logging;
mod script;


use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use cobrowse::config::{ConfigError, EngineConfig};
use cobrowse::directory::{DirectoryError, HttpDirectory, SessionDirectory};
use cobrowse::document::StaticDocument;
use cobrowse::engine::{Engine, EngineError};
use cobrowse::geometry::Point;
use cobrowse::render::{Overlay, OverlayFactory};
use frames::{CreateSessionRequest, MemberId, Session};
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing::{info, warn};

use crate::script::{PointerAction, ScriptError, ScriptStep, parse_script};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session `{0}` not listed by the directory")]
    SessionNotFound(String),
}

#[derive(Parser, Debug)]
#[command(name = "cobrowse", about = "Co-browsing pointer presence client")]
struct Cli {
    #[arg(long, env = "COBROWSE_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// Where rejoin tokens are persisted between runs.
    #[arg(long, env = "COBROWSE_STATE_FILE")]
    state_file: Option<PathBuf>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Sessions(SessionsCommand),
    Join(JoinArgs),
}

#[derive(Args, Debug)]
struct SessionsCommand {
    #[command(subcommand)]
    command: SessionsSubcommand,
}

#[derive(Subcommand, Debug)]
enum SessionsSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        creator: String,
        #[arg(long, default_value = "about:blank")]
        base: String,
    },
    Delete {
        session_id: String,
    },
}

#[derive(Args, Debug)]
struct JoinArgs {
    /// Session to join; ignored with `--rejoin`.
    #[arg(required_unless_present = "rejoin")]
    session_id: Option<String>,

    #[arg(long)]
    identifier: String,

    /// Page layout fixture (JSON).
    #[arg(long)]
    document: PathBuf,

    /// Override the fixture's page location.
    #[arg(long)]
    location: Option<String>,

    /// JSONL pointer moves to replay once joined.
    #[arg(long)]
    pointer_script: Option<PathBuf>,

    /// Reuse the persisted session and rejoin token for this directory.
    #[arg(long, default_value_t = false)]
    rejoin: bool,

    /// Delete the session from the directory on exit.
    #[arg(long, default_value_t = false)]
    close_on_exit: bool,

    /// Leave after this many seconds instead of waiting for ctrl-c.
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut config = EngineConfig::from_env()?;
    if let Some(url) = cli.directory_url {
        config.directory_url = url;
    }
    if let Some(path) = cli.state_file {
        config.state_file = Some(path);
    }

    match cli.command {
        Command::Sessions(sessions) => run_sessions(&config, sessions).await,
        Command::Join(args) => LocalSet::new().run_until(run_join(config, args)).await,
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

async fn run_sessions(config: &EngineConfig, sessions: SessionsCommand) -> Result<(), CliError> {
    let directory = HttpDirectory::new(&config.directory_url)?;
    match sessions.command {
        SessionsSubcommand::List => {
            let sessions = directory.list_sessions().await?;
            print_json(&sessions)
        }
        SessionsSubcommand::Create { name, creator, base } => {
            let request = CreateSessionRequest { name, base_location: base, creator };
            let session = directory.create_session(&request).await?;
            print_json(&session)
        }
        SessionsSubcommand::Delete { session_id } => {
            directory.delete_session(&session_id).await?;
            eprintln!("deleted session {session_id}");
            Ok(())
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

// =============================================================================
// JOIN
// =============================================================================

async fn run_join(config: EngineConfig, args: JoinArgs) -> Result<(), CliError> {
    let mut page = StaticDocument::from_json(&std::fs::read_to_string(&args.document)?)?;
    if let Some(location) = &args.location {
        page.set_location(location.clone());
    }
    let steps = match &args.pointer_script {
        Some(path) => parse_script(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let engine = Rc::new(Engine::builder(config, Rc::new(page), Box::new(PrintOverlayFactory)).build()?);

    let dropped = Rc::new(Notify::new());
    let signal = Rc::clone(&dropped);
    engine.set_on_disconnect(move |disconnect| {
        if !disconnect.requested {
            warn!(abnormal = disconnect.abnormal, reason = %disconnect.reason, "connection lost");
            signal.notify_one();
        }
    });

    let token = if args.rejoin {
        engine.rejoin(&args.identifier).await?
    } else {
        let session = find_session(&engine, args.session_id.as_deref().unwrap_or_default()).await?;
        engine.join(&session, &args.identifier, None).await?
    };
    info!(member_id = engine.member_id(), %token, "joined");

    let replay = tokio::task::spawn_local(replay_script(Rc::clone(&engine), steps));
    let lost = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted");
            false
        }
        () = sleep_for(args.duration.map(Duration::from_secs)) => {
            info!("duration elapsed");
            false
        }
        () = dropped.notified() => true,
    };
    replay.abort();

    if lost {
        return Ok(());
    }
    if args.close_on_exit {
        engine.close().await?;
    } else {
        engine.leave();
    }
    Ok(())
}

async fn find_session(engine: &Engine, session_id: &str) -> Result<Session, CliError> {
    engine
        .list_sessions()
        .await?
        .into_iter()
        .find(|session| session.id == session_id)
        .ok_or_else(|| CliError::SessionNotFound(session_id.to_owned()))
}

async fn replay_script(engine: Rc<Engine>, steps: Vec<ScriptStep>) {
    for step in steps {
        tokio::time::sleep(step.wait).await;
        match step.action {
            PointerAction::Move(point) => {
                if engine.on_pointer_move(point).is_none() {
                    warn!(x = point.x, y = point.y, "pointer move ignored; not connected");
                }
            }
            PointerAction::Leave => engine.pointer_left(),
        }
    }
    info!("pointer script finished");
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// OVERLAYS
// =============================================================================

/// Overlays that print placement changes of remote members to stdout.
struct PrintOverlayFactory;

impl OverlayFactory for PrintOverlayFactory {
    fn create(&self, member_id: MemberId, given_identifier: &str) -> Box<dyn Overlay> {
        Box::new(PrintOverlay::new(member_id, given_identifier))
    }
}

/// Prints once per batch, after the renderer's hide-then-show pass settled.
struct PrintOverlay {
    member_id: MemberId,
    label: String,
    position: Option<Point>,
    visible: bool,
    /// What the terminal last showed: `Some` while a placement is on screen.
    printed: Option<Point>,
}

impl PrintOverlay {
    fn new(member_id: MemberId, label: &str) -> Self {
        Self { member_id, label: label.to_owned(), position: None, visible: false, printed: None }
    }

    /// Line describing what changed since the last settled batch, if anything.
    fn settled_line(&mut self) -> Option<String> {
        match (self.visible, self.position) {
            (true, Some(position)) if self.printed != Some(position) => {
                self.printed = Some(position);
                Some(placement_line(self.member_id, &self.label, position))
            }
            (false, _) if self.printed.is_some() => {
                self.printed = None;
                Some(format!("{} ({}) hidden", self.member_id, self.label))
            }
            _ => None,
        }
    }
}

impl Overlay for PrintOverlay {
    fn set_position(&mut self, position: Point) {
        self.position = Some(position);
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn settle(&mut self) {
        if let Some(line) = self.settled_line() {
            println!("{line}");
        }
    }
}

impl Drop for PrintOverlay {
    fn drop(&mut self) {
        println!("{} ({}) left", self.member_id, self.label);
    }
}

fn placement_line(member_id: MemberId, label: &str, position: Point) -> String {
    format!("{member_id} ({label}) at {},{}", position.x, position.y)
}
