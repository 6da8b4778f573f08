//! SQL training workspace CLI
//!
//! Opens one exercise against a live exercise service and drives it from the
//! terminal: buffer text on stdin, `:` commands and key chords for the
//! toolbar, Markdown or JSON panes on stdout.

mod input;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sqlt_render::{json::JsonGenerator, render_workspace, PaneView};
use sqlt_session::{
    Command, Config, EventBroadcaster, ExerciseClient, ExerciseRoute, ExerciseState,
    HttpExerciseClient, KeyboardHub, PlatformSetting, SessionEvent, SessionSettings,
    TopicProgress, UserExercise, Workspace,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing_subscriber::EnvFilter;

use crate::input::{parse_line, Input, HELP};

/// Default viewport width in columns.
const DEFAULT_WIDTH: u32 = 120;

/// SQL training workspace
///
/// Write a query line by line, then execute it, check it against the
/// reference solution, or reveal the solution.
#[derive(Parser, Debug)]
#[command(name = "sqlt")]
#[command(version, about, long_about = None)]
struct Args {
    /// Short name of the topic, e.g. `joins`
    #[arg(short, long)]
    topic: String,

    /// Exercise number within the topic
    #[arg(short, long, default_value_t = 1)]
    exercise: u32,

    /// Path to configuration file (default: sqlt.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Base URL of the exercise service, ending in `/`
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Accelerator modifier family: auto, mac or other
    #[arg(long, value_parser = parse_platform)]
    platform: Option<PlatformSetting>,

    /// Viewport width in columns; narrow viewports stack the panes
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,

    /// Print panes and events as JSON instead of Markdown
    #[arg(long)]
    json: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run_workspace(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Opens the workspace and runs the input loop until `:quit`, end of input
/// or Ctrl+C.
async fn run_workspace(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref base_url) = args.base_url {
        config.api_base_url.clone_from(base_url);
    }
    if let Some(platform) = args.platform {
        config.platform = platform;
    }

    // Re-validate after overrides
    config.validate()?;

    let platform = config.platform.resolve(&host_user_agent());
    tracing::info!(
        base_url = %config.api_base_url,
        platform = ?platform,
        topic = %args.topic,
        exercise = args.exercise,
        "Opening workspace"
    );

    let http = Arc::new(HttpExerciseClient::new(&config.api_base_url)?);
    let progress = load_progress(&http, &args.topic).await?;
    let record = load_record(&http, &args.topic, args.exercise).await;

    let settings = SessionSettings::from_config(&config, platform, args.width)?;
    let events = EventBroadcaster::new(config.event_capacity);
    let mut event_rx = events.subscribe();
    let client: Arc<dyn ExerciseClient> = http.clone();

    let mut workspace = Workspace::open(
        ExerciseRoute::new(args.topic.as_str(), args.exercise),
        client,
        settings,
        progress,
        record,
        KeyboardHub::new(),
        events,
    )?;

    print_help(&workspace);
    print_workspace(&workspace, args.json).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("End of input");
                    break;
                };
                let input = parse_line(&line);
                if input == Input::Quit {
                    break;
                }
                let render = handle_input(&mut workspace, &http, input).await;
                drain_events(&mut event_rx, args.json);
                if render {
                    print_workspace(&workspace, args.json).await;
                }
            }
        }
    }

    save_on_exit(&workspace).await;
    Ok(())
}

/// Applies one input line. Returns `true` if the panes should be redrawn.
async fn handle_input(
    workspace: &mut Workspace,
    http: &HttpExerciseClient,
    input: Input,
) -> bool {
    match input {
        Input::Text(line) => {
            workspace.session().append_line(&line).await;
            false
        }
        Input::Toolbar(command) => {
            if let Err(e) = workspace.session().dispatch(command).await {
                tracing::debug!(%command, error = %e, "Command failed");
            }
            if matches!(command, Command::ShowSolution | Command::Clear) {
                print_buffer(workspace).await;
            }
            true
        }
        Input::Chord(chord) => {
            let delivered = workspace.keyboard().press(chord);
            let outcomes = workspace.session().pump_keys().await;
            tracing::debug!(%chord, delivered, handled = outcomes.len(), "Key pressed");
            if outcomes.is_empty() {
                println!("{chord}: no command");
                return false;
            }
            for (command, result) in outcomes {
                if let Err(e) = result {
                    tracing::debug!(%command, error = %e, "Command failed");
                }
            }
            true
        }
        Input::Favorite => {
            match workspace.session().toggle_favorite().await {
                Ok(true) => println!("Marked as favorite"),
                Ok(false) => println!("Removed from favorites"),
                Err(e) => tracing::debug!(error = %e, "Favorite toggle failed"),
            }
            false
        }
        Input::Next => navigate(workspace, http, true).await,
        Input::Previous => navigate(workspace, http, false).await,
        Input::Show => {
            print_buffer(workspace).await;
            true
        }
        Input::Help => {
            print_help(workspace);
            false
        }
        Input::Unknown(name) => {
            println!("Unknown command ':{name}' (try :help)");
            false
        }
        Input::Quit => false,
    }
}

/// Moves to a neighbouring exercise, loading its saved record first.
async fn navigate(workspace: &mut Workspace, http: &HttpExerciseClient, forward: bool) -> bool {
    let target = if forward {
        workspace.next_route()
    } else {
        workspace.previous_route()
    };
    let Some(target) = target else {
        let which = if forward { "next" } else { "previous" };
        println!("No {which} exercise in this topic");
        return false;
    };

    let record = load_record(http, &target.topic, target.exercise).await;
    if let Err(e) = workspace.navigate(target.exercise, record).await {
        println!("Error: {e}");
        return false;
    }
    true
}

/// Loads configuration from an explicit path or the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the topic's exercise list and the learner's records.
async fn load_progress(client: &HttpExerciseClient, topic: &str) -> anyhow::Result<TopicProgress> {
    let exercises = client.list_exercises(topic).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to list exercises for topic '{topic}': {e}\n\nSuggestion: Check --base-url and the topic name"
        )
    })?;

    let records = match client.user_exercises(topic).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(topic, error = %e, "Could not load exercise progress");
            Vec::new()
        }
    };

    Ok(TopicProgress::from_records(exercises, &records))
}

/// Loads the learner's saved buffer and favorite flag, if any.
async fn load_record(
    client: &HttpExerciseClient,
    topic: &str,
    exercise: u32,
) -> Option<UserExercise> {
    match client.user_exercise(topic, exercise).await {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(topic, exercise, error = %e, "No saved record");
            None
        }
    }
}

/// Saves the buffer before exit and waits for the save to settle.
async fn save_on_exit(workspace: &Workspace) {
    let session = workspace.session();
    session.persist_buffer(session.query().await).await;
    session.flush_persistence().await;
}

/// Reports this terminal to the platform detection the way a browser would.
fn host_user_agent() -> String {
    let os = if cfg!(target_os = "macos") {
        "Macintosh"
    } else {
        std::env::consts::OS
    };
    format!("sqlt/{} ({os})", env!("CARGO_PKG_VERSION"))
}

fn parse_platform(value: &str) -> Result<PlatformSetting, String> {
    PlatformSetting::from_str_case_insensitive(value)
        .ok_or_else(|| format!("invalid platform '{value}' (expected auto, mac or other)"))
}

/// Prints queued session events.
fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>, json: bool) {
    loop {
        match rx.try_recv() {
            Ok(event) => print_event(&event, json),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dropped session events");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
        }
        return;
    }

    match event {
        SessionEvent::Error(payload) => println!("Error: {}", payload.message),
        SessionEvent::Celebrate(payload) => {
            println!();
            println!("*** Every exercise in '{}' is solved! ***", payload.topic);
        }
        SessionEvent::PhaseChanged(payload) => {
            tracing::debug!(from = %payload.from, to = %payload.to, "Phase changed");
        }
        other => tracing::trace!(event = ?other, "Session event"),
    }
}

/// Prints the header, pending feedback and visible panes.
async fn print_workspace(workspace: &Workspace, json: bool) {
    let session = workspace.session();
    let snapshot = session.snapshot().await;
    let panes = PaneView::from_snapshot(&snapshot);

    if json {
        match JsonGenerator::new(&panes).generate() {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to render panes"),
        }
        return;
    }

    let mut badges = Vec::new();
    for info in session.progress().await.exercises() {
        let icon = badge_icon(session.badge(info.enumber).await);
        badges.push(format!("{}{icon}", info.enumber));
    }

    println!();
    println!(
        "== {} [{}]{} ==",
        snapshot.route,
        snapshot.phase,
        if snapshot.favorite { " ★" } else { "" }
    );
    if !badges.is_empty() {
        println!("Exercises: {}", badges.join(" "));
    }
    if snapshot.data_model_visible {
        println!("(data model shown)");
    }
    if let Some(feedback) = session.take_feedback().await {
        let icon = if feedback.polarity.is_positive() { "✓" } else { "✗" };
        println!("{icon} {}", feedback.full_text());
    }

    let markdown = render_workspace(&panes);
    if !markdown.is_empty() {
        println!();
        print!("{markdown}");
    }
}

async fn print_buffer(workspace: &Workspace) {
    let query = workspace.session().query().await;
    println!("--- buffer ---");
    println!("{query}");
    println!("--------------");
}

fn print_help(workspace: &Workspace) {
    let toolbar = workspace.session().toolbar();
    println!("Type SQL to add it to the buffer. Commands:");
    for (name, summary) in HELP {
        println!("  {name:<14} {summary}");
    }
    let chords: Vec<String> = Command::ALL
        .iter()
        .filter_map(|&command| {
            toolbar
                .accelerator_label(command)
                .map(|label| format!("{label} {command}"))
        })
        .collect();
    if !chords.is_empty() {
        println!("Chords: {}", chords.join(", "));
    }
}

const fn badge_icon(state: ExerciseState) -> &'static str {
    match state {
        ExerciseState::Default => "·",
        ExerciseState::Correct => "✓",
        ExerciseState::Wrong => "✗",
    }
}
