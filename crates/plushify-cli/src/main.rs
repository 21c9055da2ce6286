use std::fs;
use std::io::{self, ErrorKind, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plushify_contracts::commands::{parse_intent, STUDIO_HELP_COMMANDS};
use plushify_contracts::events::EventWriter;
use plushify_contracts::locale::{Language, COMMUNITY_URL};
use plushify_contracts::media::SourceImage;
use plushify_contracts::transform::{TransformOutcome, RESULT_FILE_NAME};
use plushify_contracts::workspace::{Phase, Workspace};
use plushify_engine::config::{load_dotenv, API_KEY_VAR};
use plushify_engine::PlushTransformer;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "plushify-rs",
    version,
    about = "Turn a character image into a designer plush toy photo"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Transform(TransformArgs),
    Studio(StudioArgs),
}

#[derive(Debug, Parser)]
struct TransformArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value = RESULT_FILE_NAME)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "en")]
    lang: Language,
    /// Also print the result as a `data:image/png;base64,...` URI.
    #[arg(long)]
    data_uri: bool,
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "en")]
    lang: Language,
}

const EVENTS_FILE_NAME: &str = "plushify-events.jsonl";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("plushify-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    load_dotenv(Path::new(".env"))?;
    match cli.command {
        Command::Transform(args) => run_transform_once(args),
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
    }
}

/// Owns the transform client and the event log for one front-end session.
/// Event log writes never end the session; failures go to stderr.
struct Session {
    transformer: PlushTransformer,
    events: EventWriter,
}

impl Session {
    fn open(events_path: PathBuf) -> Result<Self> {
        let session_id = format!("session-{}", Uuid::new_v4().simple());
        let events = EventWriter::new(events_path, session_id);
        let transformer = PlushTransformer::from_env()?.with_events(events.clone());
        Ok(Self::new(transformer, events))
    }

    fn new(transformer: PlushTransformer, events: EventWriter) -> Self {
        record_event(
            &events,
            "session_started",
            json!({
                "model": transformer.config().model,
                "api_base": transformer.config().api_base,
            }),
        );
        Self {
            transformer,
            events,
        }
    }

    fn select(&self, workspace: Workspace, source: SourceImage) -> Workspace {
        record_event(
            &self.events,
            "source_selected",
            json!({
                "label": source.label(),
                "mime_type": source.mime_type(),
                "bytes": source.byte_len(),
                "sha256": source.sha256(),
            }),
        );
        workspace.select_source(source)
    }

    fn set_language(&self, workspace: Workspace, language: Language) -> Workspace {
        record_event(
            &self.events,
            "language_changed",
            json!({
                "from": workspace.language().code(),
                "to": language.code(),
            }),
        );
        workspace.set_language(language)
    }

    fn transform(&self, workspace: Workspace) -> Workspace {
        drive_transform(workspace, |bytes, mime_type| {
            self.transformer.transform(bytes, mime_type)
        })
    }

    fn save(&self, workspace: &Workspace, target: &Path) -> Result<PathBuf> {
        let path = save_result(workspace, target)?;
        record_event(
            &self.events,
            "result_saved",
            json!({
                "path": path.to_string_lossy().to_string(),
                "bytes": workspace.result().map(|image| image.bytes().len()).unwrap_or(0),
            }),
        );
        Ok(path)
    }

    fn finish(&self, workspace: &Workspace) {
        record_event(
            &self.events,
            "session_finished",
            json!({
                "phase": workspace.phase().as_str(),
                "generation": workspace.generation(),
            }),
        );
    }
}

fn record_event(events: &EventWriter, event_type: &str, payload: Value) {
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        eprintln!("plushify event log write failed: {err:#}");
    }
}

fn run_transform_once(args: TransformArgs) -> Result<i32> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| default_events_path(&args.out));
    let session = Session::open(events_path)?;
    eprintln!("Event log: {}", session.events.path().display());
    let source = SourceImage::from_path(&args.image)?;
    let workspace = session.select(Workspace::new(args.lang), source);

    println!("{}", workspace.strings().transforming);
    let workspace = session.transform(workspace);
    print!("{}", render_workspace(&workspace));

    let code = if workspace.phase() == Phase::Succeeded {
        let path = session.save(&workspace, &args.out)?;
        println!("Saved {}", path.display());
        if args.data_uri {
            if let Some(result) = workspace.result() {
                println!("{}", result.to_data_uri());
            }
        }
        0
    } else {
        1
    };
    session.finish(&workspace);
    Ok(code)
}

fn run_studio(args: StudioArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join(EVENTS_FILE_NAME));
    let session = Session::open(events_path)?;
    eprintln!("Event log: {}", session.events.path().display());
    let mut workspace = Workspace::new(args.lang);

    let stdin = io::stdin();
    let mut line = String::new();

    print!("{}", render_workspace(&workspace));
    println!("Commands: {}", STUDIO_HELP_COMMANDS.join("  "));

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => continue,
            "help" => {
                println!("Commands: {}", STUDIO_HELP_COMMANDS.join("  "));
            }
            "quit" => break,
            "status" => {
                print!("{}", render_workspace(&workspace));
            }
            "upload" => {
                let Some(path) = intent.arg_str("path") else {
                    println!("/upload requires a path");
                    continue;
                };
                match SourceImage::from_path(Path::new(path)) {
                    Ok(source) => {
                        workspace = session.select(workspace, source);
                        print!("{}", render_workspace(&workspace));
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            "transform" => {
                if workspace.source().is_some() {
                    println!("{}", workspace.strings().transforming);
                }
                workspace = session.transform(workspace);
                print!("{}", render_workspace(&workspace));
            }
            "save" => {
                let target = intent
                    .arg_str("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.out.join(RESULT_FILE_NAME));
                match session.save(&workspace, &target) {
                    Ok(path) => println!("Saved {}", path.display()),
                    Err(err) => println!("{err:#}"),
                }
            }
            "set_language" => {
                match intent.arg_str("language").unwrap_or_default().parse::<Language>() {
                    Ok(language) => {
                        workspace = session.set_language(workspace, language);
                        print!("{}", render_workspace(&workspace));
                    }
                    Err(message) => println!("{message}"),
                }
            }
            "unknown" => {
                let command = intent.arg_str("command").unwrap_or_default();
                println!("Unknown command: /{command}. Type /help for commands.");
            }
            other => {
                println!("Unhandled action: {other}");
            }
        }
    }

    session.finish(&workspace);
    Ok(())
}

/// Runs one attempt through the workspace. Every path out of here leaves the
/// workspace interactive, including a panic inside `transform`.
fn drive_transform<F>(workspace: Workspace, transform: F) -> Workspace
where
    F: FnOnce(&[u8], &str) -> TransformOutcome,
{
    let (workspace, ticket) = workspace.begin_transform();
    let Some(ticket) = ticket else {
        return workspace;
    };
    let generation = ticket.generation;
    match panic::catch_unwind(AssertUnwindSafe(|| {
        transform(&ticket.image_bytes, &ticket.mime_type)
    })) {
        Ok(outcome) => workspace.resolve(generation, outcome),
        Err(_) => workspace.abort(generation),
    }
}

fn save_result(workspace: &Workspace, target: &Path) -> Result<PathBuf> {
    let Some(result) = workspace.result() else {
        bail!("no plush image to save yet; run /transform first");
    };
    let path = if target.is_dir() {
        target.join(RESULT_FILE_NAME)
    } else {
        target.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, result.bytes()).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn default_events_path(out: &Path) -> PathBuf {
    let dir = if out.is_dir() {
        out
    } else {
        out.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    };
    dir.join(EVENTS_FILE_NAME)
}

fn render_workspace(workspace: &Workspace) -> String {
    let t = workspace.strings();
    let mut out = String::new();
    out.push_str(&format!("{}  [{}]\n", t.title, workspace.language().code()));
    out.push_str(&format!("{}\n", t.subtitle));
    out.push_str(&format!("{}: {COMMUNITY_URL}\n\n", t.community));

    out.push_str(&format!("01 {} · {}\n", t.upload_title, t.upload_desc));
    match workspace.source() {
        Some(source) => out.push_str(&format!(
            "   {} ({}, {} bytes)\n",
            source.label(),
            source.mime_type(),
            source.byte_len()
        )),
        None => out.push_str(&format!("   {} (/upload <path>)\n", t.click_to_select)),
    }
    out.push_str(&format!("   [/transform] {}\n\n", t.transform_button));

    out.push_str(&format!("02 {} · {}\n", t.result_title, t.result_desc));
    if workspace.is_in_flight() {
        out.push_str(&format!("   {}\n", t.transforming));
    }
    match workspace.result() {
        Some(result) => out.push_str(&format!(
            "   {} ({}, {} bytes) [/save]\n",
            RESULT_FILE_NAME,
            result.mime_type(),
            result.bytes().len()
        )),
        None => out.push_str(&format!("   {}\n", t.result_placeholder)),
    }

    if let Some(error) = workspace.error() {
        out.push('\n');
        out.push_str(&format!("! {error}\n"));
        if error.starts_with("API_KEY_MISSING") {
            out.push_str(&format!(
                "  1. Export {API_KEY_VAR}=<your key> or add it to .env in this directory.\n"
            ));
            out.push_str("  2. Restart plushify-rs so the .env file is read again.\n");
        }
    }
    out
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
