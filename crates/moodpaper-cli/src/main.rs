use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use moodpaper_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS, WALLPAPER_SUGGESTIONS};
use moodpaper_contracts::wallpapers::{parse_data_url, GeneratedImage};
use moodpaper_engine::{
    EngineConfig, Phase, SaveOutcome, Session, SessionState, SubmitOutcome, ValidationStatus,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "moodpaper", version, about = "Describe a mood, get phone wallpapers")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct EngineArgs {
    /// Key-value file holding the saved API key.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// `imagen` or `dryrun`.
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Append session events as JSON lines to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Generate(GenerateArgs),
    Key(KeyArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = ".")]
    downloads: PathBuf,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[command(subcommand)]
    action: KeyAction,
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    /// Validate and save a key; an empty value clears the saved key.
    Set { value: String },
    /// Check a key (the saved one when omitted) without saving it.
    Test { value: Option<String> },
    Clear,
    Status,
}

const EXIT_NEEDS_CREDENTIAL: i32 = 2;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("moodpaper error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MOODPAPER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = resolve_config(&cli.engine, EngineConfig::from_env());
    let mut session = Session::from_config(&config)?;
    tracing::debug!(session_id = session.session_id(), provider = session.provider_name(), "session ready");
    match cli.command {
        Command::Chat(args) => {
            run_chat(&mut session, &args)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(&mut session, &args),
        Command::Key(args) => run_key(&mut session, args.action),
    }
}

fn resolve_config(args: &EngineArgs, mut config: EngineConfig) -> EngineConfig {
    if let Some(store) = args.store.as_ref() {
        config.store_path = store.clone();
    }
    if let Some(provider) = args
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config.provider = provider.to_ascii_lowercase();
    }
    if let Some(events) = args.events.as_ref() {
        config.events_path = Some(events.clone());
    }
    config
}

fn run_generate(session: &mut Session, args: &GenerateArgs) -> Result<i32> {
    println!("Generating wallpapers…");
    match session.submit(&args.prompt) {
        SubmitOutcome::Generated(_) => {
            let ids: Vec<String> = session
                .state()
                .images
                .iter()
                .map(|image| image.id.clone())
                .collect();
            for id in ids {
                let path = session
                    .download(&id, &args.out)
                    .with_context(|| format!("failed to save {id}"))?;
                println!("{}", path.display());
            }
            Ok(0)
        }
        SubmitOutcome::NeedsCredential => {
            eprintln!("No API key configured. Run `moodpaper key set <API key>` first.");
            Ok(EXIT_NEEDS_CREDENTIAL)
        }
        SubmitOutcome::Failed { message, .. } => bail!(message),
        SubmitOutcome::Ignored => bail!("prompt is empty"),
    }
}

fn run_key(session: &mut Session, action: KeyAction) -> Result<i32> {
    match action {
        KeyAction::Set { value } => match session.save_credential(&value)? {
            SaveOutcome::Saved => {
                println!("Key verified and saved.");
                Ok(0)
            }
            SaveOutcome::Cleared => {
                println!("Saved key cleared.");
                Ok(0)
            }
            SaveOutcome::Rejected => {
                eprintln!("Connection failed. Check the key and try again.");
                Ok(1)
            }
        },
        KeyAction::Test { value } => {
            let candidate = value
                .or_else(|| session.current_credential().map(|key| key.expose().to_string()))
                .unwrap_or_default();
            if candidate.trim().is_empty() {
                eprintln!("No key to test.");
                return Ok(EXIT_NEEDS_CREDENTIAL);
            }
            if session.test_credential(&candidate) {
                println!("Connection succeeded. The key is usable.");
                Ok(0)
            } else {
                eprintln!("Connection failed. Check the key and try again.");
                Ok(1)
            }
        }
        KeyAction::Clear => {
            session.clear_credential()?;
            println!("Saved key cleared.");
            Ok(0)
        }
        KeyAction::Status => {
            println!("{}", key_status_line(session, false));
            Ok(0)
        }
    }
}

fn run_chat(session: &mut Session, args: &ChatArgs) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    let mut reveal_key = false;

    println!("Moodpaper started. Describe a mood, or type /help for commands.");
    if session.current_credential().is_none() {
        println!("No API key configured yet. Use /key <API key> to add one.");
    }

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

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => break,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Anything else is sent as a wallpaper prompt.");
            }
            "generate" => {
                let prompt = intent.prompt.clone().unwrap_or_default();
                report_submit(session, &prompt, |session| session.submit(&prompt));
            }
            "suggest" => match intent.index() {
                Some(position) => match WALLPAPER_SUGGESTIONS.get(position - 1) {
                    Some(suggestion) => {
                        report_submit(session, suggestion, |session| session.submit(suggestion))
                    }
                    None => println!("No suggestion #{position}."),
                },
                None => {
                    for (idx, suggestion) in WALLPAPER_SUGGESTIONS.iter().enumerate() {
                        println!("  [{}] {}", idx + 1, suggestion);
                    }
                    println!("Use /suggest <n> to generate one.");
                }
            },
            "list" => print_batch(session.state()),
            "select" => match intent.index().and_then(|n| session.state().image_at(n)).cloned() {
                Some(image) => {
                    session.select(&image.id);
                    print_viewer(&image);
                }
                None => println!("/view needs the number of an image in the current batch."),
            },
            "deselect" => {
                session.deselect();
                println!("Viewer closed.");
            }
            "remix" => match target_image(session.state(), &intent) {
                Some(image) => {
                    let prompt = image.prompt.clone();
                    report_submit(session, &prompt, |session| session.remix(&image.id));
                }
                None => println!("Nothing to remix. Use /remix <n> or /view an image first."),
            },
            "download" => {
                let Some(image) = target_image(session.state(), &intent) else {
                    println!("Nothing to download. Use /download <n> or /view an image first.");
                    continue;
                };
                let dir = intent
                    .text_arg("dir")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.downloads.clone());
                match session.download(&image.id, &dir) {
                    Ok(path) => println!("Saved {}", path.display()),
                    Err(err) => println!("Download failed: {err}"),
                }
            }
            "open_settings" => {
                session.open_settings();
                print_settings(session, reveal_key);
            }
            "toggle_key_visibility" => {
                reveal_key = !reveal_key;
                println!("{}", key_status_line(session, reveal_key));
            }
            "test_key" => {
                let candidate = key_argument(&intent)
                    .map(str::to_string)
                    .or_else(|| session.current_credential().map(|key| key.expose().to_string()));
                let Some(candidate) = candidate else {
                    println!("No key to test. Use /test <API key>.");
                    continue;
                };
                session.open_settings();
                println!("Testing connection…");
                if session.test_credential(&candidate) {
                    println!("Connection succeeded. The key is usable.");
                } else {
                    println!("Connection failed. Check the key.");
                }
            }
            "save_key" => {
                let Some(value) = key_argument(&intent) else {
                    println!("Usage: /key <API key>. Use /clear_key to remove the saved key.");
                    continue;
                };
                session.open_settings();
                match session.save_credential(value) {
                    Ok(SaveOutcome::Saved) => println!("Key verified and saved."),
                    Ok(SaveOutcome::Cleared) => println!("Saved key cleared."),
                    Ok(SaveOutcome::Rejected) => {
                        println!("Connection failed. The key was not saved.")
                    }
                    Err(err) => println!("Could not save the key: {err}"),
                }
            }
            "clear_key" => match session.clear_credential() {
                Ok(()) => println!("Saved key cleared."),
                Err(err) => println!("Could not clear the key: {err}"),
            },
            "unknown" => {
                println!(
                    "Unknown command /{}. Type /help for commands.",
                    intent.text_arg("command").unwrap_or_default()
                );
            }
            other => println!("Unhandled action {other}."),
        }
    }

    Ok(())
}

fn report_submit(
    session: &mut Session,
    prompt: &str,
    submit: impl FnOnce(&mut Session) -> SubmitOutcome,
) {
    if !prompt.trim().is_empty() && !session.state().is_loading() {
        println!("Generating wallpapers for \"{prompt}\"…");
    }
    match submit(session) {
        SubmitOutcome::Generated(_) => print_batch(session.state()),
        SubmitOutcome::NeedsCredential => {
            println!("No API key configured. Use /key <API key> to save one.");
        }
        SubmitOutcome::Failed {
            message,
            authorization,
        } => {
            println!("Generation failed. Try again in a moment. ({message})");
            if authorization {
                println!("The API key looks invalid. Use /key <API key> to replace it.");
            }
        }
        SubmitOutcome::Ignored => {}
    }
}

/// Non-blank `/key` or `/test` argument.
fn key_argument(intent: &Intent) -> Option<&str> {
    intent
        .text_arg("key")
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Image named by the intent's index, else the one open in the viewer.
fn target_image(state: &SessionState, intent: &Intent) -> Option<GeneratedImage> {
    match intent.index() {
        Some(position) => state.image_at(position).cloned(),
        None => state.selected_image().cloned(),
    }
}

fn print_batch(state: &SessionState) {
    if state.images.is_empty() {
        println!("No wallpapers yet.");
        return;
    }
    if state.phase == Phase::Error {
        println!("Showing the previous batch.");
    }
    println!("Results (9:16):");
    for (idx, image) in state.images.iter().enumerate() {
        println!("{}", format_image_line(idx + 1, image));
    }
    println!("Use /view <n>, /remix <n> or /download <n>.");
}

fn print_viewer(image: &GeneratedImage) {
    println!("{}", image.id);
    println!("  \"{}\"", image.prompt);
    println!("  Use /remix, /download [dir] or /close.");
}

fn print_settings(session: &Session, reveal_key: bool) {
    println!("{}", key_status_line(session, reveal_key));
    let status = match session.state().validation {
        ValidationStatus::Unset => None,
        ValidationStatus::Testing => Some("testing connection…"),
        ValidationStatus::Valid => Some("connection succeeded"),
        ValidationStatus::Invalid => Some("connection failed"),
    };
    if let Some(status) = status {
        println!("Status: {status}");
    }
    println!("Use /key <API key> to save, /test [API key] to check, /clear_key to remove, /show_key to reveal.");
}

fn key_status_line(session: &Session, reveal_key: bool) -> String {
    match session.current_credential() {
        Some(key) if reveal_key => format!("API key: {}", key.expose()),
        Some(key) => format!("API key: {}", key.masked()),
        None => "API key: not configured".to_string(),
    }
}

fn format_image_line(position: usize, image: &GeneratedImage) -> String {
    let (mime, size) = match parse_data_url(&image.url) {
        Some((mime, payload)) => (mime, format_size(payload.len() / 4 * 3)),
        None => ("unknown", "?".to_string()),
    };
    format!("  [{position}] {} ({mime}, {size})", image.id)
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        return format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0));
    }
    if bytes >= 1024 {
        return format!("{} KB", bytes / 1024);
    }
    format!("{bytes} B")
}
