// companion-chat - terminal front-end: generate an image or upload one, then edit it by chat

use art_companion::media;
use art_companion::{ChatEntry, CompanionConfig, Controller, GeminiGateway, ImageRef, Rejection, Snapshot};
use clap::Parser;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termimad::{MadSkin, crossterm::style::Color};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate and edit images with the power of AI chat", long_about = None)]
struct Args {
    /// Configuration file (default: <config dir>/art-companion/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory where generated and edited images are written
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model used to describe uploaded images
    #[arg(long)]
    describe_model: Option<String>,

    /// Model used for chat edits
    #[arg(long)]
    edit_model: Option<String>,

    /// Model used for text-to-image generation
    #[arg(long)]
    generate_model: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Upload(PathBuf),
    Generate(String),
    Say(String),
    Save(PathBuf),
    Reset,
    Dismiss,
    Status,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.starts_with('/') {
        return Some(match input {
            "exit" | "quit" => Command::Quit,
            _ => Command::Say(input.to_string()),
        });
    }

    let (name, arg) = match input.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (input, ""),
    };

    let command = match (name, arg.is_empty()) {
        ("/upload", false) => Command::Upload(PathBuf::from(arg)),
        ("/generate", false) => Command::Generate(arg.to_string()),
        ("/save", false) => Command::Save(PathBuf::from(arg)),
        ("/reset", _) | ("/new", _) => Command::Reset,
        ("/dismiss", _) => Command::Dismiss,
        ("/status", _) => Command::Status,
        ("/help", _) => Command::Help,
        ("/quit", _) | ("/exit", _) => Command::Quit,
        _ => Command::Unknown(input.to_string()),
    };
    Some(command)
}

fn create_markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();

    skin.headers[0].set_fg(Color::Magenta);
    skin.headers[1].set_fg(Color::Cyan);
    skin.bold.set_fg(Color::White);
    skin.italic.set_fg(Color::Magenta);
    skin.inline_code.set_fg(Color::Yellow);

    skin
}

fn print_help() {
    println!("Commands:");
    println!("  <text>             - Generate from a prompt (new session) or edit the current image");
    println!("  /generate <prompt> - Generate an image from text");
    println!("  /upload <path>     - Upload a PNG or JPEG image to edit");
    println!("  /save <path>       - Write the current image to a file");
    println!("  /status            - Show the session state");
    println!("  /dismiss           - Dismiss the current error");
    println!("  /reset             - Start over");
    println!("  /quit              - Exit");
    println!();
}

/// Prints whatever changed between published snapshots
struct Renderer {
    skin: MadSkin,
    output_dir: PathBuf,
    generation: u64,
    shown: usize,
    busy: bool,
    errors_seen: u64,
    saved: usize,
}

impl Renderer {
    fn new(output_dir: PathBuf) -> Self {
        Self {
            skin: create_markdown_skin(),
            output_dir,
            generation: 0,
            shown: 0,
            busy: false,
            errors_seen: 0,
            saved: 0,
        }
    }

    fn render(&mut self, snapshot: &Snapshot) {
        let session = &snapshot.session;

        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.shown = 0;
            if !session.mode.is_ready() && !session.is_busy {
                println!("\n{}\n", "── Started over ──".dark_grey());
            }
        }

        if session.is_busy && !self.busy {
            match &session.pending_prompt {
                Some(prompt) => println!("{} {}", "⏳ generating:".dark_grey(), prompt),
                None => println!("{}", "⏳ working...".dark_grey()),
            }
        }
        self.busy = session.is_busy;

        let start = self.shown.min(session.transcript.len());
        for entry in &session.transcript[start..] {
            self.print_entry(entry);
        }
        self.shown = session.transcript.len();

        if snapshot.errors_raised != self.errors_seen {
            if let Some(error) = &session.last_error {
                println!("{} {} {}", "Error:".red().bold(), error.as_str().red(), "(/dismiss)".dark_grey());
            }
            self.errors_seen = snapshot.errors_raised;
        }
    }

    fn print_entry(&mut self, entry: &ChatEntry) {
        match entry {
            ChatEntry::UserPrompt(text) => {
                println!("{} {}", "you ›".magenta().bold(), text);
            }
            ChatEntry::AiText(text) => {
                println!();
                self.skin.print_text(text);
                println!();
            }
            ChatEntry::AiImage(image) => match self.save(image) {
                Ok(path) => println!("{} {}", "🖼  image saved to".cyan(), path.display()),
                Err(e) => println!("{} could not save image: {}", "Error:".red().bold(), e),
            },
        }
    }

    fn save(&mut self, image: &ImageRef) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        self.saved += 1;
        let name = format!(
            "{}-{:03}.{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            self.saved,
            media::extension_for(image.mime_type())
        );
        let path = self.output_dir.join(name);
        std::fs::write(&path, image.bytes())?;
        Ok(path)
    }
}

async fn render_loop(mut rx: watch::Receiver<Snapshot>, mut renderer: Renderer) {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        renderer.render(&snapshot);
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn print_status(controller: &Controller) {
    let session = controller.session();
    println!("\nMode: {}", session.mode.as_str());
    match &session.current_image {
        Some(image) => println!("  Image: {} ({} bytes)", image.mime_type(), image.len()),
        None => println!("  Image: none"),
    }
    println!("  Transcript: {} entries", session.transcript.len());
    println!("  Busy: {}", if session.is_busy { "yes" } else { "no" });
    if let Some(error) = &session.last_error {
        println!("  Error: {}", error);
    }
    println!();
}

fn print_rejection(rejection: &Rejection) {
    println!("{} {}", "✗".red(), rejection);
}

/// Run a mutating operation in the background so `/reset` stays available
fn spawn_operation<F>(operation: F)
where
    F: Future<Output = Result<(), Rejection>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(rejection) = operation.await {
            print_rejection(&rejection);
        }
    });
}

async fn upload(controller: Controller, path: &Path) {
    let Some(mime_type) = media::mime_from_path(path) else {
        println!("{} {} is not a PNG or JPEG file", "✗".red(), path.display());
        return;
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mime_type = mime_type.to_string();
            spawn_operation(async move { controller.on_image_selected(bytes, &mime_type).await });
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            controller.report_error(format!("Could not read {}: {}", path.display(), e));
        }
    }
}

fn save_current(controller: &Controller, path: &Path) {
    let Some(image) = controller.session().current_image else {
        print_rejection(&Rejection::NoImage);
        return;
    };
    match std::fs::write(path, image.bytes()) {
        Ok(()) => println!("Saved {} ({} bytes)", path.display(), image.len()),
        Err(e) => println!("{} could not write {}: {}", "Error:".red().bold(), path.display(), e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("art_companion={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded .env file from {}", path.display()),
        Err(e) => tracing::debug!(".env file not loaded: {}", e),
    }

    let mut config = CompanionConfig::load(args.config.as_deref())?.with_env();
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(model) = args.describe_model {
        config.describe_model = model;
    }
    if let Some(model) = args.edit_model {
        config.edit_model = model;
    }
    if let Some(model) = args.generate_model {
        config.generate_model = model;
    }
    if let Some(secs) = args.timeout {
        config.request_timeout_secs = secs;
    }

    let gateway = GeminiGateway::from_config(&config)?;
    let controller = Controller::new(Arc::new(gateway)).with_timeout(config.request_timeout());

    println!("AI Art Companion v{}\n", env!("CARGO_PKG_VERSION"));
    println!("Models: {} (describe), {} (edit), {} (generate)", config.describe_model, config.edit_model, config.generate_model);
    println!("Images are saved to {}\n", config.output_dir.display());
    println!("Type a prompt to generate an image, or /upload <path> to edit your own.");
    print_help();

    let renderer = Renderer::new(config.output_dir.clone());
    let render_task = tokio::spawn(render_loop(controller.subscribe(), renderer));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Status => print_status(&controller),
            Command::Reset => controller.on_reset_requested(),
            Command::Dismiss => controller.on_error_dismissed(),
            Command::Save(path) => save_current(&controller, &path),
            Command::Unknown(input) => println!("Unknown command: {} (try /help)", input),
            Command::Upload(path) => upload(controller.clone(), &path).await,
            Command::Generate(prompt) => {
                let controller = controller.clone();
                spawn_operation(async move { controller.on_text_prompt_submitted(&prompt).await });
            }
            Command::Say(text) => {
                let controller = controller.clone();
                if controller.session().mode.is_ready() {
                    spawn_operation(async move { controller.on_chat_message_sent(&text).await });
                } else {
                    spawn_operation(async move { controller.on_text_prompt_submitted(&text).await });
                }
            }
        }
    }

    render_task.abort();
    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse_command("  a blue cat "), Some(Command::Say("a blue cat".to_string())));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("/upload ~/Pictures/bike.jpg"),
            Some(Command::Upload(PathBuf::from("~/Pictures/bike.jpg")))
        );
        assert_eq!(
            parse_command("/generate a futuristic city at sunset"),
            Some(Command::Generate("a futuristic city at sunset".to_string()))
        );
        assert_eq!(parse_command("/reset"), Some(Command::Reset));
        assert_eq!(parse_command("/dismiss"), Some(Command::Dismiss));
    }

    #[test]
    fn test_parse_missing_argument() {
        assert_eq!(parse_command("/upload"), Some(Command::Unknown("/upload".to_string())));
        assert_eq!(parse_command("/frobnicate x"), Some(Command::Unknown("/frobnicate x".to_string())));
    }

    #[test]
    fn test_renderer_tracks_generations() {
        let dir = std::env::temp_dir().join(format!("art-companion-render-{}", std::process::id()));
        let mut renderer = Renderer::new(dir.clone());

        let mut snapshot = Snapshot::default();
        snapshot.generation = 1;
        snapshot.session.mode = art_companion::Mode::TextToImage;
        snapshot.session.current_image = Some(ImageRef::new(vec![1, 2, 3], "image/png"));
        snapshot.session.transcript = vec![
            ChatEntry::UserPrompt("a blue cat".to_string()),
            ChatEntry::AiImage(ImageRef::new(vec![1, 2, 3], "image/png")),
        ];
        renderer.render(&snapshot);
        assert_eq!(renderer.shown, 2);
        assert_eq!(renderer.saved, 1);

        snapshot.generation = 2;
        snapshot.session = Default::default();
        renderer.render(&snapshot);
        assert_eq!(renderer.shown, 0);
        assert_eq!(renderer.generation, 2);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_renderer_reports_repeated_error() {
        let mut renderer = Renderer::new(std::env::temp_dir());

        let mut snapshot = Snapshot::default();
        snapshot.errors_raised = 1;
        snapshot.session.last_error = Some("boom".to_string());
        renderer.render(&snapshot);
        assert_eq!(renderer.errors_seen, 1);

        // cleared and raised again between two renders
        snapshot.errors_raised = 2;
        renderer.render(&snapshot);
        assert_eq!(renderer.errors_seen, 2);
    }
}
