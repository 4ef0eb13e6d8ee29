//! insight-cli: terminal viewer for WorkLink Insight
//!
//! Talks to the aggregation service over HTTP and mirrors the browser view:
//! pick a user, step through their session photos, ask for a description and
//! keep the spoken rendering as an MP3.
//!
//! # Subcommands
//! - `users`                                 : list users recorded in the session
//! - `photos [--user <name>]`                : list photo URLs
//! - `analyze <photo-url> [--speak <file>] [--json]`: describe a photo
//! - `speak <text> --out <file>`             : synthesize speech to a file
//! - `browse`                                : interactive viewer

mod api;
mod viewer;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use api::InsightApi;
use viewer::Viewer;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3001";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "insight-cli",
    version,
    about = "WorkLink Insight: browse session photos and hear what is in them"
)]
struct Cli {
    /// Insight HTTP server URL (overrides INSIGHT_HTTP_URL env var)
    #[arg(long, env = "INSIGHT_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List user names found in the session
    Users,

    /// List photo URLs, optionally for one user
    Photos {
        /// Exact user name to filter by
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Describe a photo
    Analyze {
        photo_url: String,

        /// Also synthesize the description and write the MP3 here
        #[arg(long)]
        speak: Option<PathBuf>,

        /// Print the full completion choice as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize speech for text
    Speak {
        text: String,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Interactive viewer
    Browse,
}

// ============================================================================
// One-shot commands
// ============================================================================

fn do_users(api: &InsightApi) -> anyhow::Result<()> {
    let users = api.get_users()?;
    if users.is_empty() {
        eprintln!("No users found");
    }
    for (i, user) in users.iter().enumerate() {
        println!("{:>3}. {}", i + 1, user);
    }
    Ok(())
}

fn do_photos(api: &InsightApi, user: Option<&str>) -> anyhow::Result<()> {
    let photos = api.get_photos(user)?;
    if photos.is_empty() {
        eprintln!("No photos found");
    }
    for url in photos {
        println!("{}", url);
    }
    Ok(())
}

fn write_audio(path: &Path, audio: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, audio)?;
    eprintln!("Wrote {} bytes of audio/mpeg to {}", audio.len(), path.display());
    Ok(())
}

fn do_analyze(
    api: &InsightApi,
    photo_url: &str,
    speak: Option<&Path>,
    json_output: bool,
) -> anyhow::Result<()> {
    let analysis = api.analyze_image(photo_url)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&analysis.choice)?);
    } else {
        println!("{}", analysis.text);
    }

    if let Some(path) = speak {
        let audio = api.generate_speech(&analysis.text)?;
        write_audio(path, &audio)?;
    }
    Ok(())
}

fn do_speak(api: &InsightApi, text: &str, out: &Path) -> anyhow::Result<()> {
    let audio = api.generate_speech(text)?;
    write_audio(out, &audio)
}

// ============================================================================
// Interactive viewer
// ============================================================================

const BROWSE_HELP: &str = "\
Commands:
  select <n|name>   load photos for a user
  next | prev       move between photos
  analyze           describe the current photo and synthesize speech
  save <file>       write the current audio to an MP3 file
  show              redraw the view
  help              this text
  quit              exit";

/// Run the analysis → speech sequence for the current photo.
fn analyze_current(api: &InsightApi, view: &mut Viewer) {
    let (ticket, url) = match view.begin_analysis() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Cannot analyze: {}", e);
            return;
        }
    };

    match api.analyze_image(&url) {
        Ok(analysis) => {
            if !view.analysis_received(ticket, analysis.text) {
                return;
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            view.request_failed(ticket);
            return;
        }
    }
    println!("{}", view.render());

    let (ticket, text) = match view.begin_speech() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Cannot generate speech: {}", e);
            return;
        }
    };
    match api.generate_speech(&text) {
        Ok(audio) => {
            view.speech_received(ticket, audio);
        }
        Err(e) => {
            eprintln!("Error generating speech: {}", e);
            view.request_failed(ticket);
        }
    }
}

fn select(api: &InsightApi, view: &mut Viewer, key: &str) {
    let user = match view.resolve_user(key) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let ticket = view.select_user(&user);
    match api.get_photos(Some(&user)) {
        Ok(photos) => {
            view.photos_loaded(ticket, photos);
        }
        Err(e) => {
            eprintln!("Error selecting user: {}", e);
            view.request_failed(ticket);
        }
    }
}

fn do_browse(api: &InsightApi) -> anyhow::Result<()> {
    let mut view = Viewer::new();

    // One-shot user load
    match api.get_users() {
        Ok(users) => view.users_loaded(users),
        Err(e) => eprintln!("Error fetching users: {}", e),
    }
    println!("{}", view.render());
    println!("{}", BROWSE_HELP);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("insight> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => continue,
            "select" | "s" if !arg.is_empty() => select(api, &mut view, arg),
            "next" | "n" => {
                if let Err(e) = view.next() {
                    eprintln!("{}", e);
                }
            }
            "prev" | "p" => {
                if let Err(e) = view.previous() {
                    eprintln!("{}", e);
                }
            }
            "analyze" | "a" => analyze_current(api, &mut view),
            "save" if !arg.is_empty() => match view.stage().audio() {
                Some(audio) if audio.is_empty() => eprintln!("Audio is empty, nothing to save"),
                Some(audio) => {
                    if let Err(e) = audio.save(Path::new(arg)) {
                        eprintln!("Failed to write {}: {}", arg, e);
                    } else {
                        eprintln!("Saved {} bytes to {}", audio.len(), arg);
                    }
                }
                None => eprintln!("No audio yet"),
            },
            "show" => {}
            "help" | "?" => {
                println!("{}", BROWSE_HELP);
                continue;
            }
            "quit" | "q" | "exit" => break,
            _ => {
                eprintln!("Unknown command: {} (try 'help')", line);
                continue;
            }
        }
        println!("{}", view.render());
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let api = match InsightApi::new(&cli.server) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("insight-cli: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Users => do_users(&api),
        Commands::Photos { user } => do_photos(&api, user.as_deref()),
        Commands::Analyze {
            photo_url,
            speak,
            json,
        } => do_analyze(&api, &photo_url, speak.as_deref(), json),
        Commands::Speak { text, out } => do_speak(&api, &text, &out),
        Commands::Browse => do_browse(&api),
    };

    if let Err(e) = result {
        eprintln!("insight-cli ({}): {}", api.server(), e);
        std::process::exit(1);
    }
}
