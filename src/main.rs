use albumsync::album::SyncEvent;
use albumsync::config;
use albumsync::output::{self, Answer};
use albumsync::workspace::{Target, Workspace, WorkspaceError};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "albumsync")]
#[command(about = "Incremental photo album builder for Hugo/PhotoSwipe sites")]
#[command(long_about = "\
Incremental photo album builder for Hugo/PhotoSwipe sites

Run from a directory holding albumsync.toml. Every subdirectory with an
album.yml is an album:

  site-photos/
  ├── albumsync.toml               # Settings ('albumsync init' writes one)
  └── dogs/
      ├── album.yml                # Title, properties, photo list, hashes
      └── photos/
          ├── dog-1.jpg
          └── dog-2.jpg

'update' resizes new or changed photos into <output_dir>/<album>/ and
writes <markdown_dir>/<album>.md. Unchanged photos are skipped.")]
#[command(version = version_string())]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Coarser, faster smart-crop search
    #[arg(long, global = true)]
    fast: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a documented albumsync.toml into the current directory
    Init,
    /// Create a new album directory
    New {
        /// Album name; asked for when omitted
        name: Option<String>,
    },
    /// Bring derivatives, markdown and manifest up to date
    Update {
        /// Only this album
        name: Option<String>,
    },
    /// Remove generated markdown and derivatives
    Clean {
        /// Only this album
        name: Option<String>,
        /// Don't ask for confirmation
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let root = std::env::current_dir()?;

    match run(&cli, &root) {
        Err(e) if e.is_usage_error() => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
        result => Ok(result?),
    }
}

fn run(cli: &Cli, root: &Path) -> Result<(), WorkspaceError> {
    match &cli.command {
        Command::Init => {
            let path = config::write_stock_settings(root)?;
            println!("Wrote {}", path.display());
        }
        Command::New { name } => {
            let workspace = open_workspace(cli, root)?;
            let name = match name {
                Some(name) => name.clone(),
                None => prompt_line("Please provide a name for the new album: ")?,
            };
            let dir = workspace.new_album(&name)?;
            println!("Created {}", dir.display());
        }
        Command::Update { name } => {
            let workspace = open_workspace(cli, root)?;
            init_thread_pool(&workspace.settings);
            let target = Target::from_arg(name.clone());

            let (tx, rx) = mpsc::channel::<SyncEvent>();
            let base = root.to_path_buf();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_sync_event(&event, Some(&base)) {
                        println!("{line}");
                    }
                }
            });
            let result = workspace.update(&target, Some(&tx));
            drop(tx);
            printer.join().ok();

            let mut outcome = result?;
            for report in &outcome.reports {
                println!("{}", output::format_update_report(report));
            }
            if outcome.failures.is_empty() {
                println!("All albums updated.");
            } else {
                for (album, e) in &outcome.failures {
                    eprintln!("{album}: {e}");
                }
                return Err(outcome.failures.remove(0).1.into());
            }
        }
        Command::Clean { name, force } => {
            let workspace = open_workspace(cli, root)?;
            let target = Target::from_arg(name.clone());
            let stdin = io::stdin();
            let outcomes = workspace.clean(&target, *force, |question| {
                match output::ask_yes_no(question, true, &mut stdin.lock(), &mut io::stdout()) {
                    Ok(Answer::Yes) => true,
                    Ok(Answer::No) => false,
                    Ok(Answer::Quit) => std::process::exit(0),
                    Err(e) => {
                        tracing::error!("can't read answer: {e}");
                        false
                    }
                }
            })?;
            for outcome in &outcomes {
                println!("{}", output::format_clean_outcome(outcome, Some(root)));
            }
            println!("All albums cleaned.");
        }
    }

    Ok(())
}

/// Settings come from the file; runtime flags from the command line.
fn open_workspace(cli: &Cli, root: &Path) -> Result<Workspace, WorkspaceError> {
    let mut workspace = Workspace::open(root)?;
    workspace.settings.fast = cli.fast;
    Ok(workspace)
}

fn prompt_line(question: &str) -> io::Result<String> {
    print!("{question}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Log to stderr; `-v` raises this crate to debug, `-vv` to trace.
/// `RUST_LOG` adds further directives.
fn init_tracing(verbosity: u8) -> Result<(), Box<dyn std::error::Error>> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(format!("albumsync={level}").parse()?);
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

/// Initialize the rayon thread pool from `max_processes`.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(settings: &config::Settings) {
    let threads = config::effective_threads(settings);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
