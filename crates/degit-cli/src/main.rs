//! degit command-line tool
//!
//! `degit <src> [dst]` copies a repository's files without its history.
//! `clone` is the default subcommand, so `degit user/repo` and
//! `degit clone user/repo` are equivalent.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use degit::{CancellationToken, Config};
use output::{resolve_color_choice, StyledOutput};
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "degit")]
#[command(about = "Copy a git repository without its history", long_about = None)]
#[command(version)]
struct Cli {
    /// Print progress and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Cache directory (overrides config file and DEGIT_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Color output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a repository into a local directory (default)
    Clone {
        /// Repository, e.g. user/repo, gitlab:user/repo/sub#v1.0.0
        src: String,
        /// Destination (defaults to the subdirectory or repository name)
        dst: Option<PathBuf>,
        /// Clone into an existing destination, replacing its contents
        #[arg(short, long)]
        force: bool,
    },

    /// Clear cached archives
    Clear {
        /// Only clear this repository's cache
        filter: Option<String>,
        /// Don't ask for confirmation
        #[arg(short = 'y', long, alias = "force")]
        yes: bool,
    },
}

/// Subcommand names recognized before falling back to `clone`
const SUBCOMMANDS: &[&str] = &["clone", "clear", "help"];

/// Global flags that consume the following argument
const VALUE_FLAGS: &[&str] = &["--cache-dir", "--color"];

/// Insert `clone` when the first positional argument is not a subcommand.
/// Help and version flags are left for clap.
fn with_default_subcommand(args: Vec<OsString>) -> Vec<OsString> {
    let mut expects_value = false;
    let mut insert_at = None;

    for (i, arg) in args.iter().enumerate().skip(1) {
        let Some(arg) = arg.to_str() else {
            insert_at = Some(i);
            break;
        };
        if expects_value {
            expects_value = false;
            continue;
        }
        if matches!(arg, "-h" | "--help" | "-V" | "--version") {
            return args;
        }
        if arg.starts_with('-') {
            expects_value = VALUE_FLAGS.contains(&arg);
            continue;
        }
        if SUBCOMMANDS.contains(&arg) {
            return args;
        }
        insert_at = Some(i);
        break;
    }

    let mut args = args;
    if insert_at.is_some() {
        args.insert(1, OsString::from("clone"));
    }
    args
}

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,degit=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel `token` once `signal` resolves. The signal is awaited on a
/// background thread with its own current-thread runtime.
fn cancel_when<F>(token: CancellationToken, signal: F) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("failed to start signal runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            match signal.await {
                Ok(()) => {
                    info!("interrupted, cancelling");
                    token.cancel();
                }
                Err(e) => warn!("failed to listen for Ctrl-C: {}", e),
            }
        });
    })
}

fn run(cli: Cli, out: &mut StyledOutput) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = cli.cache_dir {
        config = config.with_cache_dir(dir);
    }

    match cli.command {
        Commands::Clone { src, dst, force } => {
            let token = CancellationToken::new();
            cancel_when(token.clone(), tokio::signal::ctrl_c());
            commands::clone::execute(
                commands::clone::CloneArgs {
                    src,
                    dst,
                    force,
                    verbose: cli.verbose,
                },
                &config,
                token,
                out,
            )
        }
        Commands::Clear { filter, yes } => commands::clear::execute(
            commands::clear::ClearArgs { filter, yes },
            &config,
            &commands::clear::DialoguerConfirm,
            out,
        ),
    }
}

fn main() {
    let cli = Cli::parse_from(with_default_subcommand(std::env::args_os().collect()));
    init_logging(cli.verbose);

    let mut out = StyledOutput::new(resolve_color_choice(Some(&cli.color)));
    if let Err(e) = run(cli, &mut out) {
        out.stderr_error(&format!("error: {:#}\n", e));
        std::process::exit(1);
    }
}
