use anyhow::Context;
use clap::{Parser, Subcommand};
use pth::app::{handle_fatal_error, init_logging, AppConfig};
use pth::config::HarnessConfig;
use pth::error::{describe_error_code, ErrorCode};
use pth::plugin::{NixProcessControl, ProcessControl};
use pth::session::SessionManager;
use pth::subprocess::{ProcessRunner, TokioProcessRunner};
use pth::tools::{render_tool_list, serve, Harness};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Session and convergence engine for iterative plugin repair
#[derive(Parser)]
#[command(name = "pth", version)]
#[command(
    about = "Plugin test harness: test, fix and retest plugins on isolated session branches",
    long_about = None
)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a harness config file (overrides PTH_CONFIG)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON tool requests, one per line, on stdin/stdout
    Serve,
    /// Check whether a plugin is ready for a session
    Preflight {
        /// Plugin directory
        path: PathBuf,
    },
    /// List the available tool operations
    Tools {
        /// List error codes instead
        #[arg(long)]
        codes: bool,
    },
    /// Remove orphaned session workspaces
    Prune {
        /// Repository whose worktrees should be pruned
        repo: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app = AppConfig::new(cli.verbose).with_config_path(cli.config.clone());
    init_logging(&app);

    if let Err(e) = run(cli.command, &app).await {
        handle_fatal_error(e, app.verbose);
    }
}

async fn run(command: Commands, app: &AppConfig) -> anyhow::Result<()> {
    if let Commands::Tools { codes } = command {
        if codes {
            for code in ErrorCode::ALL {
                println!("{:24} {}", code.as_str(), describe_error_code(code));
            }
        } else {
            println!("{}", render_tool_list());
        }
        return Ok(());
    }

    let config = HarnessConfig::load(app.config_path.as_deref())?;
    debug!(?config, "Loaded configuration");
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let control: Arc<dyn ProcessControl> = Arc::new(NixProcessControl);
    let manager = SessionManager::new(config, runner.clone(), control.clone());

    match command {
        Commands::Serve => {
            let mut harness = Harness::new(manager, runner, control);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            serve(&mut harness, stdin, tokio::io::stdout()).await?;
            if let Some(session) = harness.session() {
                tracing::warn!(
                    branch = %session.state.branch,
                    "Input closed with a session still active; resume it with resume_session"
                );
            }
        }
        Commands::Preflight { path } => {
            let report = manager.preflight(&path).await;
            println!("{}", report.render());
            if !report.ready() {
                std::process::exit(1);
            }
        }
        Commands::Prune { repo } => {
            let root = manager
                .git()
                .repo_root(&repo)
                .await
                .with_context(|| format!("resolving repository at {}", repo.display()))?;
            let report = manager.workspaces().prune_orphans(&root).await?;
            if report.removed.is_empty() {
                println!("No orphaned workspaces found.");
            } else {
                println!("Removed {} orphaned workspaces:", report.removed.len());
                for path in &report.removed {
                    println!("  {}", path.display());
                }
            }
        }
        Commands::Tools { .. } => {}
    }
    Ok(())
}
