use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

use repatch::commands::{
    apply_patches, check_patches, list_checkpoints, list_patches, revert_checkpoint, ApplyOptions,
    RevertTarget, Workspace,
};
use repatch::config::{apply_overrides, ConfigLoader, ConfigOverrides};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./repatch.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory patch targets are relative to
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Directory holding patch files
    #[arg(short, long, global = true)]
    patches_dir: Option<PathBuf>,

    /// Enable verbose logging and per-step reports
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches in file-name order
    Apply {
        /// Patch names, file stems or glob patterns (all when omitted)
        patches: Vec<String>,

        /// Show the diff, write nothing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Do not record checkpoints
        #[arg(long)]
        no_checkpoint: bool,

        /// Continue after a failing patch
        #[arg(short, long)]
        keep_going: bool,
    },

    /// Report which patches would apply, are applied, or would fail
    Check {
        patches: Vec<String>,
    },

    /// Print the diff each patch would produce
    Diff {
        patches: Vec<String>,
    },

    /// List available patches
    List {
        patches: Vec<String>,
    },

    /// List stored checkpoints
    Checkpoints,

    /// Restore a file from a checkpoint
    Revert {
        /// Checkpoint id or unique prefix
        #[arg(required_unless_present = "last", conflicts_with = "last")]
        id: Option<String>,

        /// Revert the most recent checkpoint
        #[arg(long)]
        last: bool,

        /// Restore even if the file changed since the patch
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // A missing .env is fine
    dotenv::dotenv().ok();

    repatch::init_with_logger(cli.verbose, std::io::stderr().is_terminal())?;

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader
        .load()
        .with_context(|| format!("Failed to load {}", loader.config_path().display()))?;

    let no_checkpoint = matches!(cli.command, Commands::Apply { no_checkpoint: true, .. });
    apply_overrides(
        &mut config,
        &ConfigOverrides {
            root: cli.root.clone(),
            patches_dir: cli.patches_dir.clone(),
            no_checkpoints: no_checkpoint,
        },
    );
    debug!("Effective configuration: {:?}", config);

    let workspace = Workspace::new(config);
    info!("Target root: {}", workspace.root.display());

    match cli.command {
        Commands::Apply {
            patches,
            dry_run,
            keep_going,
            ..
        } => {
            let options = ApplyOptions { dry_run, keep_going };
            let report = apply_patches(&workspace, &patches, options)
                .await
                .context("Failed to apply patches")?;
            print!("{}", report.render(dry_run, cli.verbose));
            Ok(exit_code(report.failures()))
        }
        Commands::Check { patches } => {
            let report = check_patches(&workspace, &patches)
                .await
                .context("Failed to check patches")?;
            print!("{}", report.render(false, cli.verbose));
            Ok(exit_code(report.failures()))
        }
        Commands::Diff { patches } => {
            let report = check_patches(&workspace, &patches)
                .await
                .context("Failed to diff patches")?;
            print!("{}", report.render(true, cli.verbose));
            Ok(exit_code(report.failures()))
        }
        Commands::List { patches } => {
            print!("{}", list_patches(&workspace, &patches)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Checkpoints => {
            print!("{}", list_checkpoints(&workspace).await?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Revert { id, last, force } => {
            let target = match id {
                Some(id) if !last => RevertTarget::Id(id),
                _ => RevertTarget::Latest,
            };
            println!("{}", revert_checkpoint(&workspace, target, force).await?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(failures: usize) -> ExitCode {
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
