// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deltastage::config::DEFAULT_CONFIG_PATH;
use deltastage::delta::{DeltaNameCodec, DeltaProcessor, ZstdDictPatcher};
use deltastage::filesystem::ContentIdentifier;
use deltastage::permissions::{validate_file_permissions, AssumeAnswer, Confirm, StdinConfirm};
use deltastage::{Config, Manifest, PermissionGuard};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "deltastage")]
#[command(author, version, about = "Apply update deltas into a content-addressed staging area", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the state directory (holds delta/ and staged/)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Override the install root used to resolve manifest paths
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending delta against the installed files of a manifest
    ApplyDeltas {
        /// Target manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Worker threads (default from config)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Check staged files for new or escalated dangerous permissions
    CheckPermissions {
        /// Target manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Accept dangerous permissions without prompting
        #[arg(short, long, conflicts_with = "assume_no")]
        yes: bool,

        /// Decline dangerous permissions without prompting
        #[arg(long)]
        assume_no: bool,
    },
    /// Decode a delta artifact name into source and target hashes
    ParseName {
        /// Artifact file name
        name: String,
    },
    /// Print the content identifier of a file
    Hash {
        /// File to identify
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(dir) = cli.state_dir {
        config.state.dir = dir;
    }
    if let Some(root) = cli.root {
        config.install.root = root;
    }

    match cli.command {
        Commands::ApplyDeltas { manifest, jobs } => {
            let manifest = Manifest::load(&manifest)
                .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
            let jobs = jobs.unwrap_or(config.sweep.jobs);

            let processor = DeltaProcessor::new(
                config.layout(),
                Box::new(config.identifier()),
                Box::new(ZstdDictPatcher),
            );
            let report = processor.run_parallel(&manifest, jobs)?;

            println!("Processed {} delta(s)", report.total());
            println!("  Applied: {}", report.applied);
            println!("  Already staged: {}", report.already_staged);
            if report.fallbacks() > 0 {
                println!("  Full downloads needed: {}", report.fallbacks());
            }
            if report.cleanup_failed > 0 {
                println!("  Cleanup failures: {}", report.cleanup_failed);
            }
            Ok(())
        }
        Commands::CheckPermissions {
            manifest,
            yes,
            assume_no,
        } => {
            let manifest = Manifest::load(&manifest)
                .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
            let guard = PermissionGuard::new(config.layout(), config.dangerous_bits());

            let confirm: Box<dyn Confirm> = if yes {
                Box::new(AssumeAnswer(true))
            } else if assume_no {
                Box::new(AssumeAnswer(false))
            } else {
                Box::new(StdinConfirm)
            };

            validate_file_permissions(&guard, manifest.installable(), confirm.as_ref())?;
            info!("Permission check passed");
            println!("Permissions OK");
            Ok(())
        }
        Commands::ParseName { name } => {
            let codec = DeltaNameCodec::new(config.hash.algorithm.hex_len());
            match codec.parse(&name) {
                Some(decoded) => {
                    println!("source: {}", decoded.source);
                    println!("target: {}", decoded.target);
                    Ok(())
                }
                None => Err(deltastage::Error::MalformedArtifactName(name).into()),
            }
        }
        Commands::Hash { path } => {
            let hash = config.identifier().identify(&path)?;
            println!("{}  {}", hash, path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_deltas() {
        let cli = Cli::parse_from([
            "deltastage",
            "--state-dir",
            "/tmp/state",
            "apply-deltas",
            "--manifest",
            "m.json",
            "-j",
            "4",
        ]);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/state")));
        match cli.command {
            Commands::ApplyDeltas { manifest, jobs } => {
                assert_eq!(manifest, PathBuf::from("m.json"));
                assert_eq!(jobs, Some(4));
            }
            _ => panic!("Expected apply-deltas"),
        }
    }

    #[test]
    fn test_yes_conflicts_with_assume_no() {
        let result = Cli::try_parse_from([
            "deltastage",
            "check-permissions",
            "--manifest",
            "m.json",
            "--yes",
            "--assume-no",
        ]);
        assert!(result.is_err());
    }
}
