use clap::{Args, Parser, Subcommand};
use dir_mimic_core::HashMode;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dir-mimic")]
#[command(about = "Reshape a directory to mirror another one's layout", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a target directory and serve its catalog and the apply endpoint
    Serve(ServeArgs),
    /// Write a catalog of a source directory to an inventory file
    Inventory(InventoryArgs),
    /// Plan (and optionally apply) changes to a target from an inventory file
    Mirror(MirrorArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Directory to reconcile
    pub target: PathBuf,

    /// Identify files by sample hash (-H) or by another mode (--hash full)
    #[arg(short = 'H', long = "hash", num_args = 0..=1, default_missing_value = "sample")]
    pub hash_mode: Option<HashMode>,

    /// HTTP server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to 127.0.0.1 only
    #[arg(long)]
    pub localhost: bool,
}

#[derive(Debug, Args)]
pub struct InventoryArgs {
    /// Source directory to catalog
    pub source: PathBuf,

    /// Output inventory file (default: inventory-<timestamp>.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Identify files by sample hash (-H) or by another mode (--hash full)
    #[arg(short = 'H', long = "hash", num_args = 0..=1, default_missing_value = "sample")]
    pub hash_mode: Option<HashMode>,
}

#[derive(Debug, Args)]
pub struct MirrorArgs {
    /// Target directory to reconcile
    pub target: PathBuf,

    /// Inventory file describing the desired layout
    #[arg(short, long)]
    pub inventory: PathBuf,

    /// Execute the plan after confirmation (default is a dry run)
    #[arg(long)]
    pub doit: bool,

    /// Also delete target files that have no counterpart in the inventory
    #[arg(long)]
    pub delete_extra: bool,

    /// Print unchanged, moved, copied, missing and extra counts
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_hash_flag_forms() {
        let cli = Cli::try_parse_from(["dir-mimic", "serve", "/tmp", "-H"]).unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => assert_eq!(args.hash_mode, Some(HashMode::Sample)),
            other => panic!("unexpected {:?}", other),
        }

        let cli =
            Cli::try_parse_from(["dir-mimic", "serve", "--hash", "full", "-p", "9000", "/tmp"])
                .unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.hash_mode, Some(HashMode::Full));
                assert_eq!(args.port, Some(9000));
                assert!(!args.localhost);
            }
            other => panic!("unexpected {:?}", other),
        }

        let cli = Cli::try_parse_from(["dir-mimic", "serve", "/tmp", "--localhost"]).unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.hash_mode, None);
                assert!(args.localhost);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mirror_requires_inventory() {
        assert!(Cli::try_parse_from(["dir-mimic", "mirror", "/tmp"]).is_err());
        let cli = Cli::try_parse_from([
            "dir-mimic",
            "mirror",
            "/tmp",
            "--inventory",
            "inv.json",
            "--doit",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Mirror(args)) => {
                assert!(args.doit);
                assert!(!args.delete_extra);
                assert!(!args.verbose);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mirror_delete_extra_and_verbose() {
        let cli = Cli::try_parse_from([
            "dir-mimic",
            "mirror",
            "/tmp",
            "-i",
            "inv.json",
            "--delete-extra",
            "-v",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Mirror(args)) => {
                assert!(!args.doit);
                assert!(args.delete_extra);
                assert!(args.verbose);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
