use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Plan, apply and tear down resource instances", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the registered resource types and their attributes
    Resources(ResourcesArgs),

    /// Show what applying a manifest would change
    Plan(ManifestArgs),

    /// Apply a manifest, then tear everything down again
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ResourcesArgs {
    /// Only show this resource type
    #[arg(short = 't', long = "type")]
    pub resource_type: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest file (TOML or JSON)
    #[arg(env = "SWITCHYARD_MANIFEST")]
    pub manifest: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Output applied instances as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from(["switchyard", "-vv", "apply", "edge.toml", "--json"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.json);
                assert_eq!(args.manifest.manifest, Some(PathBuf::from("edge.toml")));
            }
            _ => panic!("expected apply"),
        }
    }
}
