use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ns-cli")]
#[command(about = "Line-mode host for NPC script bundles")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Start an NPC and drive its dialogue from stdin.
    Run(RunArgs),
    /// Parse, validate and register a bundle without running anything.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "bundle")]
    pub(crate) bundle: String,
    #[arg(long = "npc")]
    pub(crate) npc: String,
    /// Event or label to start instead of the main entry point.
    #[arg(long = "label")]
    pub(crate) label: Option<String>,
    #[arg(long = "player", default_value_t = 1)]
    pub(crate) player: i32,
    /// Defaults to the npc id.
    #[arg(long = "object")]
    pub(crate) object: Option<i32>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "bundle")]
    pub(crate) bundle: String,
}
