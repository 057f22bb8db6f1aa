use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod error_map;
mod line_mode;
mod models;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use error_map::{emit_error, map_bundle_read, map_line_io};
pub(crate) use line_mode::{create_line_host, resolve_target, run_line_mode, start_npc};
#[cfg(test)]
pub(crate) use line_mode::{handle_line_cmd, run_line_mode_with_io, LineHost};
pub(crate) use models::{DialogTarget, LineCommandAction, NpcSelector};
pub(crate) use source_loader::read_bundle_json;
#[cfg(test)]
pub(crate) use source_loader::resolve_bundle_path;

/// Installs the stderr log subscriber. `RUST_LOG` overrides the `warn` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Mode::Run(args) => run_npc(args),
        Mode::Check(args) => run_check(args),
    }
}

fn run_npc(args: RunArgs) -> anyhow::Result<i32> {
    let bundle_json = read_bundle_json(&args.bundle)?;
    let (mut host, _) = create_line_host(&bundle_json, &[args.player])
        .with_context(|| format!("loading bundle {}", args.bundle))?;
    let selector = NpcSelector::parse(&args.npc);
    let target = resolve_target(&host, &selector, args.player, args.object)?;
    start_npc(&mut host, &selector, args.label.as_deref(), target)?;
    Ok(run_line_mode(&mut host, target)?)
}

fn run_check(args: CheckArgs) -> anyhow::Result<i32> {
    let bundle_json = read_bundle_json(&args.bundle)?;
    let (_, report) = create_line_host(&bundle_json, &[])?;
    println!("RESULT:OK");
    println!("NPCS:{}", report.npcs);
    println!("FUNCTIONS:{}", report.functions);
    println!("DUPLICATES:{}", report.duplicates);
    println!("CONSTANTS:{}", report.constants);
    for rejected in &report.rejected {
        println!("REJECTED_JSON:{}", serde_json::to_string(rejected)?);
    }
    Ok(if report.rejected.is_empty() { 0 } else { 2 })
}
