use std::path::PathBuf;

use clap::{Parser, Subcommand};
use litscreen_common::ScreeningStage;

pub const DEFAULT_CONFIG_PATH: &str = "litscreen.toml";

#[derive(Parser, Debug)]
#[command(name = "litscreen", version, about = "Two-stage LLM literature screening")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "LITSCREEN_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to litscreen.toml"
    )]
    pub config: PathBuf,
    #[arg(long, global = true, help = "Print the run summary as JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the corpus against both keyword lists and select dual-mention documents.
    Filter,
    /// Screen the current candidates with one LLM stage.
    Screen {
        #[arg(long, value_parser = parse_stage)]
        stage: ScreeningStage,
    },
    /// Append stage-2 survivors to the review ledger.
    Export,
    /// Filter, both stages, then export.
    Run,
    /// Report counts from the record store and ledger.
    Summary,
}

fn parse_stage(s: &str) -> Result<ScreeningStage, String> {
    let n: u8 = s.parse().map_err(|_| format!("'{s}' is not a stage number"))?;
    ScreeningStage::try_from(n)
}
