use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kubroker-catalog")]
#[command(about = "Generate and inspect kubroker catalog descriptors")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate offering descriptors from offering configs
    Generate(GenerateArgs),
    /// Load a catalog directory and list its services and plans
    Check(CheckArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Directory of offering config files (*.json)
    #[arg(long = "in", value_name = "DIR")]
    pub input: PathBuf,

    /// Directory the <name>_generated.json descriptors are written to
    #[arg(long = "out", value_name = "DIR")]
    pub output: PathBuf,

    /// Overwrite existing descriptors (their service and plan IDs change)
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Catalog directory (descriptors and templates)
    #[arg(long, value_name = "DIR", env = "KUBROKER__BROKER__CATALOG_DIR", default_value = "assets/catalog")]
    pub dir: PathBuf,

    /// Also list every plan
    #[arg(long)]
    pub plans: bool,
}
