use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sb-cli")]
#[command(about = "Runs and checks block-structured test suites")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Runs the entry unit of a suite with the reference host.
    Run(RunArgs),
    /// Compiles a suite and reports its block structure.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "suite-dir")]
    pub(crate) suite_dir: String,
    #[arg(long = "entry-unit")]
    pub(crate) entry_unit: Option<String>,
    /// Base directory for data files; defaults to the suite directory.
    #[arg(long = "data-dir")]
    pub(crate) data_dir: Option<String>,
    #[arg(long = "max-steps")]
    pub(crate) max_steps: Option<usize>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "suite-dir")]
    pub(crate) suite_dir: String,
}
