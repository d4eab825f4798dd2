use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod simulate;

use init::InitCommand;
use simulate::SimulateCommand;

pub const EXAMPLES: &str = r"
  # Initialize a node with the default limits
  $ tesserad --home data/ init

  # Initialize with a tighter per-peer budget
  $ tesserad --home data/ init --base-token-rate 2 --global-total-rate 20

  # Sync advertisements from a simulated publisher
  $ tesserad --home data/ simulate --advertisements 20
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  TESSERA_HOME    Directory for config and data\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "sim")]
    Simulate(SimulateCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config and data
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_home_dir())]
    #[arg(env = "TESSERA_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(self.args).await,
            SubCommands::Simulate(simulate) => simulate.run(self.args).await,
        }
    }
}
