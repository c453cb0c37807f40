use clap::{Parser, Subcommand};

pub mod check;
pub mod config;
pub mod init_config;
pub mod logging;
pub mod run;
pub mod version;

use config::TrustOverrides;

#[derive(Parser)]
#[command(name = "clustertrust")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Keeps IPFS-Cluster trusted peers in sync with subnet commitments",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync daemon
    Run {
        /// Path to config file (default: ~/.config/clustertrust/config.toml)
        #[arg(long)]
        config: Option<String>,

        #[command(flatten)]
        overrides: TrustOverrides,

        /// Write the trusted peers on the first sync even if unchanged
        #[arg(long)]
        force_update: bool,
    },

    /// Evaluate every inscription once at the finalized head and print the result
    Check {
        /// Path to config file (default: ~/.config/clustertrust/config.toml)
        #[arg(long)]
        config: Option<String>,

        #[command(flatten)]
        overrides: TrustOverrides,

        /// Also write the resulting trusted peers to the cluster config
        #[arg(long)]
        write: bool,
    },

    /// Write a commented default config file
    InitConfig {
        /// Where to write it (default: ~/.config/clustertrust/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// IPFS-Cluster service.json to point the config at
        #[arg(long)]
        cluster_config: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            config,
            overrides,
            force_update,
        } => run::execute(config, overrides, force_update).await,
        Commands::Check {
            config,
            overrides,
            write,
        } => check::execute(config, overrides, write).await,
        Commands::InitConfig {
            config,
            cluster_config,
            force,
        } => init_config::execute(config, cluster_config, force),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
