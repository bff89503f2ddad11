use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "swapd")]
#[command(about = "swapd - Orchestrate BTC/XMR atomic swaps and a liquidity maker")]
pub struct Cli {
    /// Settings file (defaults to ~/.swapd/swapd.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the data directory from the settings file
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Use testnet (BTC testnet, XMR stagenet)
    #[arg(long)]
    pub testnet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Buy XMR with BTC from a seller
    Buy {
        /// Seller multiaddr, including /p2p/<peer-id>
        #[arg(long)]
        seller: String,

        /// Where the bought XMR is sent
        #[arg(long)]
        xmr_address: String,

        /// Where BTC is refunded if the swap is cancelled
        #[arg(long)]
        refund_address: String,

        /// Wallet sub-account funding the swap
        #[arg(long, default_value_t = swap_orchestrator::registry::DEFAULT_ACCOUNT_INDEX)]
        account: u32,
    },
    /// Resume an unfinished swap
    Resume {
        /// Swap id (see `swapd history`)
        swap_id: String,
    },
    /// Cancel a swap and refund the locked BTC
    CancelRefund {
        /// Swap id (see `swapd history`)
        swap_id: String,

        /// Root BIP32 key of the wallet that funded the swap
        #[arg(long, env = "SWAPD_ROOT_KEY", hide_env_values = true)]
        root_key: String,
    },
    /// Show swap history
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sellers registered at rendezvous peers
    Sellers {
        /// Rendezvous peer to query (defaults to the configured ones)
        #[arg(long)]
        rendezvous: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the maker in the foreground until Ctrl-C
    Maker,
    /// Print XMR prices as the price ticker reports them
    Price,
    /// Kill every process recorded by an earlier run
    KillOrphans,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: clap_complete::Shell,
    },
}
