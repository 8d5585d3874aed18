use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ledger-chain", about = "Single-node proof-of-work ledger")]
pub struct Opt {
    #[arg(
        long = "data-dir",
        global = true,
        help = "Directory holding the ledger database (overrides LEDGER_DATA_DIR)"
    )]
    pub data_dir: Option<String>,
    #[arg(
        long = "wallet-file",
        global = true,
        help = "Wallet file location (overrides LEDGER_WALLET_FILE)"
    )]
    pub wallet_file: Option<String>,
    #[arg(
        long = "difficulty",
        global = true,
        value_parser = clap::value_parser!(u32).range(1..=255),
        help = "Proof-of-work difficulty in leading zero bits for a new ledger (overrides LEDGER_DIFFICULTY)"
    )]
    pub difficulty: Option<u32>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new ledger")]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "send", about = "Send value between addresses and mine it")]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(
            long = "miner",
            help = "Also mint the block reward to this address"
        )]
        miner: Option<String>,
    },
    #[command(name = "printchain", about = "Print every block and audit its proof of work")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild UTXO index set")]
    Reindexutxo,
}
