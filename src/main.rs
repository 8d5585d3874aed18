// Entry point for the ledger command-line tool
use clap::Parser;
use data_encoding::HEXLOWER;
use ledger_chain::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Command, Ledger,
    LedgerError, Opt, Transaction, UTXOSet, Wallets, GLOBAL_CONFIG,
};
use log::{error, info, LevelFilter};
use std::process;

fn main() {
    // Info by default, RUST_LOG still wins when set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    apply_overrides(&opt);

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// Command-line flags take precedence over the environment
fn apply_overrides(opt: &Opt) {
    if let Some(dir) = &opt.data_dir {
        GLOBAL_CONFIG.set_data_dir(dir.clone());
    }
    if let Some(path) = &opt.wallet_file {
        GLOBAL_CONFIG.set_wallet_file(path.clone());
    }
    if let Some(difficulty) = opt.difficulty {
        GLOBAL_CONFIG.set_difficulty(difficulty);
    }
}

fn run_command(command: Command) -> Result<(), LedgerError> {
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(LedgerError::InvalidAddress(address));
            }
            let ledger = Ledger::create_blockchain(&address)?;
            // the index starts out as a full replay of the single genesis block
            UTXOSet::new(&ledger).reindex()?;
            ledger.close()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::load_default()?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let ledger = Ledger::open_default()?;
            let balance = UTXOSet::new(&ledger).get_balance(pub_key_hash.as_slice())?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::load_default()?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send {
            from,
            to,
            amount,
            miner,
        } => {
            if !validate_address(&from) {
                return Err(LedgerError::InvalidAddress(from));
            }
            if !validate_address(&to) {
                return Err(LedgerError::InvalidAddress(to));
            }
            if amount == 0 {
                return Err(LedgerError::Transaction(
                    "Amount must be positive".to_string(),
                ));
            }

            let wallets = Wallets::load_default()?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| LedgerError::Wallet(format!("No local wallet for {from}")))?;

            let mut ledger = Ledger::open_default()?;
            let tx = Transaction::new_utxo_transaction(wallet, &to, amount, &UTXOSet::new(&ledger))?;

            let mut transactions = vec![];
            if let Some(miner) = miner {
                if !validate_address(&miner) {
                    return Err(LedgerError::InvalidAddress(miner));
                }
                transactions.push(Transaction::new_coinbase_tx(&miner, "")?);
            }
            transactions.push(tx);

            // The block must be durable before the index sees it
            let block = ledger.append_block(&transactions)?;
            UTXOSet::new(&ledger).update(&block)?;
            ledger.close()?;
            info!("Transfer mined in block {}", block.get_hash_hex());
            println!("Success!")
        }
        Command::Printchain => {
            let ledger = Ledger::open_default()?;
            let mut invalid_blocks = 0;
            for (summary, block) in ledger.list_chain()?.into_iter().zip(ledger.iterator()) {
                let block = block?;
                println!("Pre block hash: {}", summary.pre_block_hash);
                println!("Cur block hash: {}", summary.hash);
                println!("Nonce: {}  Difficulty: {}", summary.nonce, summary.difficulty);
                println!("Transactions: {}", summary.transaction_count);
                println!("PoW: {}", summary.pow_valid);
                if !summary.pow_valid {
                    invalid_blocks += 1;
                }

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(pub_key_hash.as_slice()),
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        )
                    }
                }
                println!()
            }
            if invalid_blocks > 0 {
                error!("{invalid_blocks} block(s) failed proof-of-work validation");
            }
        }
        Command::Reindexutxo => {
            let ledger = Ledger::open_default()?;
            let utxo_set = UTXOSet::new(&ledger);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
    }
    Ok(())
}
