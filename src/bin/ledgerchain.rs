#![forbid(unsafe_code)]
//! Command-line front end for a local ledger database.

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use ledgerchain::api::{AddBlockRequest, Ledger, ShowChainResult, TransferRequest};
use ledgerchain::config::{load_config, Config};
use ledgerchain::{ChainManager, ChainOptions, StartupMode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and genesis block, or report the existing chain
    Init,
    /// Mine a block holding one transfer per --transfer argument
    AddBlock {
        /// Transfer as FROM:TO:AMOUNT; repeat for several transfers in one block
        #[arg(long = "transfer", required = true, value_parser = parse_transfer)]
        transfers: Vec<TransferRequest>,
    },
    /// List every block from head to genesis
    ShowChain {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the spendable balance of an address
    Balance { address: String },
    /// Re-validate every block and link in the chain
    Verify,
}

fn parse_transfer(arg: &str) -> Result<TransferRequest, String> {
    let mut parts = arg.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), Some(amount)) if !from.is_empty() && !to.is_empty() => {
            let value = amount
                .parse::<u64>()
                .map_err(|e| format!("invalid amount '{}': {}", amount, e))?;
            Ok(TransferRequest {
                from: from.to_string(),
                to: to.to_string(),
                value,
            })
        }
        _ => Err(format!("expected FROM:TO:AMOUNT, got '{}'", arg)),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level()
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    let ledger = Ledger::new(ChainManager::open_path(
        &config.database.path,
        ChainOptions::from(&config),
    )?);

    let outcome = run(&cli.command, &ledger, &config);
    let shutdown = ledger.stop();

    if let Err(e) = &outcome {
        eprintln!("{} {}", "❌ Error:".red().bold(), e);
    }
    if let Err(e) = &shutdown {
        eprintln!("{} {}", "❌ Shutdown failed:".red().bold(), e);
    }
    outcome?;
    shutdown?;
    Ok(())
}

fn run(command: &Commands, ledger: &Ledger, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Init => {
            let chain = ledger.chain();
            let status = match chain.startup_mode() {
                StartupMode::Initialized => "Created new chain".bright_green(),
                StartupMode::Loaded => "Loaded existing chain".bright_cyan(),
                StartupMode::Recovered { adopted: true } => {
                    "Loaded chain and adopted an interrupted block".yellow()
                }
                StartupMode::Recovered { adopted: false } => {
                    "Loaded chain and discarded an interrupted block".yellow()
                }
            };
            println!("{} at {}", status, config.database.path.bright_white());
            println!("{}", chain);
        }
        Commands::AddBlock { transfers } => {
            let request = AddBlockRequest {
                transactions: transfers.clone(),
            };
            let result = ledger.add_block(&request)?;
            println!(
                "{} height {} hash {}",
                "✅ Block added:".bright_green().bold(),
                result.block_height.to_string().bright_white(),
                result.block_hash.bright_white()
            );
        }
        Commands::ShowChain { json } => {
            let shown = ledger.show_chain()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                print_chain(&shown);
            }
        }
        Commands::Balance { address } => {
            let balance = ledger.balance(address)?;
            println!(
                "{} {} ({} unspent outputs)",
                format!("💰 {}:", balance.address).bright_cyan(),
                balance.balance.to_string().bright_green().bold(),
                balance.utxo_count
            );
        }
        Commands::Verify => {
            let verified = ledger.chain().verify_chain()?;
            println!(
                "{} {} blocks verified",
                "✅ Chain is valid:".bright_green().bold(),
                verified
            );
        }
    }
    Ok(())
}

fn header_cell(title: &str) -> Cell {
    Cell::new(title)
        .fg(TableColor::Cyan)
        .add_attribute(Attribute::Bold)
}

fn print_chain(shown: &ShowChainResult) {
    println!(
        "{} {}",
        "Chain Head:".bright_cyan(),
        shown.chain_head.bright_white()
    );
    println!(
        "{} {}",
        "Chain Height:".bright_cyan(),
        shown.chain_height.to_string().bright_white()
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header_cell("Height"),
            header_cell("Timestamp"),
            header_cell("Block Hash"),
            header_cell("Prior Hash"),
            header_cell("Txns"),
            header_cell("Nonce"),
        ]);

    for block in &shown.blocks {
        table.add_row(vec![
            Cell::new(format!("#{}", block.height)).fg(TableColor::White),
            Cell::new(&block.timestamp).fg(TableColor::Grey),
            Cell::new(&block.block_hash).fg(TableColor::Green),
            Cell::new(&block.prev_block_hash).fg(TableColor::DarkGrey),
            Cell::new(block.txn_count).fg(TableColor::Yellow),
            Cell::new(block.nonce).fg(TableColor::White),
        ]);
    }

    println!("{}", table);
}
