#![forbid(unsafe_code)]
//! Build, tamper with, and verify a proof-of-work ledger from the command line.

use clap::{Parser, Subcommand};
use colored::*;
use powledger::blockchain::{Blockchain, UnsealedBlock};
use powledger::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mines four sample blocks, then tampers with one and validates again
    Demo {
        /// Required leading zero hex characters per block hash
        #[arg(long)]
        difficulty: Option<u32>,
    },
    /// Mines a run of blocks with wall-clock timestamps
    Mine {
        /// Number of blocks to append after genesis
        #[arg(long, default_value_t = 4)]
        blocks: u64,
        /// Required leading zero hex characters per block hash
        #[arg(long)]
        difficulty: Option<u32>,
        /// Seal blocks with a single hash instead of mining
        #[arg(long)]
        no_pow: bool,
        /// Write the resulting chain as JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Checks the integrity of an exported chain
    Verify {
        /// JSON file produced by `mine --export`
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Demo { difficulty } => {
            apply_overrides(&mut config, difficulty, false)?;
            demo(&config)?;
        }
        Commands::Mine {
            blocks,
            difficulty,
            no_pow,
            export,
        } => {
            apply_overrides(&mut config, difficulty, no_pow)?;
            mine(&config, blocks, export.as_deref())?;
        }
        Commands::Verify { path } => {
            verify(&path)?;
        }
    }

    Ok(())
}

fn apply_overrides(
    config: &mut Config,
    difficulty: Option<u32>,
    no_pow: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(difficulty) = difficulty {
        config.chain.difficulty = difficulty;
    }
    if no_pow {
        config.chain.proof_of_work = false;
    }
    config.validate()?;
    Ok(())
}

fn demo(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut chain = Blockchain::from_config(config)?;
    let samples = [
        (1, "23/01/2018", 4),
        (2, "24/01/2018", 6),
        (3, "25/01/2018", 12),
        (4, "26/01/2018", 16),
    ];

    for (index, timestamp, amount) in samples {
        println!("{}", format!("⛏️  Mining block {}...", index).bright_cyan());
        let block = chain.append(UnsealedBlock::new(index, timestamp, &json!({ "amount": amount }))?)?;
        print_block(block.index(), block.hash(), block.nonce());
    }

    report_validity(&chain);

    println!();
    println!("{}", "🔧 Rewriting block 1 to { amount: 100 } and rehashing it...".yellow());
    if let Some(block) = chain.block_mut(1) {
        block.overwrite_data(&json!({ "amount": 100 }))?;
        block.rehash()?;
    }
    report_validity(&chain);

    Ok(())
}

fn mine(config: &Config, count: u64, export: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut chain = Blockchain::from_config(config)?;
    let start_time = Instant::now();

    for index in 1..=count {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let candidate = UnsealedBlock::new(index, timestamp, &json!({ "amount": index * 2 }))?;
        let block = chain.append(candidate)?;
        print_block(block.index(), block.hash(), block.nonce());
    }

    println!(
        "{}",
        format!(
            "✅ Appended {} blocks in {:.3} seconds",
            count,
            start_time.elapsed().as_secs_f64()
        )
        .bright_green()
    );
    report_validity(&chain);

    if let Some(path) = export {
        std::fs::write(path, chain.to_json_pretty()?)?;
        println!("💾 Chain written to {}", path.display().to_string().bright_white());
    }

    Ok(())
}

fn verify(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let chain = Blockchain::from_json(&json)?;

    println!("Blocks:      {}", chain.len());
    match chain.difficulty() {
        Some(difficulty) => println!("Difficulty:  {}", difficulty),
        None => println!("Difficulty:  none (direct sealing)"),
    }
    report_validity(&chain);

    let underworked = chain.underworked_blocks();
    if !underworked.is_empty() {
        println!(
            "{}",
            format!("⚠️  Blocks without enough work: {:?}", underworked).yellow()
        );
    }

    chain.validate()?;
    Ok(())
}

fn print_block(index: u64, hash: &str, nonce: Option<u64>) {
    match nonce {
        Some(nonce) => println!("   #{:<4} {}  nonce {}", index, hash.bright_white(), nonce),
        None => println!("   #{:<4} {}", index, hash.bright_white()),
    }
}

fn report_validity(chain: &Blockchain) {
    match chain.validate() {
        Ok(()) => println!("{}", "🔗 Chain is valid".bright_green().bold()),
        Err(violation) => {
            println!("{}", "❌ Chain is NOT valid".red().bold());
            println!("   {}", violation.to_string().red());
        }
    }
}
