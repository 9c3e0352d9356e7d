//! Tessera CLI
//!
//! Command-line interface for inspecting and editing a Tessera store file.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tessera::{Backend, Command, Config, Engine, Output, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// Tessera CLI
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Block-chained document store")]
#[command(version)]
struct Args {
    /// Store file
    #[arg(short, long, default_value = "./tessera.db")]
    store: PathBuf,

    /// Backing medium
    #[arg(short, long, value_enum, default_value = "mapped")]
    backend: BackendArg,

    /// Payload bytes per block (only used when creating a store)
    #[arg(long, default_value_t = tessera::storage::DEFAULT_BLOCK_CAPACITY)]
    block_capacity: u64,

    /// Blocks added per growth step (only used when creating a store)
    #[arg(long, default_value_t = tessera::storage::DEFAULT_BLOCKS_PER_PAGE)]
    blocks_per_page: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Mapped,
    Stream,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write stdin (or --data) into a file at an offset
    Put {
        name: String,

        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Literal content instead of stdin
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Append stdin (or --data) to a file
    Append {
        name: String,

        #[arg(short, long)]
        data: Option<String>,
    },

    /// Splice stdin (or --data) into a file at an offset
    Insert {
        name: String,

        offset: u64,

        #[arg(short, long)]
        data: Option<String>,
    },

    /// Print a file (or a slice of it) to stdout
    Cat {
        name: String,

        #[arg(short, long, default_value = "0")]
        offset: u64,

        #[arg(short, long)]
        len: Option<u64>,
    },

    /// Delete a byte range from a file
    Remove {
        name: String,

        offset: u64,

        len: u64,
    },

    /// Delete a file
    Rm { name: String },

    /// Rename a file
    Mv { from: String, to: String },

    /// List files
    Ls,

    /// Show store statistics, or one file's location
    Stat { name: Option<String> },

    /// Verify the free list and file chains partition the store
    Check,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tessera=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.store)
        .backend(match args.backend {
            BackendArg::Mapped => Backend::Mapped,
            BackendArg::Stream => Backend::Stream,
        })
        .block_capacity(args.block_capacity)
        .blocks_per_page(args.blocks_per_page)
        .sync_strategy(SyncStrategy::OnClose)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&engine, args.command);

    // Close before reporting so a failed command still persists the directory
    if let Err(e) = engine.close() {
        tracing::error!("Failed to close store: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Put { name, offset, data } => {
            let data = content(data)?;
            report(engine.execute(Command::Write { name, offset, data })?)
        }
        Commands::Append { name, data } => {
            let data = content(data)?;
            report(engine.execute(Command::Append { name, data })?)
        }
        Commands::Insert { name, offset, data } => {
            let data = content(data)?;
            report(engine.execute(Command::Insert { name, offset, data })?)
        }
        Commands::Cat { name, offset, len } => {
            report(engine.execute(Command::Read { name, offset, len })?)
        }
        Commands::Remove { name, offset, len } => {
            report(engine.execute(Command::Remove { name, offset, len })?)
        }
        Commands::Rm { name } => report(engine.execute(Command::Delete { name })?),
        Commands::Mv { from, to } => report(engine.execute(Command::Rename { from, to })?),
        Commands::Ls => report(engine.execute(Command::List)?),
        Commands::Stat { name: Some(name) } => report(engine.execute(Command::Stat { name })?),
        Commands::Stat { name: None } => {
            let stats = engine.stats();
            println!("backend          {:?}", stats.backend);
            println!("block capacity   {}", stats.block_capacity);
            println!("blocks per page  {}", stats.blocks_per_page);
            println!("pages            {}", stats.pages);
            println!("blocks           {} ({} free)", stats.total_blocks, stats.free_blocks);
            println!("files            {}", stats.files);
            println!("live bytes       {}", stats.live_bytes);
            println!("store bytes      {}", stats.store_bytes);
            Ok(())
        }
        Commands::Check => {
            let report = engine.check()?;
            println!(
                "{} blocks: {} free, {} live, {} leaked across {} files",
                report.total_blocks,
                report.free_blocks,
                report.live_blocks,
                report.leaked.len(),
                report.files
            );
            if !report.is_clean() {
                println!("leaked: {:?}", report.leaked);
            }
            Ok(())
        }
    }
}

/// `--data` if given, otherwise all of stdin
fn content(data: Option<String>) -> io::Result<Vec<u8>> {
    match data {
        Some(data) => Ok(data.into_bytes()),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn report(output: Output) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Output::Done => {}
        Output::Bytes(bytes) => io::stdout().write_all(&bytes)?,
        Output::Count(count) => println!("{}", count),
        Output::Names(names) => names.iter().for_each(|name| println!("{}", name)),
        Output::Location(location) => println!(
            "first block {}, {} bytes",
            location.first_block, location.size
        ),
        Output::Deleted(found) => println!("{}", if found { "deleted" } else { "not found" }),
    }
    Ok(())
}
