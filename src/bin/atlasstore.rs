//! AtlasStore CLI
//!
//! Opens a store rooted at a data directory and works with a slot table of
//! strings kept in the store's static section.

use std::path::PathBuf;

use atlasstore::codec;
use atlasstore::context::{self, StoreContext};
use atlasstore::{
    AtlasError, BackingKind, CacheMode, Config, Persist, Result, SlotStore, StorageAddress,
    StorageEngine,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasStore CLI
#[derive(Parser, Debug)]
#[command(name = "atlasstore")]
#[command(about = "Embedded storage engine with slot-indexed objects")]
#[command(version)]
struct Args {
    /// Data directory (default: ./<executable name>_data)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Use anonymous memory instead of a file; nothing survives the process
    #[arg(short, long)]
    memory: bool,

    /// Maximum backing size in MB
    #[arg(long, default_value = "1024")]
    max_mb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store if it does not exist
    Init,

    /// Print engine counters
    Stats,

    /// Store a value and print its slot index
    Put {
        /// The value to store
        value: String,

        /// Explicit slot index (default: lowest free)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Print the value at a slot
    Get {
        /// The slot index
        index: usize,
    },

    /// Remove the value at a slot
    Clear {
        /// The slot index
        index: usize,
    },

    /// Print every present slot
    List,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::debug!("AtlasStore CLI v{}", atlasstore::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let data_dir = args.data_dir.unwrap_or_else(context::default_data_dir);
    let backing = if args.memory {
        BackingKind::Memory
    } else {
        BackingKind::File
    };

    let config = Config::builder()
        .data_dir(&data_dir)
        .backing(backing)
        .max_size(megabytes(args.max_mb)?)
        .build();

    let ctx = StoreContext::open(config)?;
    {
        let mut engine = ctx.lock();
        let (table, mut slots) = load_slots(&engine)?;
        let changed = execute(&args.command, &mut engine, &mut slots)?;
        if changed {
            save_slots(&mut engine, table, &slots)?;
        }
    }
    ctx.close()
}

/// Run one command; returns whether the slot table changed
fn execute(command: &Commands, engine: &mut StorageEngine, slots: &mut SlotStore<String>) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("store ready at {}", engine.data_dir().display());
            Ok(false)
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("slots present:     {}", slots.count());
            println!("backing bytes:     {}", stats.backing_len);
            println!("high-water offset: {}", stats.high_water_offset);
            println!("mapped bytes:      {}", stats.mapped_bytes);
            println!("free bytes:        {} in {} ranges", stats.free_bytes, stats.free_ranges);
            println!("intervals:         {}", stats.intervals);
            println!("next address:      {:#x}", stats.next_addr);
            Ok(false)
        }
        Commands::Put { value, index } => {
            let index = match index {
                Some(index) => {
                    slots.put_at(engine, value.clone(), *index)?;
                    *index
                }
                None => slots.put(engine, value.clone())?,
            };
            println!("{}", index);
            Ok(true)
        }
        Commands::Get { index } => {
            println!("{}", slots.get(engine, *index, CacheMode::Once)?);
            Ok(false)
        }
        Commands::Clear { index } => {
            let cleared = slots.clear(*index);
            println!("{}", if cleared { "cleared" } else { "(empty)" });
            Ok(cleared)
        }
        Commands::List => {
            slots.for_each(engine, 0, slots.len(), |index, value| {
                println!("{}\t{}", index, value);
            })?;
            Ok(false)
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Read the slot table whose address is recorded in the static section
fn load_slots(engine: &StorageEngine) -> Result<(Option<StorageAddress>, SlotStore<String>)> {
    let section = static_section(engine)?;
    // A zeroed section decodes as `None`
    let table: Option<StorageAddress> = codec::from_slice(&engine.read_bytes(section)?)?;
    let slots = match table {
        Some(address) => engine.load_object(address)?,
        None => SlotStore::new(),
    };
    Ok((table, slots))
}

/// Write the slot table back and record its address
fn save_slots(
    engine: &mut StorageEngine,
    table: Option<StorageAddress>,
    slots: &SlotStore<String>,
) -> Result<()> {
    let address = match table {
        Some(address) if slots.encoded_len() as u64 <= address.size => {
            engine.write_object(address, slots)?;
            address
        }
        previous => {
            let address = engine.store_object(slots)?;
            if let Some(previous) = previous {
                engine.erase(previous)?;
            }
            address
        }
    };
    let section = static_section(engine)?;
    engine.write_object(section, &Some(address))
}

fn megabytes(mb: u64) -> Result<u64> {
    mb.checked_mul(1024 * 1024)
        .ok_or_else(|| AtlasError::Config(format!("--max-mb {} is too large", mb)))
}

fn static_section(engine: &StorageEngine) -> Result<StorageAddress> {
    let section = engine.get_static_section();
    if section.is_null() {
        return Err(AtlasError::Config(
            "store was created without a static section".to_string(),
        ));
    }
    Ok(section)
}
