//! cairnkv CLI
//!
//! Admin tool over a cairnkv data directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use cairnkv::{
    collect_records, decode_str, encode_str, Config, DictionaryConfig, DictionaryId, EngineType,
    FixedCodec, KeyType, MasterTable, Record, Result,
};

/// cairnkv CLI
#[derive(Parser, Debug)]
#[command(name = "cairnkv")]
#[command(about = "Inspect and edit cairnkv dictionaries")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, global = true, default_value = "./cairnkv_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a dictionary and print its id
    Create {
        #[arg(short, long, value_enum, default_value = "bpp-tree")]
        engine: EngineArg,

        #[arg(short, long, value_enum, default_value = "signed")]
        key_type: KeyTypeArg,

        /// Key width in bytes
        #[arg(long, default_value = "4")]
        key_size: u32,

        /// Value width in bytes
        #[arg(long, default_value = "16")]
        value_size: u32,

        /// Slots, initial buckets or tower height depending on the engine
        #[arg(short, long, default_value = "0")]
        capacity: u64,
    },

    /// List registered dictionaries
    List,

    /// Show one dictionary's configuration
    Info { id: DictionaryId },

    /// Insert a record (overwrites with --upsert)
    Put {
        id: DictionaryId,
        key: String,
        value: String,

        #[arg(long)]
        upsert: bool,
    },

    /// Print the value stored under a key
    Get { id: DictionaryId, key: String },

    /// Delete every record under a key
    Del { id: DictionaryId, key: String },

    /// Print records, optionally bounded by an inclusive key range
    Scan {
        id: DictionaryId,

        #[arg(long)]
        lower: Option<String>,

        #[arg(long)]
        upper: Option<String>,
    },

    /// Delete a dictionary and its storage
    Drop { id: DictionaryId },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineArg {
    BppTree,
    FlatFile,
    FileHash,
    Hash,
    SkipList,
    LinearHash,
}

impl From<EngineArg> for EngineType {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::BppTree => EngineType::BppTree,
            EngineArg::FlatFile => EngineType::FlatFile,
            EngineArg::FileHash => EngineType::OpenAddressFileHash,
            EngineArg::Hash => EngineType::OpenAddressHash,
            EngineArg::SkipList => EngineType::SkipList,
            EngineArg::LinearHash => EngineType::LinearHash,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyTypeArg {
    Signed,
    Unsigned,
    Bytes,
}

impl From<KeyTypeArg> for KeyType {
    fn from(arg: KeyTypeArg) -> Self {
        match arg {
            KeyTypeArg::Signed => KeyType::Signed,
            KeyTypeArg::Unsigned => KeyType::Unsigned,
            KeyTypeArg::Bytes => KeyType::VariableLength,
        }
    }
}

// =============================================================================
// Key and Record Formatting
// =============================================================================

fn parse_key(config: &DictionaryConfig, raw: &str) -> Result<Vec<u8>> {
    let size = config.key_size as usize;
    match config.key_type {
        KeyType::Signed => parse_number::<i64>(raw)?.encode_key(size),
        KeyType::Unsigned => parse_number::<u64>(raw)?.encode_key(size),
        KeyType::VariableLength => Ok(encode_str(raw, size)),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| cairnkv::CairnError::InvalidArgument(format!("'{}' is not a valid integer key", raw)))
}

fn format_key(key_type: KeyType, key: &[u8]) -> String {
    let number = match key_type {
        KeyType::Signed => i64::decode(key).map(|v| v.to_string()),
        KeyType::Unsigned => u64::decode(key).map(|v| v.to_string()),
        KeyType::VariableLength => return decode_str(key),
    };
    number.unwrap_or_else(|_| format!("{:?}", key))
}

fn print_record(key_type: KeyType, record: &Record) {
    println!("{}\t{}", format_key(key_type, &record.key), decode_str(&record.value));
}

fn print_config(config: &DictionaryConfig) {
    println!(
        "{:>4}  {:<20} {:<15} key {:>3}  value {:>5}  capacity {}",
        config.id,
        format!("{:?}", config.engine_type),
        format!("{:?}", config.key_type),
        config.key_size,
        config.value_size,
        config.capacity
    );
}

// =============================================================================
// Commands
// =============================================================================

fn run(master: &mut MasterTable, command: Commands) -> Result<()> {
    match command {
        Commands::Create {
            engine,
            key_type,
            key_size,
            value_size,
            capacity,
        } => {
            let mut dictionary = master.initialize_dictionary(
                key_type.into(),
                key_size,
                value_size,
                capacity,
                engine.into(),
            )?;
            println!("{}", dictionary.id());
            dictionary.close()
        }

        Commands::List => {
            for config in master.entries()? {
                print_config(&config);
            }
            Ok(())
        }

        Commands::Info { id } => {
            let config = master.lookup(id)?;
            print_config(&config);
            let mut dictionary = master.load_dictionary(id)?;
            println!(
                "records: {}  write concern: {:?}",
                dictionary.len()?,
                dictionary.write_concern()?
            );
            dictionary.close()
        }

        Commands::Put {
            id,
            key,
            value,
            upsert,
        } => {
            let mut dictionary = master.load_dictionary(id)?;
            let config = *dictionary.config();
            let key = parse_key(&config, &key)?;
            let value = encode_str(&value, config.value_size as usize);
            let count = if upsert {
                dictionary.update(&key, &value)?
            } else {
                dictionary.insert(&key, &value)?
            };
            println!("{} record(s) written", count);
            dictionary.close()
        }

        Commands::Get { id, key } => {
            let mut dictionary = master.load_dictionary(id)?;
            let key = parse_key(dictionary.config(), &key)?;
            println!("{}", decode_str(&dictionary.get(&key)?));
            dictionary.close()
        }

        Commands::Del { id, key } => {
            let mut dictionary = master.load_dictionary(id)?;
            let key = parse_key(dictionary.config(), &key)?;
            println!("{} record(s) deleted", dictionary.delete(&key)?);
            dictionary.close()
        }

        Commands::Scan { id, lower, upper } => {
            let mut dictionary = master.load_dictionary(id)?;
            let config = *dictionary.config();
            let records = {
                let mut cursor = match (lower, upper) {
                    (None, None) => dictionary.all_records()?,
                    (lower, upper) => {
                        let lower = match lower {
                            Some(raw) => parse_key(&config, &raw)?,
                            None => open_bound(&config, true),
                        };
                        let upper = match upper {
                            Some(raw) => parse_key(&config, &raw)?,
                            None => open_bound(&config, false),
                        };
                        dictionary.range(lower, upper)?
                    }
                };
                collect_records(cursor.as_mut())?
            };
            for record in &records {
                print_record(config.key_type, record);
            }
            dictionary.close()
        }

        Commands::Drop { id } => {
            let dictionary = master.load_dictionary(id)?;
            master.delete_dictionary(dictionary)?;
            println!("dropped {}", id);
            Ok(())
        }
    }
}

/// Smallest or largest key of a dictionary's key type
fn open_bound(config: &DictionaryConfig, lowest: bool) -> Vec<u8> {
    let size = config.key_size as usize;
    let mut bound = vec![if lowest { 0x00 } else { 0xff }; size];
    if config.key_type == KeyType::Signed {
        // Two's complement: the sign bit lives in the last byte
        bound[size - 1] = if lowest { 0x80 } else { 0x7f };
    }
    bound
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cairnkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::debug!("cairnkv v{} on {}", cairnkv::VERSION, args.data_dir.display());

    let config = Config::builder().data_dir(&args.data_dir).build();
    let mut master = MasterTable::new(config);

    let result = master
        .initialize()
        .and_then(|_| run(&mut master, args.command))
        .and_then(|_| master.close());

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
