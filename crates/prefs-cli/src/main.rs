use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prefs_core::digest;
use prefs_core::store::parse_double;
use prefs_core::{MockApi, PrefValue, PreferenceStore, PrefsConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prefs")]
#[command(about = "Inspect and edit the encrypted preference store", long_about = None)]
struct Cli {
    /// Config file (defaults to the per-user config if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a typed preference
    Get {
        key: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "string")]
        ty: ValueType,
        /// Printed when the key is missing or holds another type
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Write a typed preference
    Set {
        key: String,
        value: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "string")]
        ty: ValueType,
    },

    /// Remove preferences in one commit
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Remove every preference
    Clear,

    /// Encrypted named values
    Secure {
        #[command(subcommand)]
        action: SecureAction,
    },

    /// The stored access token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Print every stored entry as JSON, secure entries still sealed
    Dump,

    /// Query the mock user API
    Sample {
        #[arg(default_value = "123")]
        id: String,
    },
}

#[derive(Subcommand)]
enum SecureAction {
    Get {
        name: String,
        #[arg(short, long)]
        default: Option<String>,
    },
    Set {
        name: String,
        value: String,
    },
    Remove {
        name: String,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    Get,
    Set { token: String },
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum ValueType {
    Int,
    Long,
    Float,
    Bool,
    String,
    Double,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(cli: &Cli) -> Result<PreferenceStore> {
    let mut config = PrefsConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    config.build_store().context("opening preference store")
}

fn read_typed(store: &PreferenceStore, key: &str, ty: ValueType) -> Option<String> {
    let value = store.medium().get(key)?;
    match ty {
        ValueType::Int => i32::from_value(value).map(|v| v.to_string()),
        ValueType::Long => i64::from_value(value).map(|v| v.to_string()),
        ValueType::Float => f32::from_value(value).map(|v| v.to_string()),
        ValueType::Bool => bool::from_value(value).map(|v| v.to_string()),
        ValueType::String => String::from_value(value),
        ValueType::Double => String::from_value(value)
            .and_then(|s| parse_double(&s).ok())
            .map(|v| v.to_string()),
    }
}

fn write_typed(store: &PreferenceStore, key: &str, raw: &str, ty: ValueType) -> Result<()> {
    let invalid = |ty: &str| anyhow!("{raw:?} is not a valid {ty}");
    match ty {
        ValueType::Int => store.set_int(key, raw.parse().map_err(|_| invalid("int"))?)?,
        ValueType::Long => store.set_long(key, raw.parse().map_err(|_| invalid("long"))?)?,
        ValueType::Float => store.set_float(key, raw.parse().map_err(|_| invalid("float"))?)?,
        ValueType::Bool => store.set_bool(key, raw.parse().map_err(|_| invalid("bool"))?)?,
        ValueType::String => store.set_string(key, raw)?,
        ValueType::Double => store.set_double(key, parse_double(raw)?)?,
    }
    Ok(())
}

fn print_or_default(value: Option<String>, default: Option<String>, what: &str) -> Result<()> {
    match value.or(default) {
        Some(v) => {
            println!("{v}");
            Ok(())
        }
        None => bail!("{what} is not set"),
    }
}

/// Raw entries as stored. Entries under a hashed name are flagged `sealed`.
fn dump(store: &PreferenceStore) -> Result<serde_json::Value> {
    let mut entries = serde_json::Map::new();
    for key in store.keys() {
        let Some(value) = store.medium().get(&key) else {
            continue;
        };
        let mut entry = serde_json::to_value(value)?;
        if let Some(fields) = entry.as_object_mut() {
            fields.insert("sealed".into(), digest::looks_hashed(&key).into());
        }
        entries.insert(key, entry);
    }
    Ok(serde_json::json!({
        "alias": store.alias(),
        "entries": entries,
    }))
}

fn fetch_sample(id: &str) -> Result<()> {
    let api = MockApi::new().context("starting mock api")?;
    let (tx, rx) = mpsc::channel();
    api.fetch_sample(id, move |sample| {
        let _ = tx.send(sample);
    });
    let sample = rx
        .recv_timeout(api.delay() + Duration::from_secs(5))
        .map_err(|_| anyhow!("mock api did not answer"))?;
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Sample { id } = &cli.command {
        return fetch_sample(id);
    }

    let store = open_store(&cli)?;

    match cli.command {
        Commands::Get { key, ty, default } => {
            print_or_default(read_typed(&store, &key, ty), default, &key)?;
        }

        Commands::Set { key, value, ty } => {
            write_typed(&store, &key, &value, ty)?;
        }

        Commands::Remove { keys } => {
            store.remove(&keys)?;
        }

        Commands::Clear => {
            store.clear()?;
        }

        Commands::Secure { action } => match action {
            SecureAction::Get { name, default } => {
                let value = store.get_secure_string(&name, default.as_deref());
                print_or_default(value, None, &name)?;
            }
            SecureAction::Set { name, value } => {
                store.set_secure_string(&name, Some(&value))?;
            }
            SecureAction::Remove { name } => {
                store.remove_secure(&name)?;
            }
        },

        Commands::Token { action } => match action {
            TokenAction::Get => print_or_default(store.access_token(), None, "access token")?,
            TokenAction::Set { token } => store.set_access_token(Some(&token))?,
            TokenAction::Clear => store.set_access_token(None)?,
        },

        Commands::Dump => {
            println!("{}", serde_json::to_string_pretty(&dump(&store)?)?);
        }

        Commands::Sample { .. } => {}
    }

    Ok(())
}
