// Fleet Admin - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Administrative CLI over the fleet document store.
// Usage:
//   fleet-admin init                                   # Write default config, create the store
//   fleet-admin status                                 # Show storage and record counts
//   fleet-admin get <path>                             # Print the value at a path
//   fleet-admin put <path> <json>                      # Set the value at a path
//   fleet-admin delete <path>                          # Remove the value at a path
//   fleet-admin create-key <name> -p data -p settings  # Create a key (secret shown once)
//   fleet-admin list-keys                              # Keys without secrets
//   fleet-admin auth --key <secret> --permission data  # One-shot authentication check
//   fleet-admin backup                                 # Snapshot the stored document

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fleet_admin::{
    auth::{self, AuthPolicy, AuthRequest},
    backend,
    config::{AdminConfig, CATEGORIES},
    keys, paths,
    store::PathStore,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fleet-admin")]
#[command(author = "Joseph Stone")]
#[command(version = "0.1.0")]
#[command(about = "Fleet Admin - IoT fleet administration over a path-addressed document store")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, default_value_os_t = paths::default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config if missing and initialize the store
    Init,

    /// Show storage backend, location and record counts
    Status,

    /// Print the value at a path
    Get {
        /// "/"-delimited path, e.g. settings/twilio_sid
        path: String,
    },

    /// Set the value at a path. The parent must exist
    Put {
        path: String,

        /// Value as JSON
        value: String,
    },

    /// Remove the value at a path
    Delete { path: String },

    /// Create an authentication key
    CreateKey {
        name: String,

        /// Permission to grant (repeatable)
        #[arg(short, long = "permission")]
        permissions: Vec<String>,

        /// Accept requests from any origin
        #[arg(long)]
        allow_any: bool,

        /// Whitelisted origin (repeatable)
        #[arg(long = "allowed-ip")]
        allowed_ips: Vec<String>,
    },

    /// List keys (secrets hidden)
    ListKeys,

    /// One-shot authentication check. Exits 1 on denial
    Auth {
        /// Key secret
        #[arg(long)]
        key: Option<String>,

        /// Permission the call requires
        #[arg(long)]
        permission: String,

        /// Caller origin address
        #[arg(long)]
        origin: Option<String>,

        #[arg(long)]
        node: Option<String>,

        #[arg(long)]
        device: Option<String>,

        /// Ownership policy
        #[arg(long, value_enum, default_value_t = Policy::Open)]
        policy: Policy,
    },

    /// Snapshot the stored document into the backup directory
    Backup,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Open,
    Node,
    Device,
    Either,
    Both,
    Optional,
    OverrideOnly,
}

impl From<Policy> for AuthPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Open => AuthPolicy::Open,
            Policy::Node => AuthPolicy::Node,
            Policy::Device => AuthPolicy::Device,
            Policy::Either => AuthPolicy::Either,
            Policy::Both => AuthPolicy::Both,
            Policy::Optional => AuthPolicy::Optional,
            Policy::OverrideOnly => AuthPolicy::OverrideOnly,
        }
    }
}

fn open_store(config: &AdminConfig) -> Result<PathStore> {
    let dir = config.db_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create storage dir {:?}", dir))?;

    let backend = backend::open_backend(&config.storage, &dir)
        .with_context(|| format!("Failed to open {} backend at {:?}", config.storage, dir))?;
    PathStore::open(backend, config.db.clone()).with_context(|| "Failed to load document")
}

fn load_config(path: &Path) -> Result<AdminConfig> {
    AdminConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init => {
            if !cli.config.exists() {
                if let Some(parent) = cli.config.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                AdminConfig::default()
                    .save(&cli.config)
                    .with_context(|| format!("Failed to write config {:?}", cli.config))?;
                println!("Wrote default config to {:?}", cli.config);
            }
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;
            println!("Store initialized ({} backend at {:?})", store.backend().name(), config.db_dir());
        }

        Commands::Status => {
            let config = load_config(&cli.config)?;
            let store = open_store(&config)?;

            println!("Fleet Admin v0.1.0");
            println!("Config:  {:?} (version {})", cli.config, config.version);
            println!("Backend: {}", store.backend().name());
            println!("Storage: {:?}", config.db_dir());
            println!("Device types: {}", config.devices.keys().cloned().collect::<Vec<_>>().join(", "));
            println!();
            for category in CATEGORIES {
                let count = store.get(category)?.as_object().map_or(0, Map::len);
                println!("  {:<10} {}", category, count);
            }
        }

        Commands::Get { path } => {
            let store = open_store(&load_config(&cli.config)?)?;
            let value = store.get(path)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }

        Commands::Put { path, value } => {
            let store = open_store(&load_config(&cli.config)?)?;
            let value: Value =
                serde_json::from_str(value).with_context(|| format!("Invalid value JSON: {}", value))?;
            store.put(path, value)?;
            println!("OK");
        }

        Commands::Delete { path } => {
            let store = open_store(&load_config(&cli.config)?)?;
            let removed = store.delete(path)?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }

        Commands::CreateKey { name, permissions, allow_any, allowed_ips } => {
            let store = open_store(&load_config(&cli.config)?)?;
            let key = keys::create_key(&store, name, permissions.clone(), *allow_any, allowed_ips.clone())?;
            println!("{}", serde_json::to_string_pretty(&key)?);
            println!();
            println!("Store the secret now. It is not shown again.");
        }

        Commands::ListKeys => {
            let store = open_store(&load_config(&cli.config)?)?;
            println!("{}", serde_json::to_string_pretty(&keys::list_keys(&store)?)?);
        }

        Commands::Auth { key, permission, origin, node, device, policy } => {
            let store = open_store(&load_config(&cli.config)?)?;

            let mut args = Map::new();
            for (name, value) in [("key", key), ("node", node), ("device", device)] {
                if let Some(v) = value {
                    args.insert(name.to_string(), Value::String(v.clone()));
                }
            }
            let request = AuthRequest::new(&args, origin.as_deref());

            match auth::authenticate(&store, &request, permission, (*policy).into()) {
                Ok(grant) => println!("{}", serde_json::to_string_pretty(&grant)?),
                Err(e) => {
                    println!("{}", serde_json::to_string_pretty(&e.to_json())?);
                    std::process::exit(1);
                }
            }
        }

        Commands::Backup => {
            let store = open_store(&load_config(&cli.config)?)?;
            let info = store.backend().backup()?;
            println!("backup: {:?}", info.path);
            println!("  Size: {} bytes", info.size);
            println!("  Checksum: {}", &info.checksum[..16]);
            println!("  OK");
        }
    }

    Ok(())
}
