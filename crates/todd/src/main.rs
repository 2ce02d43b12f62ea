//! todd: local data store with embedding side effects
//!
//! Logs, key-value entries and a small node/edge graph in SQLite. Every write
//! is embedded by a local Ollama model and the vector kept alongside the row.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use todd_embed::{EmbeddingBackend, OllamaClient, SharedEmbedder};
use todd_indexer::{IndexStats, VectorIndexer, run_statement};
use todd_store::{Database, EdgeInput, EntityKind};

/// Local data store with embedding side effects
#[derive(Parser)]
#[command(name = "todd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .todd directory (default: search for .todd/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .todd directory with config file and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Validate config and check the database and Ollama are reachable
    Check,

    /// Show which models are in use and which Ollama has installed
    Models,

    /// Execute one SQL statement, indexing the row it writes
    Exec {
        /// The statement
        sql: String,

        /// Positional parameter as JSON; bare words are taken as strings
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },

    /// Manage log entries
    #[command(subcommand)]
    Log(LogCommand),

    /// Manage key-value entries
    #[command(subcommand)]
    Kv(KvCommand),

    /// Manage graph nodes
    #[command(subcommand)]
    Node(NodeCommand),

    /// Manage graph edges
    #[command(subcommand)]
    Edge(EdgeCommand),

    /// Inspect and maintain stored vectors
    #[command(subcommand)]
    Vectors(VectorsCommand),

    /// Run a prompt against the generation model
    Prompt {
        /// Prompt text
        text: String,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Subcommand)]
enum LogCommand {
    /// Append a log entry
    Add {
        message: String,
        #[arg(long, default_value = "info")]
        level: String,
        /// Metadata as JSON
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Rewrite a log entry
    Update {
        id: i64,
        message: String,
        #[arg(long, default_value = "info")]
        level: String,
        /// Metadata as JSON
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Delete a log entry
    Delete { id: i64 },
    /// List log entries, newest first
    List,
}

#[derive(Subcommand)]
enum KvCommand {
    /// Insert or overwrite a key
    Set {
        key: String,
        /// Value as JSON; bare words are taken as strings
        value: String,
    },
    /// Delete a key
    Delete { key: String },
    /// List entries
    List,
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Create a node
    Add {
        #[arg(long)]
        label: Option<String>,
        /// Properties as JSON
        #[arg(long)]
        properties: Option<String>,
    },
    /// Rewrite a node
    Update {
        id: i64,
        #[arg(long)]
        label: Option<String>,
        /// Properties as JSON
        #[arg(long)]
        properties: Option<String>,
    },
    /// Delete a node and its edges
    Delete { id: i64 },
    /// List nodes
    List,
}

#[derive(clap::Args)]
struct EdgeArgs {
    source: i64,
    target: i64,
    #[arg(long)]
    label: Option<String>,
    /// Properties as JSON
    #[arg(long)]
    properties: Option<String>,
    /// Create an undirected edge
    #[arg(long)]
    undirected: bool,
}

impl EdgeArgs {
    fn into_input(self) -> EdgeInput {
        let mut edge = EdgeInput::new(self.source, self.target);
        if let Some(label) = self.label {
            edge = edge.with_label(label);
        }
        if let Some(properties) = self.properties.as_deref() {
            edge = edge.with_properties(parse_json_arg(properties));
        }
        if self.undirected {
            edge = edge.undirected();
        }
        edge
    }
}

#[derive(Subcommand)]
enum EdgeCommand {
    /// Create an edge between two nodes
    Add(EdgeArgs),
    /// Rewrite an edge
    Update {
        id: i64,
        #[command(flatten)]
        edge: EdgeArgs,
    },
    /// Delete an edge
    Delete { id: i64 },
    /// List edges
    List,
}

#[derive(Subcommand)]
enum VectorsCommand {
    /// List stored vectors
    List {
        /// Only vectors of this kind: log, node, edge or kv
        #[arg(long)]
        kind: Option<EntityKind>,
    },
    /// Remove vectors whose row no longer exists
    Prune,
}

/// Initialize logging for interactive use. Logs go to stderr so stdout stays JSON.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Load config from file or auto-discover from `.todd/config.toml`.
///
/// Returns the config and the path to the `.todd` directory (for resolving relative paths).
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        // Explicit path override - treat as path to .todd directory
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let todd_dir = config_file.parent().unwrap_or(path).to_path_buf();

        let config = Config::from_file(&config_file)?;
        info!("Loaded config from {}", config_file.display());
        return Ok((config, Some(todd_dir)));
    }

    // Auto-discover by walking up directory tree
    match Config::find_and_load() {
        Ok(Some((config, todd_dir))) => {
            tracing::debug!("Found config at {}", todd_dir.display());
            Ok((config, Some(todd_dir)))
        }
        Ok(None) => {
            tracing::debug!("No .todd/config.toml found, using defaults");
            Ok((Config::default(), None))
        }
        Err(e) => {
            tracing::warn!("Error searching for config: {}, using defaults", e);
            Ok((Config::default(), None))
        }
    }
}

/// Parse a command line value as JSON, falling back to a plain string.
fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Everything a data command needs.
struct App {
    db: Database,
    indexer: Option<VectorIndexer>,
}

impl App {
    fn open(config: &Config, todd_dir: Option<&Path>) -> Result<Self> {
        let db_path = config.resolve_database_path(todd_dir);
        let db = Database::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let indexer = if config.indexer.enabled {
            let embedder: SharedEmbedder = Arc::new(OllamaClient::new(config.ollama_config())?);
            Some(VectorIndexer::new(embedder, Arc::new(db.clone()))?)
        } else {
            tracing::debug!("Indexer disabled in config");
            None
        };

        Ok(Self { db, indexer })
    }

    /// Run a store call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> todd_store::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    /// Run a read and serialize what it returns.
    async fn read<T, F>(&self, f: F) -> Result<Value>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&Database) -> todd_store::Result<T> + Send + 'static,
    {
        Ok(serde_json::to_value(self.blocking(f).await?)?)
    }

    /// Run a typed mutation and index whatever it published.
    async fn mutate<T, F>(&self, f: F) -> Result<Value>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&Database) -> todd_store::Result<T> + Send + 'static,
    {
        let mut feed = self.db.subscribe();
        let result = self.blocking(f).await?;

        let changes = feed.drain();
        let indexing = match &self.indexer {
            Some(indexer) => indexer.process_all(changes).await,
            None => IndexStats::default(),
        };

        if indexing.failed > 0 {
            tracing::warn!(failed = indexing.failed, "Some vectors were not updated");
        }

        Ok(json!({ "result": result, "indexing": indexing }))
    }

    fn close(self) -> Result<()> {
        let Self { db, indexer } = self;
        drop(indexer);
        db.close()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let command = match cli.command {
        Commands::Init { force } => return init(cli.config, force),
        command => command,
    };

    let (config, todd_dir) = load_config(cli.config.as_ref())?;

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("{}", error);
        }
        anyhow::bail!("Invalid configuration ({} error(s))", errors.len());
    }

    match command {
        Commands::Check => check(&config, todd_dir.as_deref()).await,
        Commands::Models => models(&config).await,
        Commands::Prompt { text, model } => {
            let client = OllamaClient::new(config.ollama_config())?;
            let generation = client.generate(&text, model.as_deref(), None).await?;
            print_json(&generation)
        }
        command => {
            let app = App::open(&config, todd_dir.as_deref())?;
            let output = run_data_command(&app, command).await;
            let closed = app.close();
            print_json(&output?)?;
            closed
        }
    }
}

fn init(config_dir: Option<PathBuf>, force: bool) -> Result<()> {
    let todd_dir = config_dir.unwrap_or_else(|| PathBuf::from(config::TODD_DIR));
    let config_path = todd_dir.join(config::CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Create .todd directory if it doesn't exist
    if !todd_dir.exists() {
        std::fs::create_dir_all(&todd_dir)?;
        info!("Created {}/", todd_dir.display());
    }

    std::fs::write(&config_path, Config::default_file_contents())?;
    info!("Created {}", config_path.display());

    let db_path = Config::default().resolve_database_path(Some(&todd_dir));
    Database::probe(&db_path)
        .with_context(|| format!("Failed to create database at {}", db_path.display()))?;
    info!("Created {}", db_path.display());
    info!("Next steps:");
    info!("  1. Start Ollama and pull the embedding model");
    info!("  2. Run 'todd check' to verify the setup");
    Ok(())
}

async fn check(config: &Config, todd_dir: Option<&Path>) -> Result<()> {
    let db_path = config.resolve_database_path(todd_dir);
    let database = match Database::probe(&db_path) {
        Ok(()) => json!({ "path": db_path, "ok": true }),
        Err(e) => json!({ "path": db_path, "ok": false, "message": e.to_string() }),
    };

    let client = OllamaClient::new(config.ollama_config())?;
    let ollama = match client.health_check().await {
        Ok(()) => json!({ "url": client.config().base_url, "ok": true }),
        Err(e) => json!({
            "url": client.config().base_url,
            "ok": false,
            "class": format!("{:?}", e.class()),
            "message": e.to_string(),
        }),
    };

    print_json(&json!({ "database": database, "ollama": ollama }))
}

async fn models(config: &Config) -> Result<()> {
    let ollama_config = config.ollama_config();
    let client = OllamaClient::new(ollama_config.clone())?;

    let installed = match client.list_models().await {
        Ok(models) => json!(models),
        Err(e) => {
            tracing::warn!(error = %e, "Could not list installed models");
            Value::Null
        }
    };

    print_json(&json!({
        "baseUrl": ollama_config.base_url,
        "generationModel": ollama_config.models.generation_model(None),
        "embeddingModel": ollama_config.models.embedding_model(None),
        "installed": installed,
    }))
}

async fn run_data_command(app: &App, command: Commands) -> Result<Value> {
    match command {
        Commands::Exec { sql, params } => {
            let params: Vec<Value> = params.iter().map(|p| parse_json_arg(p)).collect();
            let response = run_statement(&app.db, app.indexer.as_ref(), &sql, &params).await;
            if let Some(warning) = &response.warning {
                tracing::warn!("{}", warning);
            }
            Ok(serde_json::to_value(response)?)
        }

        Commands::Log(command) => match command {
            LogCommand::Add {
                message,
                level,
                metadata,
            } => {
                let metadata = metadata.as_deref().map(parse_json_arg);
                app.mutate(move |db| db.insert_log(&level, &message, metadata.as_ref()))
                    .await
            }
            LogCommand::Update {
                id,
                message,
                level,
                metadata,
            } => {
                let metadata = metadata.as_deref().map(parse_json_arg);
                app.mutate(move |db| db.update_log(id, &level, &message, metadata.as_ref()))
                    .await
            }
            LogCommand::Delete { id } => app.mutate(move |db| db.delete_log(id)).await,
            LogCommand::List => app.read(|db| db.list_logs()).await,
        },

        Commands::Kv(command) => match command {
            KvCommand::Set { key, value } => {
                let value = parse_json_arg(&value);
                app.mutate(move |db| db.set_kv(&key, &value)).await
            }
            KvCommand::Delete { key } => app.mutate(move |db| db.delete_kv(&key)).await,
            KvCommand::List => app.read(|db| db.list_kv()).await,
        },

        Commands::Node(command) => match command {
            NodeCommand::Add { label, properties } => {
                let properties = properties.as_deref().map(parse_json_arg);
                app.mutate(move |db| db.insert_node(label.as_deref(), properties.as_ref()))
                    .await
            }
            NodeCommand::Update {
                id,
                label,
                properties,
            } => {
                let properties = properties.as_deref().map(parse_json_arg);
                app.mutate(move |db| db.update_node(id, label.as_deref(), properties.as_ref()))
                    .await
            }
            NodeCommand::Delete { id } => app.mutate(move |db| db.delete_node(id)).await,
            NodeCommand::List => app.read(|db| db.list_nodes()).await,
        },

        Commands::Edge(command) => match command {
            EdgeCommand::Add(edge) => {
                let edge = edge.into_input();
                app.mutate(move |db| db.insert_edge(&edge)).await
            }
            EdgeCommand::Update { id, edge } => {
                let edge = edge.into_input();
                app.mutate(move |db| db.update_edge(id, &edge)).await
            }
            EdgeCommand::Delete { id } => app.mutate(move |db| db.delete_edge(id)).await,
            EdgeCommand::List => app.read(|db| db.list_edges()).await,
        },

        Commands::Vectors(command) => match command {
            VectorsCommand::List { kind } => app.read(move |db| db.list_vectors(kind)).await,
            VectorsCommand::Prune => {
                let removed = app.blocking(|db| db.prune_orphaned_vectors()).await?;
                Ok(json!({ "removed": removed }))
            }
        },

        Commands::Init { .. } | Commands::Check | Commands::Models | Commands::Prompt { .. } => {
            anyhow::bail!("not a data command")
        }
    }
}
