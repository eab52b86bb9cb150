use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use settee_core::{BulkDocumentRequest, Config, Document, ViewOptions};
use settee_rs::{Client, Database};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod telemetry;

#[derive(Parser, Debug)]
#[command(name = "settee")]
#[command(about = "Command line client for CouchDB-style document databases")]
struct Cli {
    /// JSON configuration file
    #[arg(long, default_value = "settee.json")]
    config: PathBuf,
    /// Database to use instead of the configured one
    #[arg(long)]
    db: Option<String>,
    #[arg(long, default_value = "./logs")]
    log_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Server welcome object
    Info,
    #[command(flatten)]
    Db(DbCommand),
}

/// Commands that act on one database
#[derive(Subcommand, Debug)]
enum DbCommand {
    Get {
        id: String,
    },
    /// Create or update a document from JSON text
    Put {
        id: String,
        json: String,
    },
    Delete {
        id: String,
        rev: String,
    },
    View(ViewArgs),
    /// Submit a file holding a JSON array of documents to `_bulk_docs`
    Bulk {
        file: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        all_or_nothing: bool,
    },
    Compact,
    Security,
}

#[derive(clap::Args, Debug)]
struct ViewArgs {
    design: String,
    view: String,
    /// JSON key
    #[arg(long)]
    key: Option<String>,
    #[arg(long)]
    startkey: Option<String>,
    #[arg(long)]
    endkey: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long, action = ArgAction::SetTrue)]
    include_docs: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    descending: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match telemetry::init_telemetry(&cli.log_dir) {
        Ok(guard) => Some(guard),
        Err(error) => {
            eprintln!("warning: logging disabled: {error}");
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

fn load_config(path: &Path) -> Config {
    Config::load(&path.to_string_lossy()).unwrap_or_else(|_| {
        tracing::warn!("Failed to load {}, using defaults", path.display());
        Config::default()
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config);
    tracing::info!(url = %config.base_url(), auth = ?config.auth.mode, "settee starting");

    let client = Client::from_config(&config)?;
    let output = match cli.command {
        Commands::Info => client.server_info()?,
        Commands::Db(command) => {
            let name = cli
                .db
                .or(config.database.clone())
                .context("no database given; pass --db or set `database` in the config")?;
            run_database_command(&client.database(name), command)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_database_command(db: &Database, command: DbCommand) -> Result<Value> {
    let output = match command {
        DbCommand::Get { id } => match db.get_document(&id)? {
            Some(doc) => serde_json::to_value(doc)?,
            None => {
                tracing::info!(id = %id, "Document not found");
                Value::Null
            }
        },
        DbCommand::Put { id, json } => serde_json::to_value(db.create_document(&id, &json)?)?,
        DbCommand::Delete { id, rev } => serde_json::to_value(db.delete_document(&id, &rev)?)?,
        DbCommand::View(args) => {
            let options = view_options(&args)?;
            match db.view(&args.design, &args.view, &options)? {
                Some(result) => serde_json::to_value(result)?,
                None => Value::Null,
            }
        }
        DbCommand::Bulk {
            file,
            all_or_nothing,
        } => {
            let request = bulk_request(&file, all_or_nothing)?;
            let response = db.save_documents(&request)?;
            Value::Array(
                response
                    .items()
                    .iter()
                    .map(|item| match item {
                        settee_core::BulkItem::Saved { id, rev } => {
                            serde_json::json!({"id": id, "rev": rev})
                        }
                        settee_core::BulkItem::Failed { id, error, reason } => {
                            serde_json::json!({"id": id, "error": error, "reason": reason})
                        }
                    })
                    .collect(),
            )
        }
        DbCommand::Compact => db.compact()?,
        DbCommand::Security => serde_json::to_value(db.security()?)?,
    };
    Ok(output)
}

fn parse_key(flag: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("--{flag} must be JSON, got {text:?}"))
}

fn view_options(args: &ViewArgs) -> Result<ViewOptions> {
    let mut options = ViewOptions::new();
    if let Some(key) = &args.key {
        options = options.key(parse_key("key", key)?);
    }
    if let Some(key) = &args.startkey {
        options = options.startkey(parse_key("startkey", key)?);
    }
    if let Some(key) = &args.endkey {
        options = options.endkey(parse_key("endkey", key)?);
    }
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if args.include_docs {
        options = options.include_docs(true);
    }
    if args.descending {
        options = options.descending(true);
    }
    Ok(options)
}

fn bulk_request(path: &Path, all_or_nothing: bool) -> Result<BulkDocumentRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let docs: Vec<Document> = serde_json::from_str(&contents)
        .with_context(|| format!("{} must hold a JSON array of documents", path.display()))?;

    let mut request = BulkDocumentRequest::new().all_or_nothing(all_or_nothing);
    for doc in docs {
        request.push(doc);
    }
    Ok(request)
}
