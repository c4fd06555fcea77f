//! # apiary CLI
//!
//! The `apiary` binary manages a local collection of requests (HTTP, SQL,
//! gRPC, Redis, JQ, Markdown, and connection sources) stored in a single
//! JSON document, and executes them while recording their history.
//!
//! ## Usage
//!
//! ```bash
//! apiary --config ./config/apiary.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `apiary kinds` | List registered request kinds |
//! | `apiary list [--tree] [ids...]` | List requests, or show the directory tree |
//! | `apiary get <id>` | Show one request with its history |
//! | `apiary create <path> --kind <kind>` | Create a request |
//! | `apiary update <id> --data <json>` | Replace a request's payload |
//! | `apiary rename <id> <path>` | Move a request to another path |
//! | `apiary delete <id>` | Delete a request and its history |
//! | `apiary duplicate <id>` | Copy a request without its history |
//! | `apiary perform <id>` | Execute a request and record the response |
//! | `apiary query <source> <sql>` | Run SQL against a stored SQL source |
//! | `apiary call <source> <method> <path>` | Call an endpoint of a stored HTTP source |
//! | `apiary endpoints <source>` | List the endpoints an HTTP source describes |
//! | `apiary example <source> <method> <path>` | Show an example call to a described endpoint |
//!
//! Command results are printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use apiary::{commands, config, logging};

/// apiary: a local-first store for API requests and their execution history.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/apiary.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "apiary",
    about = "apiary: a local-first store for API requests and their execution history",
    version,
    long_about = "apiary keeps HTTP calls, SQL queries, gRPC invocations, Redis commands, \
    JQ transforms, and Markdown notes in one versioned JSON document, executes them, and \
    records every response with its timing."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/apiary.toml`. The store location, HTTP client
    /// settings, and log level are read from this file.
    #[arg(long, global = true, default_value = "./config/apiary.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List registered request kinds with their labels.
    Kinds,

    /// List stored requests.
    ///
    /// Without ids, prints every request ordered by path. With ids, prints
    /// exactly those requests and fails if any is missing.
    List {
        /// Print the directory tree with kind previews instead of payloads.
        #[arg(long)]
        tree: bool,

        /// Only these request ids.
        ids: Vec<String>,
    },

    /// Show a request, its payload, and its response history.
    Get {
        /// Request id.
        id: String,
    },

    /// Create a request.
    ///
    /// Without `--data`, the kind's default payload is used. Prints the new id.
    Create {
        /// Slash-delimited display path, e.g. `api/users/list`.
        path: String,

        /// Request kind: `http`, `sql`, `grpc`, `jq`, `redis`, `md`,
        /// `sql-source`, or `http-source`.
        #[arg(long)]
        kind: String,

        /// Initial payload as JSON. Missing fields take their defaults.
        #[arg(long)]
        data: Option<String>,
    },

    /// Replace the payload of a request. The kind cannot change.
    Update {
        /// Request id.
        id: String,

        /// New payload as JSON.
        #[arg(long)]
        data: String,
    },

    /// Move a request to another display path.
    Rename {
        /// Request id.
        id: String,

        /// New slash-delimited path.
        path: String,
    },

    /// Delete a request and its history.
    ///
    /// Deleting an id that does not exist succeeds and changes nothing.
    Delete {
        /// Request id.
        id: String,
    },

    /// Copy a request's payload, without history, to `<path> (n)`.
    Duplicate {
        /// Request id.
        id: String,
    },

    /// Execute a request and append the response to its history.
    Perform {
        /// Request id.
        id: String,
    },

    /// Run an ad-hoc query against a stored `sql-source`. Nothing is recorded.
    Query {
        /// Id of the `sql-source` request.
        source: String,

        /// SQL to run.
        query: String,
    },

    /// Call an endpoint of a stored `http-source`. Nothing is recorded.
    ///
    /// The source's auth settings are applied before any `--header`.
    Call {
        /// Id of the `http-source` request.
        source: String,

        /// HTTP method, e.g. `GET`.
        method: String,

        /// Path appended to the source's server URL, e.g. `/pet/{petId}`.
        path: String,

        /// Request body.
        #[arg(long)]
        body: Option<String>,

        /// Extra header as `key=value`. Repeatable.
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Query parameter as `key=value`. Repeatable.
        #[arg(long = "query")]
        query: Vec<String>,

        /// Value for a `{key}` in the path, as `key=value`. Repeatable.
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// List the endpoints described by an `http-source`'s API document.
    Endpoints {
        /// Id of the `http-source` request.
        source: String,
    },

    /// Show an example call to a described endpoint. Nothing is sent.
    Example {
        /// Id of the `http-source` request.
        source: String,

        /// HTTP method, e.g. `POST`.
        method: String,

        /// Path template as described, e.g. `/pet/{petId}`.
        path: String,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "apiary", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.log.level)?;

    match cli.command {
        Commands::Kinds => {
            commands::run_kinds(&cfg).await?;
        }
        Commands::List { tree, ids } => {
            commands::run_list(&cfg, tree, ids).await?;
        }
        Commands::Get { id } => {
            commands::run_get(&cfg, &id).await?;
        }
        Commands::Create { path, kind, data } => {
            commands::run_create(&cfg, &path, &kind, data.as_deref()).await?;
        }
        Commands::Update { id, data } => {
            commands::run_update(&cfg, &id, &data).await?;
        }
        Commands::Rename { id, path } => {
            commands::run_rename(&cfg, &id, &path).await?;
        }
        Commands::Delete { id } => {
            commands::run_delete(&cfg, &id).await?;
        }
        Commands::Duplicate { id } => {
            commands::run_duplicate(&cfg, &id).await?;
        }
        Commands::Perform { id } => {
            commands::run_perform(&cfg, &id).await?;
        }
        Commands::Query { source, query } => {
            commands::run_query(&cfg, &source, &query).await?;
        }
        Commands::Call {
            source,
            method,
            path,
            body,
            headers,
            query,
            params,
        } => {
            let endpoint =
                commands::endpoint_from_args(&method, &path, body, &headers, &query, &params)?;
            commands::run_call(&cfg, &source, endpoint).await?;
        }
        Commands::Endpoints { source } => {
            commands::run_endpoints(&cfg, &source).await?;
        }
        Commands::Example {
            source,
            method,
            path,
        } => {
            commands::run_example(&cfg, &source, &method, &path).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
