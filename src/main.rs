//! # LeadLens CLI (`leadlens`)
//!
//! The `leadlens` binary drives the lead sync pipeline: per-tenant lead
//! records are fetched, flattened into natural-language paragraphs,
//! change-detected, embedded, and upserted into an external vector store,
//! where they back retrieval-augmented question answering.
//!
//! ## Usage
//!
//! ```bash
//! leadlens --config ./leadlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `leadlens init` | Create the SQLite sync ledger |
//! | `leadlens tenants` | List registered tenants and their credential status |
//! | `leadlens sync <tenant>` | Sync a tenant's leads into the vector store |
//! | `leadlens ask <tenant> "<question>"` | Answer a question over synced leads |
//! | `leadlens serve http` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the sync ledger
//! leadlens init --config ./leadlens.toml
//!
//! # Sync one tenant, only leads assigned to a given user
//! leadlens sync acme --assigned-to-id usr_42 --config ./leadlens.toml
//!
//! # Re-embed everything regardless of change detection
//! leadlens sync acme --force --config ./leadlens.toml
//!
//! # Ask a question
//! leadlens ask acme "which leads in Pune are waiting on next steps?"
//!
//! # Start the HTTP server for CRM integration
//! leadlens serve http --config ./leadlens.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lead_lens::ask;
use lead_lens::config;
use lead_lens::db;
use lead_lens::docstore;
use lead_lens::server;
use lead_lens::sync::{self, SyncOptions};

/// LeadLens CLI — per-tenant lead normalization and incremental sync into
/// an external vector store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/leadlens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "leadlens",
    about = "LeadLens — lead normalization and incremental sync with question answering",
    version,
    long_about = "LeadLens fetches per-tenant CRM lead records, flattens them into \
    natural-language paragraphs, detects changes against a local sync ledger, embeds \
    changed leads, and upserts them into an external vector store. Synced data backs \
    retrieval-augmented question answering via the CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./leadlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the sync ledger.
    ///
    /// Creates the SQLite database file and the sync state table. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// List registered tenants and their credential status.
    ///
    /// Scans the credentials directory and shows which tenants have
    /// usable credentials. Useful for verifying configuration before
    /// running a sync.
    Tenants,

    /// Sync a tenant's leads into the vector store.
    ///
    /// Fetches all lead records for the tenant, flattens them, skips
    /// records unchanged since the last sync, embeds the rest, and
    /// upserts the vectors.
    Sync {
        /// Tenant name (matches `<tenant>.json` in the credentials directory).
        tenant: String,

        /// Only sync leads assigned to this user name.
        #[arg(long)]
        assigned_to: Option<String>,

        /// Only sync leads assigned to this user id.
        #[arg(long)]
        assigned_to_id: Option<String>,

        /// Ignore change detection — re-embed and re-upsert everything.
        #[arg(long)]
        force: bool,

        /// Show what would be synced without embedding or upserting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question over a tenant's synced leads.
    ///
    /// Embeds the question, retrieves the closest lead paragraphs from
    /// the tenant's index, and asks the language model to answer from
    /// that context only.
    Ask {
        /// Tenant name.
        tenant: String,

        /// The question to answer.
        question: String,
    },

    /// Start the JSON HTTP server.
    ///
    /// Exposes `/sync` and `/ask` for CRM backend integration.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            db::ensure_schema(&pool).await?;
            pool.close().await;
            println!("Sync ledger initialized successfully.");
        }
        Commands::Tenants => {
            let tenants = docstore::list_tenants(&cfg)?;
            if tenants.is_empty() {
                println!(
                    "No tenants registered in {}",
                    cfg.tenants.credentials_dir.display()
                );
            } else {
                println!("{:<24} {}", "TENANT", "CREDENTIALS");
                for (name, usable) in tenants {
                    let status = if usable { "ok" } else { "incomplete" };
                    println!("{:<24} {}", name, status);
                }
            }
        }
        Commands::Sync {
            tenant,
            assigned_to,
            assigned_to_id,
            force,
            dry_run,
        } => {
            let opts = SyncOptions {
                assigned_to,
                assigned_to_id,
                force_refresh: force,
                dry_run,
            };
            sync::run_sync(&cfg, &tenant, &opts).await?;
        }
        Commands::Ask { tenant, question } => {
            let result = ask::run_ask(&cfg, &tenant, &question).await?;
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &result.sources {
                    println!("  [{:.3}] {} — {}", source.score, source.id, source.snippet);
                }
            }
        }
        Commands::Serve { service } => match service {
            ServeService::Http => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
