//! # Policy Check CLI (`pchk`)
//!
//! ```bash
//! pchk --config ./config/pchk.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pchk init` | Create the SQLite database and run schema migrations |
//! | `pchk upload <file> --title .. --category ..` | Store, chunk, and index a policy file |
//! | `pchk policies` | List policy documents |
//! | `pchk ingest <id>` | Re-ingest a stored policy document |
//! | `pchk delete <id>` | Delete a policy document and its index entries |
//! | `pchk check "<text>"` | Analyze text against the indexed policies |
//! | `pchk logs` | List recent compliance checks |
//! | `pchk log <id>` | Show one compliance check |
//! | `pchk serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use policy_check::app::App;
use policy_check::commands::{self, UploadArgs};
use policy_check::{config, migrate, server};

/// Policy Check: retrieval-augmented compliance review of workplace text.
#[derive(Parser)]
#[command(
    name = "pchk",
    about = "Policy Check: check draft messages against company policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pchk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Upload a policy file (PDF, DOCX, TXT, or MD) and ingest it.
    Upload {
        /// Path to the policy file.
        file: PathBuf,

        #[arg(long)]
        title: String,

        /// Policy type: confidentiality, external_communication,
        /// data_privacy, security, or hr.
        #[arg(long)]
        category: String,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        version: Option<String>,
    },

    /// List policy documents, newest first.
    Policies,

    /// Re-extract, re-chunk, and re-index a policy document.
    Ingest {
        /// Document id.
        id: String,
    },

    /// Delete a policy document with its chunks, vectors, and stored file.
    Delete {
        /// Document id.
        id: String,
    },

    /// Check a piece of text for policy violations.
    Check {
        /// The text to check.
        text: String,

        /// Restrict retrieval to one department.
        #[arg(long)]
        department: Option<String>,

        /// Restrict retrieval to one policy type.
        #[arg(long)]
        category: Option<String>,

        /// Number of policy chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// List compliance checks, newest first.
    Logs {
        #[arg(long)]
        department: Option<String>,

        /// NONE, LOW, MEDIUM, or HIGH (case-insensitive).
        #[arg(long)]
        risk: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one compliance check as JSON.
    Log {
        /// Check id.
        id: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let app = App::from_config(&cfg).await?;
            match command {
                Commands::Upload {
                    file,
                    title,
                    category,
                    department,
                    version,
                } => {
                    commands::run_upload(
                        &app,
                        UploadArgs {
                            file: &file,
                            title: &title,
                            category: &category,
                            department,
                            version,
                        },
                    )
                    .await?;
                }
                Commands::Policies => commands::run_policies(&app).await?,
                Commands::Ingest { id } => commands::run_ingest(&app, &id).await?,
                Commands::Delete { id } => commands::run_delete(&app, &id).await?,
                Commands::Check {
                    text,
                    department,
                    category,
                    top_k,
                } => commands::run_check(&app, &text, department, category, top_k).await?,
                Commands::Logs {
                    department,
                    risk,
                    limit,
                } => commands::run_logs(&app, department, risk, limit).await?,
                Commands::Log { id } => commands::run_log(&app, &id).await?,
                Commands::Init | Commands::Serve => unreachable!("handled above"),
            }
        }
    }

    Ok(())
}
