use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rag_builder::config::Config;
use rag_builder::pipeline::RagService;
use rag_builder::server::{self, DEFAULT_PORT};
use rag_builder::{RagError, Result};

#[derive(Parser)]
#[command(name = "rag-builder")]
#[command(about = "Session-scoped document embedding and retrieval service")]
#[command(version)]
struct Cli {
    /// Directory for the session registry and vector database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Delete expired session collections and exit
    Cleanup,
    /// Show the session collections currently stored
    Status,
    /// Show the effective configuration
    Config,
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = data_dir {
        return Ok(dir);
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("rag-builder"))
        .ok_or_else(|| RagError::Config("Could not determine data directory".to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let config = Config::load(&data_dir).map_err(RagError::Other)?;

    match cli.command {
        Commands::Serve { port } => {
            let service = RagService::new(config).await?;
            server::serve(service, port).await?;
        }
        Commands::Cleanup => {
            let service = RagService::new(config).await?;
            let summary = service.cleanup().await?;
            println!(
                "Checked {} collections, deleted {}",
                summary.collections_checked, summary.collections_deleted
            );
            for deleted in &summary.deleted_collections {
                println!("  deleted {} (created {})", deleted.name, deleted.created_at);
            }
            for error in &summary.errors {
                eprintln!("  error: {}", error);
            }
        }
        Commands::Status => {
            let service = RagService::new(config).await?;
            let report = service.health().await;
            println!("Status: {}", report.status);
            println!("  vector store:    {}", report.services.vector_store);
            println!("  embedding model: {}", report.services.embedding_model);
            println!("  tokenizer:       {}", report.services.tokenizer);
            let sessions = service.list_sessions().await?;
            if sessions.is_empty() {
                println!("No session collections stored");
            } else {
                for info in sessions {
                    println!(
                        "{}: {} chunks, expires {}",
                        info.collection_name,
                        info.chunk_count.unwrap_or(0),
                        info.expires_at.map_or_else(String::new, |t| t.to_string()),
                    );
                }
            }
        }
        Commands::Config => {
            println!("Data directory: {}", config.get_base_dir().display());
            println!("{}", toml::to_string_pretty(&config).map_err(|e| {
                RagError::Config(format!("Failed to render configuration: {}", e))
            })?);
        }
    }

    Ok(())
}
