//! Docvault server binary
//!
//! Run with: cargo run -p docvault --bin docvault-server
//! Set DOCVAULT_CONFIG to a TOML file to override defaults.

use docvault::{config::VaultConfig, server::VaultServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvault=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var_os("DOCVAULT_CONFIG").map(PathBuf::from);
    let config = VaultConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Storage root: {}", config.storage.root.display());
    tracing::info!("  - Quota per user: {} bytes", config.storage.quota_bytes);
    tracing::info!("  - Duplicate policy: {:?}", config.storage.duplicate_policy);
    tracing::info!("  - Strict extraction: {}", config.ingestion.strict_extraction);
    if config.embeddings.enabled {
        tracing::info!(
            "  - Embeddings: {} at {} ({} dims)",
            config.embeddings.model,
            config.embeddings.base_url,
            config.embeddings.dimensions
        );
    } else {
        tracing::info!("  - Embeddings: disabled");
    }

    let server = VaultServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints (identify with the 'user-id' header):");
    println!("  POST /api/documents - Upload a file");
    println!("  GET  /api/documents - List files");
    println!("  GET  /api/search    - Search (?q=&mode=&top_k=)");
    println!("  GET  /api/usage     - Quota usage");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
