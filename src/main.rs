// This is the entry point of the moderation host.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `host/` = Stdin/stdout adapter around the services
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the command loop until stdin closes

use escrow_guard::host::{serve, CommandHandler, HostConfig};
use escrow_guard::infra::moderation::SqliteModerationStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON responses.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store = SqliteModerationStore::connect(&config.database_url).await?;
    tracing::info!(database = %config.database_url, "Moderation store ready");

    let handler = CommandHandler::new(store, config.moderation);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(&handler, stdin, stdout).await?;

    tracing::info!("Input closed, shutting down");
    Ok(())
}
