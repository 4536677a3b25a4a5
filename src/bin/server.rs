use tracing::{error, info};

use relaychat::{ChatServer, Config};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = relaychat::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        relaychat::logging::init_console_only(&config.logging.level);
    }

    info!("relaychat broadcast server");
    info!(
        "Config: port={} history_size={}",
        config.server.port, config.server.history_size
    );

    // Failure to bind is the one fatal startup error.
    let server = match ChatServer::bind(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!(
                "Failed to bind {}:{}: {}",
                config.server.host, config.server.port, e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server terminated: {e}");
        std::process::exit(1);
    }
}
