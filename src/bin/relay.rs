use tracing::info;

use relaychat::{Bridge, Config};

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

    info!("relaychat IRC relay");
    info!(
        "Bridging {} on {} to {:?} on {}",
        config.chat.room,
        config.chat.url(),
        config.irc.channels,
        config.irc.addr()
    );

    Bridge::new(config).run().await;
}
