use tracing::{error, info};

use filebox::{Application, Config, UserRepository};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = filebox::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        filebox::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    info!("filebox starting");

    let app = match Application::open(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to open filebox: {e}");
            std::process::exit(1);
        }
    };

    match UserRepository::new(app.db().pool()).count().await {
        Ok(count) => info!(users = count, "Database ready: {}", app.config().database.path),
        Err(e) => error!("Failed to count users: {e}"),
    }

    info!(
        max_upload_size = app.config().storage.max_upload_size,
        default_user_limit = app.config().storage.default_user_limit,
        "Blob storage ready: {}",
        app.storage().base_path().display()
    );

    app.close().await;
}
