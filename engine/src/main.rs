// Elicit adaptive interview engine
// Main entry point for the elicit binary

use clap::Parser;
use elicit_engine::cli::{Cli, Command, ConfigAction};
use elicit_engine::config::Config;
use elicit_engine::handlers::{
    handle_config_check, handle_config_show, handle_inspect, handle_sessions, handle_simulate,
    OutputFormat,
};
use elicit_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!("Elicit v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Simulate {
            script,
            session,
            ephemeral,
        } => {
            tracing::info!("Simulating script: {}", script.display());
            handle_simulate(&script, session, ephemeral, &config, format).await
        }

        Command::Inspect { session } => {
            tracing::info!("Inspecting session: {}", session);
            handle_inspect(&session, &config, format).await
        }

        Command::Sessions { limit } => {
            tracing::info!("Showing last {} sessions", limit);
            handle_sessions(limit, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Check => handle_config_check(&config, format),
        },
    }
}
