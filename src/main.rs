//! Decalkit CLI
//!
//! Command-line interface for custom model storage and rendering.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use decalkit::cli::{commands, Cli, Commands};
use decalkit::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Decalkit v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Some(cmd) => handle_command(&settings, cmd).await,
        None => {
            println!("Decalkit v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(settings: &Settings, cmd: Commands) -> anyhow::Result<()> {
    let result = match cmd {
        Commands::List => commands::list(settings).await,
        Commands::Show { name } => commands::show(settings, &name).await,
        Commands::Create {
            name,
            based_on,
            overlays,
            material_preset,
            force,
        } => {
            commands::create(settings, &name, &based_on, &overlays, &material_preset, force).await
        }
        Commands::Render { name, output, size } => {
            commands::render(settings, &name, &output, size).await
        }
        Commands::Export { output, name } => {
            commands::export(settings, &output, name.as_deref()).await
        }
        Commands::Import { path, overwrite } => commands::import(settings, &path, overwrite).await,
        Commands::Delete { name } => commands::delete(settings, &name).await,
        Commands::Clear { yes } => commands::clear(settings, yes).await,
    };

    if let Err(err) = &result {
        if let Some(hint) = err.recovery_suggestion() {
            eprintln!("hint: {}", hint);
        }
    }
    result.with_context(|| "command failed".to_string())
}
