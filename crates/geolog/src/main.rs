//! `geolog` - CLI for the location collector
//!
//! This binary runs the HTTP service and offers a few commands for looking
//! at the stored collection and the active configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use geolog::cli::{Cli, Command, ConfigCommand, ListCommand, ServeCommand};
use geolog::record::{IP_FIELD, SAVED_AT_FIELD};
use geolog::storage::collection;
use geolog::{init_logging, AppendStore, Config, Handler, HandlerSettings, HttpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, &serve_cmd).await,
        Command::List(list_cmd) => handle_list(&config, &list_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    cmd.apply(&mut config);
    config.validate()?;

    let store = AppendStore::open(&config.storage.data_file, config.store_options())
        .with_context(|| {
            format!(
                "opening collection {}",
                config.storage.data_file.display()
            )
        })?;
    let store = Arc::new(store);

    let handler = Handler::new(Arc::clone(&store), HandlerSettings::from(&config.server));
    let server = HttpServer::bind(&config.listen_addr(), handler)?;

    info!("Server running at http://localhost:{}", server.local_addr().port());
    info!("Locations will be saved to: {}", store.path().display());

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.shutdown();
            }
            Err(err) => warn!(error = %err, "Could not listen for Ctrl-C"),
        }
    });

    server.serve().await?;
    store.shutdown().await?;
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let path = cmd
        .data_file
        .clone()
        .unwrap_or_else(|| config.storage.data_file.clone());
    let records = match collection::load(&path) {
        Ok(records) => records,
        Err(err) if err.is_storage_error() => {
            anyhow::bail!("cannot list {}: {err}", path.display())
        }
        Err(err) => return Err(err.into()),
    };

    let skip = cmd
        .last
        .map_or(0, |last| records.len().saturating_sub(last));
    let shown = &records[skip..];

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    println!("{} of {} records in {}", shown.len(), records.len(), path.display());
    println!();
    for record in shown {
        let mut details = record.fields().clone();
        details.remove(IP_FIELD);
        details.remove(SAVED_AT_FIELD);
        println!(
            "{:<24}  {:<39}  {}",
            record.saved_at().unwrap_or("-"),
            record.ip().unwrap_or("-"),
            serde_json::Value::Object(details)
        );
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.listen_addr());
                println!("  Index page:         {}", config.server.index_path.display());
                println!(
                    "  Trust forwarded:    {}",
                    config.server.trust_forwarded_for
                );
                println!("  Max body bytes:     {}", config.server.max_body_bytes);
                println!();
                println!("[Storage]");
                println!("  Data file:          {}", config.storage.data_file.display());
                println!("  Queue capacity:     {}", config.storage.queue_capacity);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
