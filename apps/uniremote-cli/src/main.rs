//! UniRemote CLI - headless remote for a desktop media player.
//!
//! Finds the companion on the local network, keeps a session to it, prints
//! every event as a JSON line on stdout and reads commands from stdin.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use uniremote_core::events::LoggingEventEmitter;
use uniremote_core::{
    bootstrap_services, ArtworkKind, BootstrappedServices, Command, PeerIdentity, ServerSelection,
};

use crate::config::ClientConfig;

/// UniRemote - control a desktop media player from the terminal.
#[derive(Parser, Debug)]
#[command(name = "uniremote")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "UNIREMOTE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Data directory for the device identity.
    #[arg(short = 'd', long, env = "UNIREMOTE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Name shown to the companion (overrides config file).
    #[arg(short = 'n', long)]
    name: Option<String>,
}

/// A line typed on stdin.
#[derive(Debug, PartialEq)]
enum Input {
    Refresh,
    Servers,
    Connect(usize),
    BulkArtwork(ArtworkKind),
    CancelArtwork,
    Raw(String),
    Command(Command),
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let input = match line {
        "refresh" => Input::Refresh,
        "servers" => Input::Servers,
        "artwork artists" => Input::BulkArtwork(ArtworkKind::Artist),
        "artwork albums" => Input::BulkArtwork(ArtworkKind::Album),
        "cancel-artwork" => Input::CancelArtwork,
        "quit" | "exit" => Input::Quit,
        _ => {
            if let Some(index) = line.strip_prefix("connect ") {
                let index = index
                    .trim()
                    .parse()
                    .map_err(|_| format!("not a server number: {}", index.trim()))?;
                Input::Connect(index)
            } else if let Some(raw) = line.strip_prefix("raw ") {
                Input::Raw(raw.to_string())
            } else {
                Input::Command(line.parse().map_err(|e| format!("{}", e))?)
            }
        }
    };
    Ok(Some(input))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("UniRemote CLI v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(name) = args.name {
        config.display_name = Some(name);
    }

    let data_dir = config.resolved_data_dir()?;
    let cache_dir = config.resolved_cache_dir()?;
    log::info!(
        "Configuration: data_dir={}, cache_dir={}",
        data_dir.display(),
        cache_dir.display()
    );

    let identity = PeerIdentity::load_or_create(&data_dir, config.display_name.as_deref());
    let core_config = config.to_core_config(cache_dir);
    let services =
        bootstrap_services(&core_config, identity).context("Failed to bootstrap services")?;

    if args.log_level >= log::LevelFilter::Debug {
        services
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    // Print events before anything can emit them
    let mut events = services.event_bridge.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(e) => log::warn!("Failed to serialize event: {}", e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Event printer lagged; {} event(s) skipped", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    services.start_background_tasks();
    services.session.start_discovery().await;
    log::info!("Browsing for servers; type commands on stdin (quit to exit)");

    tokio::select! {
        result = read_commands(&services) => {
            if let Err(e) = result {
                log::error!("Input error: {:#}", e);
            }
        }
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
    }

    services.shutdown().await;
    printer.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Reads stdin line by line until EOF or `quit`.
async fn read_commands(services: &BootstrappedServices) -> Result<()> {
    let session = &services.session;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        let input = match parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };

        match input {
            Input::Refresh => session.refresh_servers().await,
            Input::Servers => match session.server_selection() {
                ServerSelection::None => eprintln!("No servers found"),
                ServerSelection::Single(peer) => {
                    eprintln!("0: {} ({})", peer.display_name, peer.endpoint)
                }
                ServerSelection::Multiple(peers) => {
                    for (i, peer) in peers.iter().enumerate() {
                        eprintln!("{}: {} ({})", i, peer.display_name, peer.endpoint);
                    }
                }
            },
            Input::Connect(index) => match session.discovered_peers().get(index) {
                Some(peer) => session.connect(peer).await,
                None => eprintln!("error: no server {}", index),
            },
            Input::BulkArtwork(ArtworkKind::Artist) => session.request_all_artist_artworks().await,
            Input::BulkArtwork(ArtworkKind::Album) => session.request_all_album_artworks().await,
            Input::CancelArtwork => session.cancel_artwork_request(),
            Input::Raw(raw) => session.send_raw(raw).await,
            Input::Command(command) => session.send_command(command).await,
            Input::Quit => break,
        }
    }
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_words() {
        assert_eq!(parse_input("  "), Ok(None));
        assert_eq!(parse_input("refresh"), Ok(Some(Input::Refresh)));
        assert_eq!(parse_input("connect 1"), Ok(Some(Input::Connect(1))));
        assert!(parse_input("connect one").is_err());
        assert_eq!(
            parse_input("artwork albums"),
            Ok(Some(Input::BulkArtwork(ArtworkKind::Album)))
        );
    }

    #[test]
    fn parses_protocol_commands() {
        assert_eq!(
            parse_input("playAlbum:Kind of Blue"),
            Ok(Some(Input::Command(Command::PlayAlbum("Kind of Blue".into()))))
        );
        assert_eq!(
            parse_input("raw setVolume:40"),
            Ok(Some(Input::Raw("setVolume:40".into())))
        );
        assert!(parse_input("setVolume:40").is_err());
    }
}
