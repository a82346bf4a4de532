//! Broadcast relay server
//!
//! Run with: broadcast-relay [BIND_ADDR]
//!
//!   broadcast-relay                  # binds to 0.0.0.0:$PORT (default 3000)
//!   broadcast-relay localhost        # binds to 127.0.0.1:3000
//!   broadcast-relay 127.0.0.1:8080   # binds to 127.0.0.1:8080
//!
//! Broadcast from http://localhost:3000/broadcast and watch on
//! http://localhost:3000/view.

use std::net::{IpAddr, SocketAddr};

use broadcast_relay::server::config::DEFAULT_PORT;
use broadcast_relay::{RelayServer, ServerConfig, WebRtcEngine};

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: broadcast-relay [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:$PORT, PORT defaults to 3000)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORT                    Listen port");
    eprintln!("  RELAY_ALLOWED_ORIGIN    Single origin allowed by CORS");
    eprintln!("  RELAY_STATIC_DIR        Directory holding broadcast.html and viewer.html");
    eprintln!("  RUST_LOG                Log filter");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::from_env()?;
    if let Some(arg) = args.get(1) {
        match parse_bind_addr(arg) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("broadcast_relay=info".parse()?),
        )
        .init();

    tracing::info!(
        addr = %config.bind_addr,
        static_dir = %config.static_dir.display(),
        "Starting broadcast relay"
    );

    let engine = WebRtcEngine::new()?;
    let server = RelayServer::new(config, engine);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_addr() {
        assert_eq!(
            parse_bind_addr("localhost").unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("localhost:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("0.0.0.0").unwrap().port(),
            DEFAULT_PORT
        );
        assert!(parse_bind_addr("not-an-address").is_err());
    }
}
