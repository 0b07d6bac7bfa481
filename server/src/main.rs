use clap::Parser;
use log::{error, info};
use server::config::{IdentityPolicy, ServerConfig};
use server::network::Server;
use shared::transport::{UdpConfig, UdpServerTransport};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Milliseconds between snapshot broadcasts
    #[arg(short = 's', long, default_value = "200")]
    sync_ms: u64,

    /// Reject position updates naming another connection's player
    #[arg(long)]
    enforce_identity: bool,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        sync_interval: Duration::from_millis(args.sync_ms),
        identity_policy: if args.enforce_identity {
            IdentityPolicy::Bound
        } else {
            IdentityPolicy::Trusted
        },
        ..ServerConfig::default()
    };
    let udp = UdpConfig {
        timeout: Duration::from_secs(args.timeout_secs),
        ..UdpConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let transport = match UdpServerTransport::bind(&address, udp).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to bind to port {}: {}", args.port, e);
            return Err(e.into());
        }
    };

    info!("Identity policy: {:?}", config.identity_policy);
    let mut server = Server::new(transport, config);

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server.shutdown();

    Ok(())
}
