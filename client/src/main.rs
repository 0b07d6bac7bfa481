use clap::Parser;
use client::config::ClientConfig;
use client::input::Wanderer;
use client::network::Client;
use client::presenter::LogPresenter;
use log::{error, info};
use shared::transport::{UdpClientTransport, UdpConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Milliseconds between position reports
    #[arg(short = 'r', long, default_value = "200")]
    report_ms: u64,

    /// Wander speed in units per second
    #[arg(long, default_value = "2.0")]
    speed: f32,

    /// Seed for a repeatable wander path
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ClientConfig {
        report_interval: Duration::from_millis(args.report_ms),
        ..ClientConfig::default()
    };

    let transport = match UdpClientTransport::bind("0.0.0.0:0", UdpConfig::default()).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to open client socket: {}", e);
            return Err(e.into());
        }
    };

    info!("Starting client...");
    let mut client = Client::new(transport, LogPresenter, config);
    client.connect(&args.server)?;

    let mut movement = Wanderer::new(args.speed, args.seed);

    tokio::select! {
        _ = client.run(&mut movement) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    client.shutdown();

    Ok(())
}
