use clap::Parser;
use coordinator::coordinator::Coordinator;
use coordinator::fleet::ServerAddress;
use coordinator::link::UdpLink;
use coordinator::network::serve;
use log::{info, warn};
use shared::{DEFAULT_COORDINATOR_PORT, SECRET_ENV};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(author, version, about = "Matchmaking coordinator for pong servers", long_about = None)]
struct Args {
    /// IP address to accept players on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port to accept players on
    #[arg(short, long, default_value_t = DEFAULT_COORDINATOR_PORT)]
    port: u16,

    /// Simulation server as HOST:PORT, repeat for each server
    #[arg(
        long = "server-address",
        value_name = "HOST:PORT",
        default_values = [
            "127.0.0.1:5000",
            "127.0.0.1:5001",
            "127.0.0.1:5002",
            "127.0.0.1:5003",
            "127.0.0.1:5004",
        ]
    )]
    server_addresses: Vec<ServerAddress>,

    /// Shared secret presented to servers when preparing a match
    #[arg(short, long, env = SECRET_ENV, hide_env_values = true)]
    secret: Option<String>,

    /// Seconds between server health checks
    #[arg(short, long, default_value = "5")]
    check_interval: u64,

    /// Milliseconds to wait for a server to answer
    #[arg(long, default_value = "1000")]
    query_timeout_ms: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let secret = args.secret.unwrap_or_default();
    if secret.is_empty() {
        warn!(
            "No secret set via --secret or {} - servers that require one will refuse to prepare",
            SECRET_ENV
        );
    }

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;

    info!(
        "Coordinating {} servers: {}",
        args.server_addresses.len(),
        args.server_addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let link = UdpLink::new(Duration::from_millis(args.query_timeout_ms.max(1)));
    let coordinator = Arc::new(Coordinator::new(args.server_addresses, secret, link));

    let health = tokio::spawn(
        Arc::clone(&coordinator).run_health_checks(Duration::from_secs(args.check_interval.max(1))),
    );

    tokio::select! {
        _ = serve(coordinator, listener) => {},
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    health.abort();
    Ok(())
}
